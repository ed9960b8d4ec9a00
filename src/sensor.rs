use crate::{
    accel::AccelFullScale,
    address::Address,
    axis::{OffsetCorrection, OffsetVector, SixAxis},
    calibration::CalibrationOutcome,
    calibration_blocking::{calibrate, measure_correction},
    clock_source::ClockSource,
    config::{DigitalLowPassFilter, Settings},
    data_ready::DataReady,
    error::Error,
    estimator::OrientationEstimator,
    gyro::GyroFullScale,
    motion::Motion,
    registers::{
        Register, ACCEL_SELF_TEST_VALUE, CLOCK_SOURCE_MASK, DLPF_MASK, FULL_SCALE_MASK,
        GYRO_SELF_TEST_VALUE, INT_DATA_READY, INT_ENABLE_MASK, MOTION_BURST_LEN,
        POWER_MODE_AWAKE, POWER_MODE_MASK, POWER_MODE_SLEEP, SELF_TEST_BLOCK_LEN,
        SIGNAL_PATH_RESET_ALL, SIGNAL_PATH_RESET_MASK, WHO_AM_I_MASK, WHO_AM_I_VALUE,
    },
    self_test::SelfTestReport,
    status::DeviceStatus,
    store::{CalibrationStore, Eeprom},
    temperature::Temperature,
};
use embedded_hal::{delay, i2c::I2c};

/// Attempts per bus transfer before the bus is declared faulted
pub const BUS_ATTEMPTS: usize = 5;
/// Time for the self-test response to settle
pub const SELF_TEST_DELAY_MS: u32 = 250;
/// Time for the signal paths to restart after a reset
pub const SIGNAL_PATH_RESET_DELAY_MS: u32 = 10;

/// InvenSense MPU-6050 Driver
///
/// Bring-up happens in two phases so the device can warm up in between:
///
/// ```ignore
/// let mut mpu = Mpu6050::new(i2c, Address::default());
/// let mut store = CalibrationStore::new(eeprom);
/// mpu.initialize_phase_one(&mut delay, &mut store)?;
/// // ... a few minutes of thermal soak ...
/// mpu.initialize_phase_two(&mut delay, &mut &DATA_READY, &mut store)?;
/// loop {
///     let timestamp = (&DATA_READY).wait_for_sample();
///     let [roll, pitch] = mpu.update_orientation(timestamp);
/// }
/// ```
pub struct Mpu6050<I>
where
    I: I2c,
{
    i2c: I,
    address: u8,
    settings: Settings,
    status: DeviceStatus,
    correction: OffsetCorrection,
    estimator: OrientationEstimator,
}

impl<I> Mpu6050<I>
where
    I: I2c,
{
    /// Construct a new i2c driver for the MPU-6050 (no bus traffic)
    pub fn new(i2c: I, address: Address) -> Self {
        Self::with_settings(i2c, address, Settings::default())
    }

    pub fn with_settings(i2c: I, address: Address, settings: Settings) -> Self {
        Self {
            i2c,
            address: address.into(),
            settings,
            status: DeviceStatus::NotInitialized,
            correction: OffsetCorrection::ZERO,
            estimator: OrientationEstimator::new(),
        }
    }

    /// Returns the underlying I2C peripheral, consuming this driver.
    pub fn release(self) -> I {
        self.i2c
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Residual bias measured in phase two, in counts at the calibration ranges
    pub fn offset_correction(&self) -> OffsetCorrection {
        self.correction
    }

    /// Latest orientation estimate `[x, y]` in radians
    pub fn orientation(&self) -> [f64; 2] {
        self.estimator.angle()
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    /// First bring-up phase: probe, wake, self-test, configure and try the stored
    /// calibration.
    ///
    /// Returns [`DeviceStatus::Correct`] when a fresh calibration was restored,
    /// [`DeviceStatus::NotCalibrated`] when phase two has to calibrate. Should
    /// be called as early as possible so the device starts warming up.
    pub fn initialize_phase_one<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        store: &mut CalibrationStore<E>,
    ) -> Result<DeviceStatus, Error<I>> {
        self.status = DeviceStatus::NotInitialized;
        info!("bring-up phase one");

        self.check_device()?;
        self.set_clock_source(ClockSource::Zgyro)?;
        self.set_sleep(false)?;
        self.self_test(delay)?;
        self.configure(delay)?;

        let temperature = self.temperature()?.celsius();
        let record = match store.load_fresh(temperature, self.settings.max_temperature_drift) {
            Ok(record) => record,
            Err(_) => {
                warn!("calibration store unreadable, calibration needed");
                None
            }
        };

        if let Some(record) = record {
            self.set_offsets(&record.offsets)?;
            info!("stored calibration restored");
            self.status = DeviceStatus::Correct;
        } else {
            self.status = DeviceStatus::NotCalibrated;
        }
        Ok(self.status)
    }

    /// Second bring-up phase, once the device has reached its working
    /// temperature: calibrate if needed, measure the offset correction and
    /// start the estimator.
    pub fn initialize_phase_two<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReady,
        store: &mut CalibrationStore<E>,
    ) -> Result<(), Error<I>> {
        match self.status {
            DeviceStatus::Correct => {}
            DeviceStatus::NotCalibrated => self.calibrate_and_store(delay, ready, store)?,
            status => return Err(Error::InvalidState(status)),
        }
        info!("bring-up phase two");

        self.measure_correction(delay, ready)?;
        self.initialize_measurements(delay, ready)?;
        self.status = DeviceStatus::Correct;
        info!("device ready");
        Ok(())
    }

    fn calibrate_and_store<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReady,
        store: &mut CalibrationStore<E>,
    ) -> Result<(), Error<I>> {
        self.configure_for_calibration(delay)?;
        let outcome = self.calibrate(ready, OffsetVector::ZERO)?;
        let temperature = self.temperature()?.celsius();
        self.set_offsets(&outcome.offsets)?;

        if store.save(temperature, &outcome.offsets).is_err() {
            // the next boot calibrates again
            warn!("calibration could not be saved");
        }
        Ok(())
    }

    /// Restart the estimator from the current attitude.
    ///
    /// Waits for a sample, resets the signal paths, then seeds the estimator
    /// with the first sample that follows.
    pub fn initialize_measurements(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReady,
    ) -> Result<(), Error<I>> {
        ready.wait_for_sample();
        self.reset_signal_path(delay)?;
        let timestamp = ready.wait_for_sample();
        let motion = self.compensated_motion()?;
        self.estimator.reset(&motion, timestamp);
        Ok(())
    }

    /// Run one estimator step with the sample flagged at `timestamp` (ms).
    ///
    /// Returns the previous estimate unchanged if the device is not
    /// [`DeviceStatus::Correct`] or the sample cannot be read.
    pub fn update_orientation(&mut self, timestamp: u64) -> [f64; 2] {
        if self.status != DeviceStatus::Correct {
            return self.estimator.angle();
        }
        match self.compensated_motion() {
            Ok(motion) => self.estimator.step(&motion, timestamp),
            Err(_) => self.estimator.angle(),
        }
    }

    /// Wait for the next sample and run one estimator step with it.
    pub fn next_orientation(&mut self, ready: &mut impl DataReady) -> [f64; 2] {
        let timestamp = ready.wait_for_sample();
        self.update_orientation(timestamp)
    }

    /// Search the offset registers, starting from `initial`.
    ///
    /// The device must already be in its calibration configuration
    /// ([`configure_for_calibration`](Self::configure_for_calibration)). The
    /// offset registers are left at the last value measured, not at the result.
    pub fn calibrate(
        &mut self,
        ready: &mut impl DataReady,
        initial: OffsetVector,
    ) -> Result<CalibrationOutcome, Error<I>> {
        let parameters = self.settings.calibration;
        let outcome = calibrate(self, ready, &parameters, initial);
        if matches!(outcome, Err(Error::CalibrationExhausted)) {
            error!("offset search did not converge");
            self.status = DeviceStatus::CalibrationError;
        }
        outcome
    }

    /// Measure the bias left with the current offsets under the calibration
    /// configuration, then return to the working configuration.
    pub fn measure_correction(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReady,
    ) -> Result<OffsetCorrection, Error<I>> {
        self.configure_for_calibration(delay)?;
        let parameters = self.settings.calibration;
        self.correction = measure_correction(self, ready, &parameters)?;
        debug!("offset correction {:?}", self.correction);
        self.configure(delay)?;
        Ok(self.correction)
    }

    /// Check `WHO_AM_I`
    pub fn check_device(&mut self) -> Result<(), Error<I>> {
        let id = self.read_register(Register::WhoAmI)?;
        if id & WHO_AM_I_MASK != WHO_AM_I_VALUE {
            error!("unexpected device id {:#x}", id);
            self.status = DeviceStatus::BusError;
            return Err(Error::WrongDevice(id));
        }
        Ok(())
    }

    /// Evaluate the factory self-test.
    ///
    /// Leaves the self-test configuration applied; the caller restores the
    /// working one.
    pub fn self_test(
        &mut self,
        delay: &mut impl delay::DelayNs,
    ) -> Result<SelfTestReport, Error<I>> {
        self.write_full_scale(ACCEL_SELF_TEST_VALUE, GYRO_SELF_TEST_VALUE)?;
        delay.delay_ms(SELF_TEST_DELAY_MS);

        let mut block = [0; SELF_TEST_BLOCK_LEN];
        self.read_registers(Register::SelfTestX as u8, &mut block)?;
        let report = SelfTestReport::from_block(block);
        debug!("self-test deviations {:?}", report.deviation);

        if let Some(axis) = report.first_failure(self.settings.self_test_threshold) {
            error!("self-test failed on {:?}", axis);
            self.status = DeviceStatus::SelfTestFailed(axis);
            return Err(Error::SelfTestFailed(axis));
        }
        Ok(report)
    }

    /// Apply the working configuration from [`Settings`].
    pub fn configure(&mut self, delay: &mut impl delay::DelayNs) -> Result<(), Error<I>> {
        let settings = self.settings;
        self.apply_configuration(
            delay,
            settings.accel_scale.config_bits(),
            settings.gyro_scale.config_bits(),
            settings.filter,
            settings.sample_rate_divider,
        )
    }

    /// Apply the configuration the offsets are searched and corrected under.
    pub fn configure_for_calibration(
        &mut self,
        delay: &mut impl delay::DelayNs,
    ) -> Result<(), Error<I>> {
        let parameters = self.settings.calibration;
        self.apply_configuration(
            delay,
            parameters.accel_scale.config_bits(),
            parameters.gyro_scale.config_bits(),
            parameters.filter,
            parameters.sample_rate_divider,
        )
    }

    fn apply_configuration(
        &mut self,
        delay: &mut impl delay::DelayNs,
        accel: u8,
        gyro: u8,
        filter: DigitalLowPassFilter,
        sample_rate_divider: u8,
    ) -> Result<(), Error<I>> {
        self.write_full_scale(accel, gyro)?;
        self.set_digital_lowpass_filter(filter)?;
        self.enable_data_ready_interrupt()?;
        self.set_sample_rate_divider(sample_rate_divider)?;
        self.reset_signal_path(delay)
    }

    /// Perform reset of the signal path
    pub fn reset_signal_path(&mut self, delay: &mut impl delay::DelayNs) -> Result<(), Error<I>> {
        self.update_register(
            Register::SignalPathReset as u8,
            SIGNAL_PATH_RESET_ALL,
            SIGNAL_PATH_RESET_MASK,
            false,
        )?;
        delay.delay_ms(SIGNAL_PATH_RESET_DELAY_MS);
        Ok(())
    }

    /// Pick the clock-source
    pub fn set_clock_source(&mut self, clock_source: ClockSource) -> Result<(), Error<I>> {
        self.update_register(
            Register::PwrMgmt1 as u8,
            clock_source as u8,
            CLOCK_SOURCE_MASK,
            true,
        )
    }

    pub fn set_sleep(&mut self, sleep: bool) -> Result<(), Error<I>> {
        let value = if sleep {
            POWER_MODE_SLEEP
        } else {
            POWER_MODE_AWAKE
        };
        self.update_register(Register::PwrMgmt1 as u8, value, POWER_MODE_MASK, true)
    }

    pub fn set_full_scale(
        &mut self,
        accel: AccelFullScale,
        gyro: GyroFullScale,
    ) -> Result<(), Error<I>> {
        self.write_full_scale(accel.config_bits(), gyro.config_bits())
    }

    fn write_full_scale(&mut self, accel: u8, gyro: u8) -> Result<(), Error<I>> {
        self.update_register(Register::AccelConfig as u8, accel, FULL_SCALE_MASK, true)?;
        self.update_register(Register::GyroConfig as u8, gyro, FULL_SCALE_MASK, true)
    }

    pub fn set_digital_lowpass_filter(
        &mut self,
        filter: DigitalLowPassFilter,
    ) -> Result<(), Error<I>> {
        self.update_register(Register::Config as u8, filter as u8, DLPF_MASK, true)
    }

    pub fn set_sample_rate_divider(&mut self, div: u8) -> Result<(), Error<I>> {
        self.write_register(Register::SmpRtDiv as u8, div, true)
    }

    pub fn enable_data_ready_interrupt(&mut self) -> Result<(), Error<I>> {
        self.update_register(
            Register::IntEnable as u8,
            INT_DATA_READY,
            INT_ENABLE_MASK,
            true,
        )
    }

    /// Current offset registers
    pub fn get_offsets(&mut self) -> Result<OffsetVector, Error<I>> {
        let mut data = [0; 12];
        self.read_registers(Register::AccelOffsetX_H as u8, &mut data[..6])?;
        self.read_registers(Register::GyroOffsetX_H as u8, &mut data[6..])?;
        Ok(OffsetVector::from_be_bytes(data))
    }

    /// Write the offset registers, one verified byte at a time (high byte first).
    pub fn set_offsets(&mut self, offsets: &OffsetVector) -> Result<(), Error<I>> {
        for (axis, value) in offsets.iter() {
            let i = (axis.index() % 3) as u8;
            let base = if axis.is_accel() {
                Register::AccelOffsetX_H
            } else {
                Register::GyroOffsetX_H
            };
            let [high, low] = value.to_be_bytes();
            self.write_register(base.offset_by(2 * i), high, true)?;
            self.write_register(base.offset_by(2 * i + 1), low, true)?;
        }
        Ok(())
    }

    pub fn temperature(&mut self) -> Result<Temperature, Error<I>> {
        let mut data = [0; 2];
        self.read_registers(Register::TempOut_H as u8, &mut data)?;
        Ok(Temperature::from_bytes(data))
    }

    /// Raw accelerometer and gyroscope counts, read in a single burst.
    pub fn motion6(&mut self) -> Result<SixAxis<i16>, Error<I>> {
        let mut data = [0; MOTION_BURST_LEN];
        self.read_registers(Register::AccelX_H as u8, &mut data)?;

        let mut words = [0; 12];
        words[..6].copy_from_slice(&data[..6]);
        words[6..].copy_from_slice(&data[8..]);
        Ok(SixAxis::from_be_bytes(words))
    }

    /// One sample in g and rad/s with the offset correction removed.
    pub fn compensated_motion(&mut self) -> Result<Motion, Error<I>> {
        let raw = self.motion6()?;
        Ok(Motion::compensate(&raw, &self.correction, &self.settings))
    }

    fn check_bus(&self) -> Result<(), Error<I>> {
        if self.status == DeviceStatus::BusError {
            return Err(Error::BusFaulted);
        }
        Ok(())
    }

    fn fault<T>(&mut self, error: Error<I>) -> Result<T, Error<I>> {
        error!("bus failure after {} attempts", BUS_ATTEMPTS);
        self.status = DeviceStatus::BusError;
        Err(error)
    }

    pub(crate) fn read_register(&mut self, reg: Register) -> Result<u8, Error<I>> {
        let mut buf = [0; 1];
        self.read_registers(reg as u8, &mut buf)?;
        Ok(buf[0])
    }

    /// Burst read starting at `register`. On failure the buffer is zeroed.
    pub(crate) fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), Error<I>> {
        self.check_bus()?;
        let mut attempt = 1;
        loop {
            match self.i2c.write_read(self.address, &[register], buf) {
                Ok(()) => return Ok(()),
                Err(_) if attempt < BUS_ATTEMPTS => attempt += 1,
                Err(e) => {
                    buf.fill(0);
                    return self.fault(Error::WriteReadError(e));
                }
            }
        }
    }

    /// Write one register, optionally reading it back until it matches.
    pub(crate) fn write_register(
        &mut self,
        register: u8,
        value: u8,
        verify: bool,
    ) -> Result<(), Error<I>> {
        self.check_bus()?;
        let mut attempt = 1;
        loop {
            match self.write_once(register, value, verify) {
                Ok(()) => return Ok(()),
                Err(_) if attempt < BUS_ATTEMPTS => attempt += 1,
                Err(e) => return self.fault(e),
            }
        }
    }

    fn write_once(&mut self, register: u8, value: u8, verify: bool) -> Result<(), Error<I>> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(Error::WriteError)?;
        if !verify {
            return Ok(());
        }

        let mut found = [0; 1];
        self.i2c
            .write_read(self.address, &[register], &mut found)
            .map_err(Error::WriteReadError)?;
        if found[0] != value {
            trace!("register {:#x} reads {:#x} after writing {:#x}", register, found[0], value);
            return Err(Error::VerifyMismatch {
                register,
                expected: value,
                found: found[0],
            });
        }
        Ok(())
    }

    /// Read-modify-write of the bits selected by `mask`.
    pub(crate) fn update_register(
        &mut self,
        register: u8,
        value: u8,
        mask: u8,
        verify: bool,
    ) -> Result<(), Error<I>> {
        let mut current = [0; 1];
        self.read_registers(register, &mut current)?;
        let updated = (value & mask) | (current[0] & !mask);
        self.write_register(register, updated, verify)
    }
}
