//! MPU6050 Asynchronous Driver Implementation
//!
//! Same lifecycle and register handling as the blocking driver in
//! [`sensor`](crate::sensor), over `embedded-hal-async`. Data-ready
//! notifications are awaited through [`DataReadyAsync`].
//!
//! The calibration store stays blocking: EEPROM access on the targets this
//! runs on is a handful of memory-mapped byte writes.

use crate::{
    accel::AccelFullScale,
    address::Address,
    axis::{OffsetCorrection, OffsetVector, SixAxis},
    calibration::CalibrationOutcome,
    calibration_async::{calibrate, measure_correction},
    clock_source::ClockSource,
    config::{DigitalLowPassFilter, Settings},
    data_ready::DataReadyAsync,
    error_async::Error,
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
    sensor::{BUS_ATTEMPTS, SELF_TEST_DELAY_MS, SIGNAL_PATH_RESET_DELAY_MS},
    status::DeviceStatus,
    store::{CalibrationStore, Eeprom},
    temperature::Temperature,
};

use embedded_hal_async::{delay, i2c::I2c};

/// InvenSense MPU-6050 Driver
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

    pub fn offset_correction(&self) -> OffsetCorrection {
        self.correction
    }

    pub fn orientation(&self) -> [f64; 2] {
        self.estimator.angle()
    }

    pub fn estimator(&self) -> &OrientationEstimator {
        &self.estimator
    }

    /// First bring-up phase, see
    /// [`sensor::Mpu6050::initialize_phase_one`](crate::sensor::Mpu6050::initialize_phase_one).
    pub async fn initialize_phase_one<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        store: &mut CalibrationStore<E>,
    ) -> Result<DeviceStatus, Error<I>> {
        self.status = DeviceStatus::NotInitialized;
        info!("bring-up phase one");

        self.check_device().await?;
        self.set_clock_source(ClockSource::Zgyro).await?;
        self.set_sleep(false).await?;
        self.self_test(delay).await?;
        self.configure(delay).await?;

        let temperature = self.temperature().await?.celsius();
        let record = match store.load_fresh(temperature, self.settings.max_temperature_drift) {
            Ok(record) => record,
            Err(_) => {
                warn!("calibration store unreadable, calibration needed");
                None
            }
        };

        if let Some(record) = record {
            self.set_offsets(&record.offsets).await?;
            info!("stored calibration restored");
            self.status = DeviceStatus::Correct;
        } else {
            self.status = DeviceStatus::NotCalibrated;
        }
        Ok(self.status)
    }

    /// Second bring-up phase, see
    /// [`sensor::Mpu6050::initialize_phase_two`](crate::sensor::Mpu6050::initialize_phase_two).
    pub async fn initialize_phase_two<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReadyAsync,
        store: &mut CalibrationStore<E>,
    ) -> Result<(), Error<I>> {
        match self.status {
            DeviceStatus::Correct => {}
            DeviceStatus::NotCalibrated => self.calibrate_and_store(delay, ready, store).await?,
            status => return Err(Error::InvalidState(status)),
        }
        info!("bring-up phase two");

        self.measure_correction(delay, ready).await?;
        self.initialize_measurements(delay, ready).await?;
        self.status = DeviceStatus::Correct;
        info!("device ready");
        Ok(())
    }

    async fn calibrate_and_store<E: Eeprom>(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReadyAsync,
        store: &mut CalibrationStore<E>,
    ) -> Result<(), Error<I>> {
        self.configure_for_calibration(delay).await?;
        let outcome = self.calibrate(ready, OffsetVector::ZERO).await?;
        let temperature = self.temperature().await?.celsius();
        self.set_offsets(&outcome.offsets).await?;

        if store.save(temperature, &outcome.offsets).is_err() {
            // the next boot calibrates again
            warn!("calibration could not be saved");
        }
        Ok(())
    }

    /// Restart the estimator from the current attitude.
    pub async fn initialize_measurements(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReadyAsync,
    ) -> Result<(), Error<I>> {
        ready.wait_for_sample().await;
        self.reset_signal_path(delay).await?;
        let timestamp = ready.wait_for_sample().await;
        let motion = self.compensated_motion().await?;
        self.estimator.reset(&motion, timestamp);
        Ok(())
    }

    /// Run one estimator step with the sample flagged at `timestamp` (ms).
    ///
    /// Returns the previous estimate unchanged if the device is not
    /// [`DeviceStatus::Correct`] or the sample cannot be read.
    pub async fn update_orientation(&mut self, timestamp: u64) -> [f64; 2] {
        if self.status != DeviceStatus::Correct {
            return self.estimator.angle();
        }
        match self.compensated_motion().await {
            Ok(motion) => self.estimator.step(&motion, timestamp),
            Err(_) => self.estimator.angle(),
        }
    }

    /// Wait for the next sample and run one estimator step with it.
    pub async fn next_orientation(&mut self, ready: &mut impl DataReadyAsync) -> [f64; 2] {
        let timestamp = ready.wait_for_sample().await;
        self.update_orientation(timestamp).await
    }

    pub async fn calibrate(
        &mut self,
        ready: &mut impl DataReadyAsync,
        initial: OffsetVector,
    ) -> Result<CalibrationOutcome, Error<I>> {
        let parameters = self.settings.calibration;
        let outcome = calibrate(self, ready, &parameters, initial).await;
        if matches!(outcome, Err(Error::CalibrationExhausted)) {
            error!("offset search did not converge");
            self.status = DeviceStatus::CalibrationError;
        }
        outcome
    }

    pub async fn measure_correction(
        &mut self,
        delay: &mut impl delay::DelayNs,
        ready: &mut impl DataReadyAsync,
    ) -> Result<OffsetCorrection, Error<I>> {
        self.configure_for_calibration(delay).await?;
        let parameters = self.settings.calibration;
        self.correction = measure_correction(self, ready, &parameters).await?;
        debug!("offset correction {:?}", self.correction);
        self.configure(delay).await?;
        Ok(self.correction)
    }

    /// Check `WHO_AM_I`
    pub async fn check_device(&mut self) -> Result<(), Error<I>> {
        let id = self.read_register(Register::WhoAmI).await?;
        if id & WHO_AM_I_MASK != WHO_AM_I_VALUE {
            error!("unexpected device id {:#x}", id);
            self.status = DeviceStatus::BusError;
            return Err(Error::WrongDevice(id));
        }
        Ok(())
    }

    pub async fn self_test(
        &mut self,
        delay: &mut impl delay::DelayNs,
    ) -> Result<SelfTestReport, Error<I>> {
        self.write_full_scale(ACCEL_SELF_TEST_VALUE, GYRO_SELF_TEST_VALUE)
            .await?;
        delay.delay_ms(SELF_TEST_DELAY_MS).await;

        let mut block = [0; SELF_TEST_BLOCK_LEN];
        self.read_registers(Register::SelfTestX as u8, &mut block)
            .await?;
        let report = SelfTestReport::from_block(block);
        debug!("self-test deviations {:?}", report.deviation);

        if let Some(axis) = report.first_failure(self.settings.self_test_threshold) {
            error!("self-test failed on {:?}", axis);
            self.status = DeviceStatus::SelfTestFailed(axis);
            return Err(Error::SelfTestFailed(axis));
        }
        Ok(report)
    }

    pub async fn configure(&mut self, delay: &mut impl delay::DelayNs) -> Result<(), Error<I>> {
        let settings = self.settings;
        self.apply_configuration(
            delay,
            settings.accel_scale.config_bits(),
            settings.gyro_scale.config_bits(),
            settings.filter,
            settings.sample_rate_divider,
        )
        .await
    }

    pub async fn configure_for_calibration(
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
        .await
    }

    async fn apply_configuration(
        &mut self,
        delay: &mut impl delay::DelayNs,
        accel: u8,
        gyro: u8,
        filter: DigitalLowPassFilter,
        sample_rate_divider: u8,
    ) -> Result<(), Error<I>> {
        self.write_full_scale(accel, gyro).await?;
        self.set_digital_lowpass_filter(filter).await?;
        self.enable_data_ready_interrupt().await?;
        self.set_sample_rate_divider(sample_rate_divider).await?;
        self.reset_signal_path(delay).await
    }

    /// Perform reset of the signal path
    pub async fn reset_signal_path(
        &mut self,
        delay: &mut impl delay::DelayNs,
    ) -> Result<(), Error<I>> {
        self.update_register(
            Register::SignalPathReset as u8,
            SIGNAL_PATH_RESET_ALL,
            SIGNAL_PATH_RESET_MASK,
            false,
        )
        .await?;
        delay.delay_ms(SIGNAL_PATH_RESET_DELAY_MS).await;
        Ok(())
    }

    /// Pick the clock-source
    pub async fn set_clock_source(&mut self, clock_source: ClockSource) -> Result<(), Error<I>> {
        self.update_register(
            Register::PwrMgmt1 as u8,
            clock_source as u8,
            CLOCK_SOURCE_MASK,
            true,
        )
        .await
    }

    pub async fn set_sleep(&mut self, sleep: bool) -> Result<(), Error<I>> {
        let value = if sleep {
            POWER_MODE_SLEEP
        } else {
            POWER_MODE_AWAKE
        };
        self.update_register(Register::PwrMgmt1 as u8, value, POWER_MODE_MASK, true)
            .await
    }

    pub async fn set_full_scale(
        &mut self,
        accel: AccelFullScale,
        gyro: GyroFullScale,
    ) -> Result<(), Error<I>> {
        self.write_full_scale(accel.config_bits(), gyro.config_bits())
            .await
    }

    async fn write_full_scale(&mut self, accel: u8, gyro: u8) -> Result<(), Error<I>> {
        self.update_register(Register::AccelConfig as u8, accel, FULL_SCALE_MASK, true)
            .await?;
        self.update_register(Register::GyroConfig as u8, gyro, FULL_SCALE_MASK, true)
            .await
    }

    pub async fn set_digital_lowpass_filter(
        &mut self,
        filter: DigitalLowPassFilter,
    ) -> Result<(), Error<I>> {
        self.update_register(Register::Config as u8, filter as u8, DLPF_MASK, true)
            .await
    }

    pub async fn set_sample_rate_divider(&mut self, div: u8) -> Result<(), Error<I>> {
        self.write_register(Register::SmpRtDiv as u8, div, true)
            .await
    }

    pub async fn enable_data_ready_interrupt(&mut self) -> Result<(), Error<I>> {
        self.update_register(
            Register::IntEnable as u8,
            INT_DATA_READY,
            INT_ENABLE_MASK,
            true,
        )
        .await
    }

    pub async fn get_offsets(&mut self) -> Result<OffsetVector, Error<I>> {
        let mut data = [0; 12];
        self.read_registers(Register::AccelOffsetX_H as u8, &mut data[..6])
            .await?;
        self.read_registers(Register::GyroOffsetX_H as u8, &mut data[6..])
            .await?;
        Ok(OffsetVector::from_be_bytes(data))
    }

    /// Write the offset registers, one verified byte at a time (high byte first).
    pub async fn set_offsets(&mut self, offsets: &OffsetVector) -> Result<(), Error<I>> {
        for (axis, value) in offsets.iter() {
            let i = (axis.index() % 3) as u8;
            let base = if axis.is_accel() {
                Register::AccelOffsetX_H
            } else {
                Register::GyroOffsetX_H
            };
            let [high, low] = value.to_be_bytes();
            self.write_register(base.offset_by(2 * i), high, true)
                .await?;
            self.write_register(base.offset_by(2 * i + 1), low, true)
                .await?;
        }
        Ok(())
    }

    pub async fn temperature(&mut self) -> Result<Temperature, Error<I>> {
        let mut data = [0; 2];
        self.read_registers(Register::TempOut_H as u8, &mut data)
            .await?;
        Ok(Temperature::from_bytes(data))
    }

    pub async fn motion6(&mut self) -> Result<SixAxis<i16>, Error<I>> {
        let mut data = [0; MOTION_BURST_LEN];
        self.read_registers(Register::AccelX_H as u8, &mut data)
            .await?;

        let mut words = [0; 12];
        words[..6].copy_from_slice(&data[..6]);
        words[6..].copy_from_slice(&data[8..]);
        Ok(SixAxis::from_be_bytes(words))
    }

    pub async fn compensated_motion(&mut self) -> Result<Motion, Error<I>> {
        let raw = self.motion6().await?;
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

    async fn read_register(&mut self, reg: Register) -> Result<u8, Error<I>> {
        let mut buf = [0; 1];
        self.read_registers(reg as u8, &mut buf).await?;
        Ok(buf[0])
    }

    async fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), Error<I>> {
        self.check_bus()?;
        let mut attempt = 1;
        loop {
            match self.i2c.write_read(self.address, &[register], buf).await {
                Ok(()) => return Ok(()),
                Err(_) if attempt < BUS_ATTEMPTS => attempt += 1,
                Err(e) => {
                    buf.fill(0);
                    return self.fault(Error::WriteReadError(e));
                }
            }
        }
    }

    async fn write_register(
        &mut self,
        register: u8,
        value: u8,
        verify: bool,
    ) -> Result<(), Error<I>> {
        self.check_bus()?;
        let mut attempt = 1;
        loop {
            match self.write_once(register, value, verify).await {
                Ok(()) => return Ok(()),
                Err(_) if attempt < BUS_ATTEMPTS => attempt += 1,
                Err(e) => return self.fault(e),
            }
        }
    }

    async fn write_once(&mut self, register: u8, value: u8, verify: bool) -> Result<(), Error<I>> {
        self.i2c
            .write(self.address, &[register, value])
            .await
            .map_err(Error::WriteError)?;
        if !verify {
            return Ok(());
        }

        let mut found = [0; 1];
        self.i2c
            .write_read(self.address, &[register], &mut found)
            .await
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

    async fn update_register(
        &mut self,
        register: u8,
        value: u8,
        mask: u8,
        verify: bool,
    ) -> Result<(), Error<I>> {
        let mut current = [0; 1];
        self.read_registers(register, &mut current).await?;
        let updated = (value & mask) | (current[0] & !mask);
        self.write_register(register, updated, verify).await
    }
}

#[cfg(test)]
mod tests {
    use super::Mpu6050;
    use crate::{
        address::Address,
        axis::{Axis, SixAxis},
        error_async::Error,
        registers::Register,
        sensor::BUS_ATTEMPTS,
        status::DeviceStatus,
        store::CalibrationStore,
        testing::{quick_settings, FakeMpu, MemoryEeprom, NoopDelay, Ticker},
    };
    use approx::assert_relative_eq;
    use embassy_futures::block_on;

    fn driver(fake: FakeMpu) -> Mpu6050<FakeMpu> {
        Mpu6050::with_settings(fake, Address::Ad0Low, quick_settings())
    }

    #[test]
    fn test_full_bring_up() {
        let mut fake = FakeMpu::new();
        fake.bias = [300, -200, 500, -40, 25, 7];
        let mut mpu = driver(fake);
        let mut store = CalibrationStore::new(MemoryEeprom::new());
        let mut delay = NoopDelay::new();
        let mut ready = Ticker::new(32);

        block_on(async {
            let status = mpu.initialize_phase_one(&mut delay, &mut store).await.unwrap();
            assert_eq!(status, DeviceStatus::NotCalibrated);
            mpu.initialize_phase_two(&mut delay, &mut ready, &mut store)
                .await
                .unwrap();
        });
        assert_eq!(mpu.status(), DeviceStatus::Correct);

        let saved = store.load().unwrap().unwrap();
        assert_eq!(saved.offsets.values(), [-38, 25, -63, 10, -6, -2]);

        let angle = block_on(mpu.next_orientation(&mut ready));
        assert_relative_eq!(angle[0], 0.0, epsilon = 1e-3);
        assert_relative_eq!(angle[1], 0.0, epsilon = 1e-3);

        // a second boot restores the record
        let mut fake = mpu.release();
        fake.reset_offsets();
        let mut mpu = driver(fake);
        let status = block_on(mpu.initialize_phase_one(&mut delay, &mut store)).unwrap();
        assert_eq!(status, DeviceStatus::Correct);
        assert_eq!(block_on(mpu.get_offsets()).unwrap(), saved.offsets);
    }

    #[test]
    fn test_bus_error_latches() {
        let mut fake = FakeMpu::new();
        fake.fail_next(BUS_ATTEMPTS);
        let mut mpu = driver(fake);

        assert!(matches!(block_on(mpu.motion6()), Err(Error::WriteReadError(_))));
        assert_eq!(mpu.status(), DeviceStatus::BusError);

        let before = mpu.i2c.transactions;
        assert!(matches!(block_on(mpu.temperature()), Err(Error::BusFaulted)));
        assert!(matches!(
            block_on(mpu.set_offsets(&SixAxis::ZERO)),
            Err(Error::BusFaulted)
        ));
        assert_eq!(mpu.i2c.transactions, before);
    }

    #[test]
    fn test_self_test_failure() {
        let mut fake = FakeMpu::new();
        // gyro Y code 12 deviates by about 0.22%
        fake.set_self_test_block([8, 12, 12, 0]);
        let settings = quick_settings().with_self_test_threshold(0.2);
        let mut mpu = Mpu6050::with_settings(fake, Address::Ad0Low, settings);
        let mut store = CalibrationStore::new(MemoryEeprom::new());

        let result = block_on(mpu.initialize_phase_one(&mut NoopDelay::new(), &mut store));
        assert!(matches!(result, Err(Error::SelfTestFailed(Axis::GyroY))));
        assert_eq!(mpu.status(), DeviceStatus::SelfTestFailed(Axis::GyroY));
    }

    #[test]
    fn test_verified_write_mismatch() {
        let mut fake = FakeMpu::new();
        fake.stick(Register::GyroOffsetX_L as u8, 0x55);
        let mut mpu = driver(fake);

        let result = block_on(mpu.set_offsets(&SixAxis::new([0, 0, 0, 0x0102, 0, 0])));
        assert!(matches!(
            result,
            Err(Error::VerifyMismatch {
                register: 0x14,
                expected: 0x02,
                found: 0x55
            })
        ));
        assert_eq!(mpu.status(), DeviceStatus::BusError);
    }

    #[test]
    fn test_update_orientation_requires_correct_status() {
        let mut mpu = driver(FakeMpu::new());
        assert_eq!(block_on(mpu.update_orientation(100)), [0.0, 0.0]);
        assert_eq!(mpu.i2c.transactions, 0);
    }
}
