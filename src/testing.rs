//! Simulated device, memory and timing for the unit tests.

use crate::{
    axis::OffsetVector,
    calibration::CalibrationParameters,
    config::Settings,
    data_ready::{DataReady, DataReadyAsync},
    registers::Register,
    store::Eeprom,
};
use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

const DEVICE_ADDRESS: u8 = 0x68;
const ACCEL_LSB: [f64; 4] = [16384.0, 8192.0, 4096.0, 2048.0];
const GYRO_LSB: [f64; 4] = [131.0, 65.5, 32.8, 16.4];

/// Settings with short averages so a full calibration runs quickly.
pub fn quick_settings() -> Settings {
    Settings::default().with_calibration(
        CalibrationParameters::default()
            .with_samples(10, 20)
            .with_correction_samples(10),
    )
}

/// Register-level model of an MPU-6050 resting in a fixed pose.
///
/// Readings are computed from the pose, a per-channel bias and the offset
/// registers each time the data registers are read:
/// - accelerometer: `gravity + (bias + offset * accel_offset_gain) / 16384` g
/// - gyroscope: `(bias + offset * gyro_offset_gain) / 131` dps
///
/// so `bias` is in counts at ±2g / 250dps, then scaled to the selected ranges.
pub struct FakeMpu {
    registers: [u8; 128],
    pointer: u8,
    pub gravity: [f64; 3],
    pub bias: [i32; 6],
    /// Accelerometer counts at ±2g per offset register step
    pub accel_offset_gain: f64,
    /// Gyroscope counts at 250dps per offset register step
    pub gyro_offset_gain: f64,
    /// Bus transactions attempted, failed ones included
    pub transactions: usize,
    failures: usize,
    stuck: Option<(u8, u8)>,
}

impl FakeMpu {
    pub fn new() -> Self {
        let mut registers = [0; 128];
        registers[Register::WhoAmI as usize] = 0x68;
        registers[Register::PwrMgmt1 as usize] = 0x40;
        registers[Register::SelfTestX as usize..=Register::SelfTestA as usize]
            .copy_from_slice(&[0xCC, 0xCC, 0xCC, 0x00]);
        Self {
            registers,
            pointer: 0,
            gravity: [0.0, 0.0, 1.0],
            bias: [0; 6],
            accel_offset_gain: 8.0,
            gyro_offset_gain: 131.0 / 32.8,
            transactions: 0,
            failures: 0,
            stuck: None,
        }
    }

    pub fn register(&self, register: Register) -> u8 {
        self.registers[register as usize]
    }

    pub fn set_register(&mut self, register: Register, value: u8) {
        self.registers[register as usize] = value;
    }

    pub fn set_self_test_block(&mut self, block: [u8; 4]) {
        let start = Register::SelfTestX as usize;
        self.registers[start..start + 4].copy_from_slice(&block);
    }

    /// Current content of the offset registers
    pub fn offsets(&self) -> OffsetVector {
        let mut data = [0; 12];
        let accel = Register::AccelOffsetX_H as usize;
        let gyro = Register::GyroOffsetX_H as usize;
        data[..6].copy_from_slice(&self.registers[accel..accel + 6]);
        data[6..].copy_from_slice(&self.registers[gyro..gyro + 6]);
        OffsetVector::from_be_bytes(data)
    }

    /// Power cycle: the offset registers lose their value
    pub fn reset_offsets(&mut self) {
        let accel = Register::AccelOffsetX_H as usize;
        let gyro = Register::GyroOffsetX_H as usize;
        self.registers[accel..accel + 6].fill(0);
        self.registers[gyro..gyro + 6].fill(0);
    }

    /// Make the next `n` transactions fail
    pub fn fail_next(&mut self, n: usize) {
        self.failures = n;
    }

    /// Ignore writes to `register`, which always reads `value`
    pub fn stick(&mut self, register: u8, value: u8) {
        self.stuck = Some((register, value));
        self.registers[register as usize] = value;
    }

    fn refresh_measurements(&mut self) {
        let offsets = self.offsets().values();
        let accel_lsb = ACCEL_LSB[((self.register(Register::AccelConfig) >> 3) & 3) as usize];
        let gyro_lsb = GYRO_LSB[((self.register(Register::GyroConfig) >> 3) & 3) as usize];

        let mut values = [0.0; 6];
        for i in 0..3 {
            let accel = self.bias[i] as f64 + offsets[i] as f64 * self.accel_offset_gain;
            values[i] = (self.gravity[i] + accel / 16384.0) * accel_lsb;
            let gyro = self.bias[3 + i] as f64 + offsets[3 + i] as f64 * self.gyro_offset_gain;
            values[3 + i] = gyro / 131.0 * gyro_lsb;
        }

        let counts = values.map(|v| v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
        for (i, count) in counts.iter().enumerate() {
            let start = if i < 3 {
                Register::AccelX_H as usize + 2 * i
            } else {
                Register::GyroX_H as usize + 2 * (i - 3)
            };
            self.registers[start..start + 2].copy_from_slice(&count.to_be_bytes());
        }
    }

    fn run(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), ErrorKind> {
        self.transactions += 1;
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ErrorKind::Other);
        }
        if address != DEVICE_ADDRESS {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    let Some((register, data)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = *register;
                    for value in data {
                        if self.stuck.map(|(r, _)| r) != Some(self.pointer) {
                            self.registers[self.pointer as usize] = *value;
                        }
                        self.pointer += 1;
                    }
                }
                Operation::Read(buffer) => {
                    self.refresh_measurements();
                    for byte in buffer.iter_mut() {
                        *byte = self.registers[self.pointer as usize];
                        self.pointer += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

impl ErrorType for FakeMpu {
    type Error = ErrorKind;
}

impl embedded_hal::i2c::I2c for FakeMpu {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(address, operations)
    }
}

impl embedded_hal_async::i2c::I2c for FakeMpu {
    async fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.run(address, operations)
    }
}

/// Delay that returns immediately, keeping count of the time asked for.
#[derive(Default)]
pub struct NoopDelay {
    pub requested_ns: u64,
}

impl NoopDelay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl embedded_hal::delay::DelayNs for NoopDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.requested_ns += ns as u64;
    }
}

impl embedded_hal_async::delay::DelayNs for NoopDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.requested_ns += ns as u64;
    }
}

/// Data-ready source producing a sample every `period` ms.
pub struct Ticker {
    pub now: u64,
    pub period: u64,
    /// Notifications handed out so far
    pub samples: u64,
}

impl Ticker {
    pub fn new(period: u64) -> Self {
        Self {
            now: 0,
            period,
            samples: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.now += self.period;
        self.samples += 1;
        self.now
    }
}

impl DataReady for Ticker {
    fn wait_for_sample(&mut self) -> u64 {
        self.tick()
    }
}

impl DataReadyAsync for Ticker {
    async fn wait_for_sample(&mut self) -> u64 {
        self.tick()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    PowerLost,
    ReadFailed,
}

/// Byte-addressed memory, blank (0xFF) at start.
pub struct MemoryEeprom {
    bytes: [u8; 1024],
    updates: [usize; 1024],
    power_budget: Option<usize>,
    stuck: Option<(u16, u8)>,
    reads_fail: bool,
}

impl MemoryEeprom {
    pub fn new() -> Self {
        Self {
            bytes: [0xFF; 1024],
            updates: [0; 1024],
            power_budget: None,
            stuck: None,
            reads_fail: false,
        }
    }

    pub fn contents(&self, start: usize, len: usize) -> Vec<u8> {
        self.bytes[start..start + len].to_vec()
    }

    /// Let `n` more updates through, then fail every update
    pub fn cut_power_after(&mut self, n: usize) {
        self.power_budget = Some(n);
    }

    pub fn restore_power(&mut self) {
        self.power_budget = None;
    }

    /// Ignore updates of `address`, which always reads `value`
    pub fn stick(&mut self, address: u16, value: u8) {
        self.stuck = Some((address, value));
        self.bytes[address as usize] = value;
    }

    pub fn fail_reads(&mut self) {
        self.reads_fail = true;
    }

    /// Update calls made for `address`
    pub fn updates(&self, address: u16) -> usize {
        self.updates[address as usize]
    }
}

impl Eeprom for MemoryEeprom {
    type Error = MemoryError;

    fn read(&mut self, address: u16) -> Result<u8, MemoryError> {
        if self.reads_fail {
            return Err(MemoryError::ReadFailed);
        }
        Ok(self.bytes[address as usize])
    }

    fn update(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        self.updates[address as usize] += 1;
        match self.power_budget {
            Some(0) => return Err(MemoryError::PowerLost),
            Some(n) => self.power_budget = Some(n - 1),
            None => {}
        }
        if self.stuck.map(|(a, _)| a) != Some(address) {
            self.bytes[address as usize] = value;
        }
        Ok(())
    }
}
