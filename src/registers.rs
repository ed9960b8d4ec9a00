//! MPU6050 Register Map
//!
//! Only the registers the driver touches are listed. Addresses and the bit
//! layouts documented on each variant are fixed by the device and must not change.
//!
//! Groups:
//! - Self-test results: factory trim codes latched while self-test is active
//! - Offset registers: per-channel bias added by the device before reporting
//! - Configuration: full-scale, filtering, sample rate, interrupts, power
//! - Data: accelerometer, temperature and gyroscope measurements

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Register {
    // Accelerometer offset registers (high byte first)
    AccelOffsetX_H = 0x06,
    AccelOffsetX_L = 0x07,
    AccelOffsetY_H = 0x08,
    AccelOffsetY_L = 0x09,
    AccelOffsetZ_H = 0x0A,
    AccelOffsetZ_L = 0x0B,

    /// Self-test X (0x0D): XA_TEST[4:2] in bits 7:5, XG_TEST in bits 4:0
    SelfTestX = 0x0D,
    /// Self-test Y (0x0E): YA_TEST[4:2] in bits 7:5, YG_TEST in bits 4:0
    SelfTestY = 0x0E,
    /// Self-test Z (0x0F): ZA_TEST[4:2] in bits 7:5, ZG_TEST in bits 4:0
    SelfTestZ = 0x0F,
    /// Self-test A (0x10): accelerometer low bits shared by all three axes
    SelfTestA = 0x10,

    // Gyroscope offset registers (high byte first)
    GyroOffsetX_H = 0x13,
    GyroOffsetX_L = 0x14,
    GyroOffsetY_H = 0x15,
    GyroOffsetY_L = 0x16,
    GyroOffsetZ_H = 0x17,
    GyroOffsetZ_L = 0x18,

    /// Sample Rate Divider (0x19)
    /// Sample rate = gyroscope output rate / (1 + value)
    SmpRtDiv = 0x19,

    /// Configuration (0x1A)
    /// Bits 5:3 external sync, bits 2:0 digital low pass filter
    Config = 0x1A,

    /// Gyroscope Configuration (0x1B)
    /// Bits 7:5 self-test enable, bits 4:3 full-scale
    GyroConfig = 0x1B,

    /// Accelerometer Configuration (0x1C)
    /// Bits 7:5 self-test enable, bits 4:3 full-scale
    AccelConfig = 0x1C,

    /// Interrupt Enable (0x38)
    /// Bit 0 enables the data ready interrupt
    IntEnable = 0x38,

    // Accelerometer data
    AccelX_H = 0x3B,
    AccelX_L = 0x3C,
    AccelY_H = 0x3D,
    AccelY_L = 0x3E,
    AccelZ_H = 0x3F,
    AccelZ_L = 0x40,

    // Temperature data
    TempOut_H = 0x41,
    TempOut_L = 0x42,

    // Gyroscope data
    GyroX_H = 0x43,
    GyroX_L = 0x44,
    GyroY_H = 0x45,
    GyroY_L = 0x46,
    GyroZ_H = 0x47,
    GyroZ_L = 0x48,

    /// Signal Path Reset (0x68)
    /// Bits 2:0 reset the gyroscope, accelerometer and temperature signal paths
    SignalPathReset = 0x68,

    /// Power Management 1 (0x6B)
    /// Bit 7 device reset, bit 6 sleep, bit 5 cycle, bit 3 temperature disable,
    /// bits 2:0 clock source
    PwrMgmt1 = 0x6B,

    /// Who Am I (0x75)
    /// Bits 6:1 hold the upper six bits of the I2C address
    WhoAmI = 0x75,
}

impl Register {
    /// Register `n` places after this one (used to walk offset register pairs).
    pub(crate) const fn offset_by(self, n: u8) -> u8 {
        self as u8 + n
    }
}

/// Number of bytes in the measurement burst starting at [`Register::AccelX_H`]
/// (accelerometer, temperature, gyroscope).
pub(crate) const MOTION_BURST_LEN: usize = 14;

/// Number of bytes in the self-test result block starting at [`Register::SelfTestX`].
pub(crate) const SELF_TEST_BLOCK_LEN: usize = 4;

/// Expected value of `WHO_AM_I & WHO_AM_I_MASK`.
pub(crate) const WHO_AM_I_VALUE: u8 = 0x68;
pub(crate) const WHO_AM_I_MASK: u8 = 0x7E;

/// Full-scale and self-test bits of [`Register::AccelConfig`] / [`Register::GyroConfig`].
pub(crate) const FULL_SCALE_MASK: u8 = 0xF8;
/// Accelerometer self-test on all axes at ±8g
pub(crate) const ACCEL_SELF_TEST_VALUE: u8 = 0xF0;
/// Gyroscope self-test on all axes at 250dps
pub(crate) const GYRO_SELF_TEST_VALUE: u8 = 0xE0;

/// Low pass filter bits of [`Register::Config`] (external sync is cleared too).
pub(crate) const DLPF_MASK: u8 = 0x3F;

/// Interrupt configuration bits the driver owns in [`Register::IntEnable`].
pub(crate) const INT_ENABLE_MASK: u8 = 0x19;
/// Data ready interrupt
pub(crate) const INT_DATA_READY: u8 = 0x01;

/// Reset bits of [`Register::SignalPathReset`].
pub(crate) const SIGNAL_PATH_RESET_MASK: u8 = 0x07;
pub(crate) const SIGNAL_PATH_RESET_ALL: u8 = 0xFF;

/// Power management bits the driver owns in [`Register::PwrMgmt1`]
/// (device reset, sleep, cycle, temperature disable).
pub(crate) const POWER_MODE_MASK: u8 = 0xE8;
pub(crate) const POWER_MODE_SLEEP: u8 = 0x40;
pub(crate) const POWER_MODE_AWAKE: u8 = 0x00;
/// Clock source bits of [`Register::PwrMgmt1`].
pub(crate) const CLOCK_SOURCE_MASK: u8 = 0x07;
