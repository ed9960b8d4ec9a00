//! MPU6050 Clock Source
//!
//! The gyroscope PLLs are more stable than the internal oscillator, and the
//! working configuration runs the sample clock from the Z gyroscope.

/// Clock source selection (bits 2:0 of power management 1).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClockSource {
    /// Internal 8MHz oscillator
    Internal = 0,
    /// X gyroscope PLL
    Xgyro = 1,
    /// Y gyroscope PLL
    Ygyro = 2,
    /// Z gyroscope PLL
    Zgyro = 3,
    /// External 32.768kHz reference
    External32768 = 4,
    /// External 19.2MHz reference
    External19200 = 5,
    /// Clock stopped, the device keeps its timing generator in reset
    Stop = 7,
}
