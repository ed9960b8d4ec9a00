use core::f64::consts::PI;

/// Gyroscope full-scale range.
///
/// The discriminant is the `FS_SEL` field value (bits 4:3 of the gyroscope
/// configuration register).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GyroFullScale {
    Deg250 = 0,
    Deg500 = 1,
    Deg1000 = 2,
    Deg2000 = 3,
}

impl GyroFullScale {
    /// Sensitivity in LSB per degree per second
    pub const fn scale(self) -> f64 {
        match self {
            Self::Deg250 => 131.0,
            Self::Deg500 => 65.5,
            Self::Deg1000 => 32.8,
            Self::Deg2000 => 16.4,
        }
    }

    /// Configuration register value selecting this range with self-test off
    pub const fn config_bits(self) -> u8 {
        (self as u8) << 3
    }

    /// Convert counts at this range to rad/s
    pub fn scale_value(self, value: f64) -> f64 {
        value * (PI / (180.0 * self.scale()))
    }
}

/// Angular rate in rad/s.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "postcard-experimental", derive(postcard::experimental::max_size::MaxSize))]
pub struct Gyro {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Gyro {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}
