/// Accelerometer full-scale range.
///
/// The discriminant is the `AFS_SEL` field value (bits 4:3 of the accelerometer
/// configuration register).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccelFullScale {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelFullScale {
    /// Sensitivity in LSB per g
    pub const fn scale(self) -> f64 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }

    /// Raw reading of 1g at this range
    pub const fn one_g(self) -> i16 {
        match self {
            Self::G2 => 16384,
            Self::G4 => 8192,
            Self::G8 => 4096,
            Self::G16 => 2048,
        }
    }

    /// Configuration register value selecting this range with self-test off
    pub const fn config_bits(self) -> u8 {
        (self as u8) << 3
    }

    pub fn scale_value(self, value: f64) -> f64 {
        value / self.scale()
    }
}

/// Acceleration in g.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "postcard-experimental", derive(postcard::experimental::max_size::MaxSize))]
pub struct Accel {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Accel {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Length of the vector, 1.0 at rest
    pub fn magnitude(&self) -> f64 {
        libm::sqrt(self.x * self.x + self.y * self.y + self.z * self.z)
    }
}
