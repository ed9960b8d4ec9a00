/// Die temperature of the MPU-6050.
///
/// This is the temperature of the chip itself, which keeps rising for a few
/// minutes after power-on. Offset calibration is only valid close to the
/// temperature it was taken at, which is why the calibration store keeps it.
///
/// # Example
/// ```
/// # use mpu6050_tilt::temperature::Temperature;
/// let temp = Temperature::new(3990);
/// assert!((temp.celsius() - 48.26).abs() < 0.01);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Temperature {
    pub(crate) raw: i16,
}

impl Temperature {
    pub fn new(raw: i16) -> Self {
        Self { raw }
    }

    pub fn from_bytes(data: [u8; 2]) -> Self {
        Self {
            raw: i16::from_be_bytes(data),
        }
    }

    /// Raw `TEMP_OUT` value
    pub fn raw(&self) -> i16 {
        self.raw
    }

    /// Datasheet conversion: `TEMP_OUT / 340 + 36.53`
    pub fn celsius(&self) -> f32 {
        (self.raw as f32) / 340.0 + 36.53
    }
}

/// Whether a calibration taken at `calibrated` °C is still usable at `current` °C.
pub fn within_drift(calibrated: f32, current: f32, max_drift: f32) -> bool {
    libm::fabsf(current - calibrated) <= max_drift
}

#[cfg(test)]
mod tests {
    use super::{within_drift, Temperature};
    use approx::assert_relative_eq;

    #[test]
    fn test_celsius() {
        assert_relative_eq!(Temperature::new(0).celsius(), 36.53);
        assert_relative_eq!(Temperature::new(-340).celsius(), 35.53, epsilon = 1e-4);
        assert_relative_eq!(
            Temperature::from_bytes([0xF2, 0x2C]).celsius(),
            -3540.0 / 340.0 + 36.53,
            epsilon = 1e-4
        );
    }

    #[test]
    fn test_drift_threshold() {
        assert!(within_drift(25.0, 40.0, 25.0));
        assert!(within_drift(25.0, 50.0, 25.0));
        assert!(!within_drift(25.0, 50.5, 25.0));
        assert!(!within_drift(25.0, -0.5, 25.0));
    }
}
