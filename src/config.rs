//! Device configuration.
//!
//! The driver switches between two register configurations:
//! - the working configuration used while estimating orientation
//!   (chosen through [`Settings`])
//! - the calibration configuration used while searching offsets and measuring
//!   the residual correction (most sensitive ranges, widest filter, 1kHz)

use crate::{
    accel::AccelFullScale,
    calibration::CalibrationParameters,
    gyro::GyroFullScale,
};

/// Digital low-pass filter configurations (bits 2:0 of the configuration register).
///
/// Higher settings filter more noise at the cost of delay. `Filter0` is the only
/// one that keeps the 8kHz gyroscope output rate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DigitalLowPassFilter {
    /// 260Hz accelerometer / 256Hz gyroscope bandwidth
    Filter0 = 0,
    /// 184Hz / 188Hz
    Filter1 = 1,
    /// 94Hz / 98Hz
    Filter2 = 2,
    /// 44Hz / 42Hz
    Filter3 = 3,
    /// 21Hz / 20Hz
    Filter4 = 4,
    /// 10Hz / 10Hz
    Filter5 = 5,
    /// 5Hz / 5Hz
    Filter6 = 6,
}

/// Sample rate divider giving 1kHz from the 8kHz gyroscope clock.
pub const CALIBRATION_SAMPLE_RATE_DIVIDER: u8 = 0x07;

/// Sample rate divider for normal operation (31.25Hz).
pub const WORKING_SAMPLE_RATE_DIVIDER: u8 = 0x1F;

/// Maximum self-test deviation, in percent.
pub const SELF_TEST_THRESHOLD: f32 = 14.0;

/// Maximum difference between the calibration temperature and the current one
/// for a stored calibration to be reused, in °C.
pub const MAX_CALIBRATION_TEMPERATURE_DRIFT: f32 = 25.0;

/// Everything that shapes bring-up and estimation.
/// (all values are fixed for the lifetime of the driver)
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    /// Accelerometer range during normal operation
    pub accel_scale: AccelFullScale,
    /// Gyroscope range during normal operation
    pub gyro_scale: GyroFullScale,
    /// Low pass filter during normal operation
    pub filter: DigitalLowPassFilter,
    /// Sample rate divider during normal operation
    pub sample_rate_divider: u8,
    /// Self-test deviation limit in percent
    pub self_test_threshold: f32,
    /// Largest temperature change (°C) tolerated before a stored calibration is discarded
    pub max_temperature_drift: f32,
    /// Offset search parameters (also fixes the calibration ranges)
    pub calibration: CalibrationParameters,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accel_scale: AccelFullScale::G8,
            gyro_scale: GyroFullScale::Deg1000,
            filter: DigitalLowPassFilter::Filter2,
            sample_rate_divider: WORKING_SAMPLE_RATE_DIVIDER,
            self_test_threshold: SELF_TEST_THRESHOLD,
            max_temperature_drift: MAX_CALIBRATION_TEMPERATURE_DRIFT,
            calibration: CalibrationParameters::default(),
        }
    }
}

impl Settings {
    /// Change the working ranges
    /// (consumes and returns `Self` to be callable in a "builder-like" pattern)
    pub fn with_full_scale(self, accel_scale: AccelFullScale, gyro_scale: GyroFullScale) -> Self {
        Self {
            accel_scale,
            gyro_scale,
            ..self
        }
    }

    /// Change the working low pass filter
    pub fn with_filter(self, filter: DigitalLowPassFilter) -> Self {
        Self { filter, ..self }
    }

    /// Change the working sample rate divider
    pub fn with_sample_rate_divider(self, sample_rate_divider: u8) -> Self {
        Self {
            sample_rate_divider,
            ..self
        }
    }

    /// Change the self-test deviation limit
    pub fn with_self_test_threshold(self, self_test_threshold: f32) -> Self {
        Self {
            self_test_threshold,
            ..self
        }
    }

    /// Change the tolerated calibration temperature drift
    pub fn with_max_temperature_drift(self, max_temperature_drift: f32) -> Self {
        Self {
            max_temperature_drift,
            ..self
        }
    }

    /// Replace the offset search parameters
    pub fn with_calibration(self, calibration: CalibrationParameters) -> Self {
        Self {
            calibration,
            ..self
        }
    }
}
