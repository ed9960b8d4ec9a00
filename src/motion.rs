//! Physical-unit motion samples.

use crate::{
    accel::{Accel, AccelFullScale},
    axis::{Axis, OffsetCorrection, SixAxis},
    config::Settings,
    gyro::{Gyro, GyroFullScale},
};

/// One accelerometer + gyroscope sample, in g and rad/s.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "postcard-experimental", derive(postcard::experimental::max_size::MaxSize))]
pub struct Motion {
    pub accel: Accel,
    pub gyro: Gyro,
}

impl Motion {
    pub const fn new(accel: Accel, gyro: Gyro) -> Self {
        Self { accel, gyro }
    }

    /// Convert raw counts taken at the given ranges.
    pub fn from_raw(raw: &SixAxis<i16>, accel_scale: AccelFullScale, gyro_scale: GyroFullScale) -> Self {
        let a = |axis: Axis| accel_scale.scale_value(raw[axis] as f64);
        let g = |axis: Axis| gyro_scale.scale_value(raw[axis] as f64);
        Self {
            accel: Accel::new(a(Axis::AccelX), a(Axis::AccelY), a(Axis::AccelZ)),
            gyro: Gyro::new(g(Axis::GyroX), g(Axis::GyroY), g(Axis::GyroZ)),
        }
    }

    /// Convert a raw sample taken at the working ranges and remove the residual
    /// bias.
    ///
    /// `raw` is scaled with the working ranges, `correction` with the ranges it
    /// was measured at (the calibration ranges).
    pub fn compensate(raw: &SixAxis<i16>, correction: &OffsetCorrection, settings: &Settings) -> Self {
        let measured = Self::from_raw(raw, settings.accel_scale, settings.gyro_scale);
        let bias = Self::from_raw(
            correction,
            settings.calibration.accel_scale,
            settings.calibration.gyro_scale,
        );
        Self {
            accel: Accel::new(
                measured.accel.x - bias.accel.x,
                measured.accel.y - bias.accel.y,
                measured.accel.z - bias.accel.z,
            ),
            gyro: Gyro::new(
                measured.gyro.x - bias.gyro.x,
                measured.gyro.y - bias.gyro.y,
                measured.gyro.z - bias.gyro.z,
            ),
        }
    }
}
