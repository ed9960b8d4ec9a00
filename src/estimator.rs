//! Two-axis tilt estimation.
//!
//! A scalar Kalman filter per axis: the gyroscope rates, rotated into the
//! level frame, predict the angles; the direction of gravity measured by the
//! accelerometer corrects them. Yaw is not observable this way and is not
//! estimated.
//!
//! Angles are in radians: index 0 is the rotation about X (roll), index 1 the
//! rotation about Y (pitch).

use crate::{accel::Accel, gyro::Gyro, motion::Motion};

/// Variance of the gyroscope rate noise, (rad/s)².
pub const GYRO_VARIANCE: f64 = 0.203263527368261;

/// Variance assigned to an accelerometer estimate with no measurable gravity.
pub const NO_GRAVITY_VARIANCE: f64 = 1000.0;

/// Filter state, in radians / rad².
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "postcard-experimental", derive(postcard::experimental::max_size::MaxSize))]
pub struct OrientationState {
    pub angle: [f64; 2],
    pub covariance: [f64; 2],
    /// Rotated rates of the previous step, for trapezoidal integration
    pub prev_rotated_rate: [f64; 2],
    /// Timestamp of the previous step (ms)
    pub prev_timestamp: u64,
}

/// Tilt angles implied by the direction of gravity, with the variance of that
/// estimate.
///
/// The variance grows with the distance of the magnitude from 1g, which is where
/// linear acceleration makes the gravity direction unreliable. A zero vector
/// gives `([0, 0], NO_GRAVITY_VARIANCE)`.
pub fn accel_estimate(accel: &Accel) -> ([f64; 2], f64) {
    let magnitude = accel.magnitude();
    if magnitude == 0.0 {
        return ([0.0, 0.0], NO_GRAVITY_VARIANCE);
    }

    let error = magnitude - 1.0;
    let variance = magnitude + 1.0 + 10.0 * error * error;

    let x = accel.x / magnitude;
    let y = accel.y / magnitude;
    let z = accel.z / magnitude;
    let angle = [
        libm::atan2(y, libm::sqrt(x * x + z * z)),
        -libm::atan2(x, libm::sqrt(y * y + z * z)),
    ];
    (angle, variance)
}

/// Angular rates about the level X and Y axes at the given tilt.
pub fn rotate_rates(gyro: &Gyro, angle: &[f64; 2]) -> [f64; 2] {
    let (sin_x, cos_x) = (libm::sin(angle[0]), libm::cos(angle[0]));
    let (sin_y, cos_y) = (libm::sin(angle[1]), libm::cos(angle[1]));
    [
        gyro.x * cos_x + gyro.z * sin_y,
        gyro.x * sin_x * sin_y + gyro.y * cos_x - gyro.z * sin_x * cos_y,
    ]
}

/// Accelerometer-only tilt (no filtering).
pub fn accel_only(motion: &Motion) -> [f64; 2] {
    accel_estimate(&motion.accel).0
}

#[derive(Clone, Debug, Default)]
pub struct OrientationEstimator {
    state: OrientationState,
}

impl OrientationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &OrientationState {
        &self.state
    }

    pub fn angle(&self) -> [f64; 2] {
        self.state.angle
    }

    /// Restart from the accelerometer's view of `motion` at `timestamp`.
    pub fn reset(&mut self, motion: &Motion, timestamp: u64) {
        let (angle, variance) = accel_estimate(&motion.accel);
        self.state = OrientationState {
            angle,
            covariance: [variance; 2],
            prev_rotated_rate: rotate_rates(&motion.gyro, &angle),
            prev_timestamp: timestamp,
        };
    }

    /// Gyroscope prediction: integrate the rotated rates since the previous step.
    fn predict(&mut self, gyro: &Gyro, timestamp: u64) -> [f64; 2] {
        let rate = rotate_rates(gyro, &self.state.angle);
        let dt = timestamp.wrapping_sub(self.state.prev_timestamp) as f64 / 1000.0;

        for i in 0..2 {
            self.state.angle[i] += dt / 2.0 * (rate[i] + self.state.prev_rotated_rate[i]);
        }
        self.state.covariance[0] += dt * dt * GYRO_VARIANCE;
        self.state.covariance[1] = self.state.covariance[0];

        self.state.prev_rotated_rate = rate;
        self.state.prev_timestamp = timestamp;
        self.state.angle
    }

    /// Gyroscope integration only, without the accelerometer correction.
    pub fn step_gyro_only(&mut self, motion: &Motion, timestamp: u64) -> [f64; 2] {
        self.predict(&motion.gyro, timestamp)
    }

    /// One filter step with the sample taken at `timestamp` (ms).
    pub fn step(&mut self, motion: &Motion, timestamp: u64) -> [f64; 2] {
        self.predict(&motion.gyro, timestamp);

        let (measured, variance) = accel_estimate(&motion.accel);
        for i in 0..2 {
            let covariance = self.state.covariance[i];
            let gain = covariance / (covariance + variance);
            self.state.angle[i] += gain * (measured[i] - self.state.angle[i]);
            self.state.covariance[i] = (1.0 - gain) * covariance;
        }
        trace!(
            "orientation {} {} covariance {}",
            self.state.angle[0],
            self.state.angle[1],
            self.state.covariance[0]
        );
        self.state.angle
    }
}

#[cfg(test)]
mod tests {
    use super::{accel_estimate, rotate_rates, OrientationEstimator, GYRO_VARIANCE, NO_GRAVITY_VARIANCE};
    use crate::{
        accel::{Accel, AccelFullScale},
        axis::SixAxis,
        gyro::{Gyro, GyroFullScale},
        motion::Motion,
    };
    use approx::assert_relative_eq;

    fn level() -> Motion {
        Motion::new(Accel::new(0.0, 0.0, 1.0), Gyro::default())
    }

    #[test]
    fn test_accel_estimate_level() {
        let (angle, variance) = accel_estimate(&Accel::new(0.0, 0.0, 1.0));
        assert_eq!(angle, [0.0, 0.0]);
        assert_relative_eq!(variance, 2.0);
    }

    #[test]
    fn test_accel_estimate_tilt_and_variance() {
        let (angle, _) = accel_estimate(&Accel::new(0.0, libm::sin(0.3), libm::cos(0.3)));
        assert_relative_eq!(angle[0], 0.3, epsilon = 1e-12);
        assert_relative_eq!(angle[1], 0.0);

        // tilting about Y moves gravity towards -X
        let (angle, _) = accel_estimate(&Accel::new(-libm::sin(0.2), 0.0, libm::cos(0.2)));
        assert_relative_eq!(angle[1], 0.2, epsilon = 1e-12);

        // 2g: 2 + 1 + 10
        let (_, variance) = accel_estimate(&Accel::new(0.0, 0.0, 2.0));
        assert_relative_eq!(variance, 13.0);
    }

    #[test]
    fn test_zero_gravity() {
        assert_eq!(
            accel_estimate(&Accel::default()),
            ([0.0, 0.0], NO_GRAVITY_VARIANCE)
        );
    }

    #[test]
    fn test_rotation_at_level_is_identity() {
        let rate = rotate_rates(&Gyro::new(0.1, -0.2, 0.3), &[0.0, 0.0]);
        assert_relative_eq!(rate[0], 0.1);
        assert_relative_eq!(rate[1], -0.2);
    }

    #[test]
    fn test_zero_dt_skips_integration_but_corrects() {
        let mut estimator = OrientationEstimator::new();
        estimator.reset(&level(), 100);

        let tilted = Motion::new(
            Accel::new(0.0, libm::sin(0.4), libm::cos(0.4)),
            Gyro::new(5.0, 5.0, 5.0),
        );
        let angle = estimator.step(&tilted, 100);

        // no integration, equal covariances: the estimate lands halfway
        assert_relative_eq!(angle[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(angle[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(estimator.state().covariance[0], 1.0, epsilon = 1e-12);
        assert_eq!(estimator.state().prev_rotated_rate, rotate_rates(&tilted.gyro, &[0.0, 0.0]));
    }

    #[test]
    fn test_rest_z_up_keeps_level_with_shrinking_covariance() {
        let raw = SixAxis::new([0, 0, 16384, 0, 0, 0]);
        let motion = Motion::from_raw(&raw, AccelFullScale::G2, GyroFullScale::Deg250);

        let mut estimator = OrientationEstimator::new();
        estimator.reset(&motion, 0);
        let mut covariance = estimator.state().covariance[0];
        for i in 1..=20 {
            let angle = estimator.step(&motion, i * 32);
            assert_relative_eq!(angle[0], 0.0);
            assert_relative_eq!(angle[1], 0.0);

            let state = estimator.state();
            assert!(state.covariance[0] < covariance);
            assert_eq!(state.covariance[0], state.covariance[1]);
            covariance = state.covariance[0];
        }
    }

    #[test]
    fn test_converges_to_accelerometer_tilt() {
        let tilted = Motion::new(Accel::new(0.0, libm::sin(0.3), libm::cos(0.3)), Gyro::default());
        let mut estimator = OrientationEstimator::new();
        estimator.reset(&level(), 0);
        for i in 1..=500 {
            estimator.step(&tilted, i * 32);
        }
        assert_relative_eq!(estimator.angle()[0], 0.3, epsilon = 1e-3);
        assert_relative_eq!(estimator.angle()[1], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gyro_only_integrates_trapezoid() {
        let mut estimator = OrientationEstimator::new();
        estimator.reset(&level(), 0);
        let spinning = Motion::new(Accel::new(0.0, 0.0, 1.0), Gyro::new(1.0, 0.0, 0.0));

        // previous rate 0, current rate 1 rad/s over 100ms
        let angle = estimator.step_gyro_only(&spinning, 100);
        assert_relative_eq!(angle[0], 0.05, epsilon = 1e-12);
        assert_relative_eq!(
            estimator.state().covariance[0],
            2.0 + 0.01 * GYRO_VARIANCE,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_timestamp_wrap() {
        let mut estimator = OrientationEstimator::new();
        let spinning = Motion::new(Accel::new(0.0, 0.0, 1.0), Gyro::new(0.0, 2.0, 0.0));
        estimator.reset(&spinning, u64::MAX - 9);

        // 20ms across the wrap at a constant 2 rad/s
        let angle = estimator.step_gyro_only(&spinning, 10);
        assert_relative_eq!(angle[1], 0.04, epsilon = 1e-12);
    }
}
