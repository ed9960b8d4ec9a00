//! Device lifecycle status.
//!
//! The driver owns a single [`DeviceStatus`] value. Every operation updates it
//! before returning an error, so after a failed call [`status`](crate::sensor::Mpu6050::status)
//! tells the precise cause.
//!
//! ```text
//! NotInitialized --(probe, self-test, config)--> NotCalibrated | Correct
//! NotCalibrated  --(calibration)---------------> Correct
//! any            --(bus failure)---------------> BusError          (terminal)
//! NotInitialized --(self-test failure)---------> SelfTestFailed(_) (terminal)
//! NotCalibrated  --(search exhausted)----------> CalibrationError  (terminal)
//! ```

use crate::axis::Axis;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceStatus {
    /// Bring-up has not completed yet
    #[default]
    NotInitialized,
    /// Configured, calibrated and producing compensated data
    Correct,
    /// The bus failed after all retries; no more bus traffic this attempt
    BusError,
    /// The given channel failed its self-test; the device may be damaged
    SelfTestFailed(Axis),
    /// No usable stored calibration, phase two must calibrate
    NotCalibrated,
    /// The offset search ran out of iterations
    CalibrationError,
}

impl DeviceStatus {
    /// Numeric state code, compatible with the codes reported by earlier firmware
    /// (self-test failures occupy 3..=8 in channel order).
    pub const fn code(self) -> u8 {
        match self {
            Self::NotInitialized => 0,
            Self::Correct => 1,
            Self::BusError => 2,
            Self::SelfTestFailed(axis) => 3 + axis as u8,
            Self::NotCalibrated => 9,
            Self::CalibrationError => 10,
        }
    }

    /// Inverse of [`code`](Self::code)
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::NotInitialized,
            1 => Self::Correct,
            2 => Self::BusError,
            3 => Self::SelfTestFailed(Axis::AccelX),
            4 => Self::SelfTestFailed(Axis::AccelY),
            5 => Self::SelfTestFailed(Axis::AccelZ),
            6 => Self::SelfTestFailed(Axis::GyroX),
            7 => Self::SelfTestFailed(Axis::GyroY),
            8 => Self::SelfTestFailed(Axis::GyroZ),
            9 => Self::NotCalibrated,
            10 => Self::CalibrationError,
            _ => return None,
        })
    }

    /// Whether this status ends the current bring-up attempt
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::BusError | Self::SelfTestFailed(_) | Self::CalibrationError
        )
    }
}
