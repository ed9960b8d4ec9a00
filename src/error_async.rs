//! Error type of the async driver, identical in shape to [`crate::error::Error`].

use crate::{axis::Axis, status::DeviceStatus};
use core::fmt::{Debug, Formatter};
use embedded_hal_async::i2c::I2c;

/// Error for sensor operations.
///
/// Bus failures are reported with the error of the last attempt. Once one has
/// been returned the driver stays in [`DeviceStatus::BusError`] and every further
/// bus operation fails with [`Error::BusFaulted`] until phase one runs again.
pub enum Error<I>
where
    I: I2c,
{
    WriteError(I::Error),
    WriteReadError(I::Error),
    /// A verified write read back a different value on every attempt
    VerifyMismatch { register: u8, expected: u8, found: u8 },
    /// `WHO_AM_I` did not identify an MPU-6050
    WrongDevice(u8),
    /// A previous bus failure is latched
    BusFaulted,
    SelfTestFailed(Axis),
    /// The offset search ran out of iterations
    CalibrationExhausted,
    /// The operation is not allowed in this status
    InvalidState(DeviceStatus),
}

impl<I> Debug for Error<I>
where
    I: I2c,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::WriteReadError(e) => f.debug_tuple("WriteReadError").field(e).finish(),
            Self::WriteError(e) => f.debug_tuple("WriteError").field(e).finish(),
            Self::VerifyMismatch {
                register,
                expected,
                found,
            } => f
                .debug_struct("VerifyMismatch")
                .field("register", register)
                .field("expected", expected)
                .field("found", found)
                .finish(),
            Self::WrongDevice(id) => f.debug_tuple("WrongDevice").field(id).finish(),
            Self::BusFaulted => f.write_str("BusFaulted"),
            Self::SelfTestFailed(axis) => f.debug_tuple("SelfTestFailed").field(axis).finish(),
            Self::CalibrationExhausted => f.write_str("CalibrationExhausted"),
            Self::InvalidState(status) => f.debug_tuple("InvalidState").field(status).finish(),
        }
    }
}

#[cfg(feature = "defmt-03")]
impl<I> defmt::Format for Error<I>
where
    I: I2c,
{
    fn format(&self, f: defmt::Formatter) {
        use embedded_hal_async::i2c::Error as _;
        match self {
            Self::WriteReadError(e) => defmt::write!(f, "WriteReadError({})", e.kind()),
            Self::WriteError(e) => defmt::write!(f, "WriteError({})", e.kind()),
            Self::VerifyMismatch {
                register,
                expected,
                found,
            } => defmt::write!(
                f,
                "VerifyMismatch {{ register: {=u8:#x}, expected: {=u8:#x}, found: {=u8:#x} }}",
                register,
                expected,
                found
            ),
            Self::WrongDevice(id) => defmt::write!(f, "WrongDevice({=u8:#x})", id),
            Self::BusFaulted => defmt::write!(f, "BusFaulted"),
            Self::SelfTestFailed(axis) => defmt::write!(f, "SelfTestFailed({})", axis),
            Self::CalibrationExhausted => defmt::write!(f, "CalibrationExhausted"),
            Self::InvalidState(status) => defmt::write!(f, "InvalidState({})", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::{axis::Axis, testing::FakeMpu};

    #[test]
    fn test_debug() {
        let e: Error<FakeMpu> = Error::SelfTestFailed(Axis::GyroY);
        assert_eq!(format!("{:?}", e), "SelfTestFailed(GyroY)");
        let e: Error<FakeMpu> = Error::WrongDevice(0x70);
        assert_eq!(format!("{:?}", e), "WrongDevice(112)");
    }
}
