//! Axis-indexed storage for the six measurement channels.
//!
//! Raw readings, offset register values, calibration targets, offset corrections
//! and self-test codes all share the same shape: one value per channel, in the
//! order the device lays out its registers (accelerometer X, Y, Z then gyroscope
//! X, Y, Z). [`SixAxis`] keeps that order in the type instead of relying on
//! array positions.

use core::ops::{Index, IndexMut};

/// One of the six measurement channels of the device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    AccelX = 0,
    AccelY = 1,
    AccelZ = 2,
    GyroX = 3,
    GyroY = 4,
    GyroZ = 5,
}

impl Axis {
    /// All channels, in register order.
    pub const ALL: [Axis; 6] = [
        Axis::AccelX,
        Axis::AccelY,
        Axis::AccelZ,
        Axis::GyroX,
        Axis::GyroY,
        Axis::GyroZ,
    ];

    /// Accelerometer channels
    pub const ACCEL: [Axis; 3] = [Axis::AccelX, Axis::AccelY, Axis::AccelZ];

    /// Gyroscope channels
    pub const GYRO: [Axis; 3] = [Axis::GyroX, Axis::GyroY, Axis::GyroZ];

    /// Position of the channel in register order
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_accel(self) -> bool {
        (self as usize) < 3
    }
}

/// A value for each of the six channels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SixAxis<T> {
    values: [T; 6],
}

impl<T: Copy> SixAxis<T> {
    pub const fn new(values: [T; 6]) -> Self {
        Self { values }
    }

    /// The same value on every channel
    pub const fn splat(value: T) -> Self {
        Self { values: [value; 6] }
    }

    pub const fn values(&self) -> [T; 6] {
        self.values
    }

    /// Apply `f` to every channel.
    pub fn map<U: Copy>(self, mut f: impl FnMut(Axis, T) -> U) -> SixAxis<U> {
        let mut values = [f(Axis::AccelX, self.values[0]); 6];
        for axis in &Axis::ALL[1..] {
            values[axis.index()] = f(*axis, self.values[axis.index()]);
        }
        SixAxis { values }
    }

    /// Combine two vectors channel by channel.
    pub fn zip_with<U: Copy, R: Copy>(
        self,
        other: SixAxis<U>,
        mut f: impl FnMut(T, U) -> R,
    ) -> SixAxis<R> {
        self.map(|axis, value| f(value, other[axis]))
    }

    /// Iterate `(axis, value)` pairs in register order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, T)> + '_ {
        Axis::ALL.iter().map(move |axis| (*axis, self.values[axis.index()]))
    }
}

impl SixAxis<i16> {
    pub const ZERO: Self = Self { values: [0; 6] };

    /// Decode six big-endian words as they appear in consecutive registers.
    pub fn from_be_bytes(data: [u8; 12]) -> Self {
        let mut values = [0i16; 6];
        for (value, chunk) in values.iter_mut().zip(data.chunks_exact(2)) {
            *value = i16::from_be_bytes([chunk[0], chunk[1]]);
        }
        Self { values }
    }

    /// Encode as six big-endian words (high byte first, like the registers).
    pub fn to_be_bytes(&self) -> [u8; 12] {
        let mut data = [0u8; 12];
        for (chunk, value) in data.chunks_exact_mut(2).zip(self.values.iter()) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        data
    }
}

impl<T> Index<Axis> for SixAxis<T> {
    type Output = T;

    fn index(&self, axis: Axis) -> &T {
        &self.values[axis as usize]
    }
}

impl<T> IndexMut<Axis> for SixAxis<T> {
    fn index_mut(&mut self, axis: Axis) -> &mut T {
        &mut self.values[axis as usize]
    }
}

impl<T> From<[T; 6]> for SixAxis<T> {
    fn from(values: [T; 6]) -> Self {
        Self { values }
    }
}

/// Value written to the offset registers, per channel.
pub type OffsetVector = SixAxis<i16>;

/// Expected raw reading while the device rests in its calibration pose.
pub type TargetVector = SixAxis<i16>;

/// Bias left over after the offset registers are applied, in counts at the
/// calibration full-scale.
pub type OffsetCorrection = SixAxis<i16>;
