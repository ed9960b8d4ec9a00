//! Offset calibration.
//!
//! The offset registers are found with a two-stage bisection over all six
//! channels at once:
//!
//! 1. **Bracket location**: starting from the initial offsets, step a `low`
//!    candidate down and a `high` candidate up (by `bracket_step` counts) until
//!    every channel reads below target at `low` and above target at `high`.
//! 2. **Range reduction**: measure at the midpoint of each bracket and replace
//!    whichever end has the same sign, until no bracket is wider than
//!    `min_width`. Averages use `coarse_samples` until every bracket is at most
//!    `fine_width` wide, then `fine_samples` for the rest of the search.
//!
//! Both stages share one iteration budget. The search itself does no I/O: it
//! is a state machine ([`OffsetSearch`]) that asks for measurements and is fed
//! the resulting residuals, so the blocking and async drivers run exactly the
//! same algorithm.

use crate::{
    accel::AccelFullScale,
    axis::{Axis, OffsetCorrection, OffsetVector, SixAxis, TargetVector},
    config::{DigitalLowPassFilter, CALIBRATION_SAMPLE_RATE_DIVIDER},
    gyro::GyroFullScale,
};

/// Samples averaged per measurement while brackets are wide
pub const COARSE_SAMPLES: u32 = 1000;
/// Samples averaged per measurement once brackets are narrow
pub const FINE_SAMPLES: u32 = 10000;
/// Samples averaged when measuring the residual correction
pub const CORRECTION_SAMPLES: u32 = 1000;
/// Iteration budget shared by both stages
pub const MAX_ITERATIONS: u16 = 100;
/// Bracket width (counts) at or below which fine averaging starts
pub const FINE_WIDTH: u16 = 5;
/// Bracket width (counts) at or below which the search stops
pub const MIN_WIDTH: u16 = 1;
/// Offset change (counts) per bracket location step
pub const BRACKET_STEP: i16 = 1000;

/// Symbolic representation of a gravity vector aligned to one of the axes
/// (the accelerometer target is 1g on that axis, zero on the others)
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceGravity {
    Zero,
    XN,
    XP,
    YN,
    YP,
    ZN,
    ZP,
}

impl ReferenceGravity {
    /// Expected raw readings while the device rests in this pose at `scale`
    /// (the gyroscope targets are always zero).
    pub fn target(self, scale: AccelFullScale) -> TargetVector {
        let g = scale.one_g();
        let mut target = TargetVector::ZERO;
        match self {
            Self::Zero => {}
            Self::XN => target[Axis::AccelX] = -g,
            Self::XP => target[Axis::AccelX] = g,
            Self::YN => target[Axis::AccelY] = -g,
            Self::YP => target[Axis::AccelY] = g,
            Self::ZN => target[Axis::AccelZ] = -g,
            Self::ZP => target[Axis::AccelZ] = g,
        }
        target
    }
}

/// Calibration parameters.
/// (all the values that influence calibration and do not change between search iterations)
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalibrationParameters {
    /// Accelerometer range while calibrating
    pub accel_scale: AccelFullScale,
    /// Gyroscope range while calibrating
    pub gyro_scale: GyroFullScale,
    /// Low pass filter while calibrating
    pub filter: DigitalLowPassFilter,
    /// Sample rate divider while calibrating
    pub sample_rate_divider: u8,
    /// Pose of the device during calibration
    pub gravity: ReferenceGravity,
    pub coarse_samples: u32,
    pub fine_samples: u32,
    pub correction_samples: u32,
    pub bracket_step: i16,
    pub fine_width: u16,
    pub min_width: u16,
    pub max_iterations: u16,
}

impl Default for CalibrationParameters {
    fn default() -> Self {
        Self::new(ReferenceGravity::ZP)
    }
}

impl CalibrationParameters {
    /// Calibration parameters for the given pose
    /// (sensible defaults are used for all other parameters)
    pub fn new(gravity: ReferenceGravity) -> Self {
        Self {
            accel_scale: AccelFullScale::G2,
            gyro_scale: GyroFullScale::Deg250,
            filter: DigitalLowPassFilter::Filter0,
            sample_rate_divider: CALIBRATION_SAMPLE_RATE_DIVIDER,
            gravity,
            coarse_samples: COARSE_SAMPLES,
            fine_samples: FINE_SAMPLES,
            correction_samples: CORRECTION_SAMPLES,
            bracket_step: BRACKET_STEP,
            fine_width: FINE_WIDTH,
            min_width: MIN_WIDTH,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Expected raw readings during calibration
    pub fn target(&self) -> TargetVector {
        self.gravity.target(self.accel_scale)
    }

    /// Change the number of samples per measurement
    /// (consumes and returns `Self` to be callable in a "builder-like" pattern)
    pub fn with_samples(self, coarse_samples: u32, fine_samples: u32) -> Self {
        Self {
            coarse_samples,
            fine_samples,
            ..self
        }
    }

    /// Change the number of samples used for the residual correction
    pub fn with_correction_samples(self, correction_samples: u32) -> Self {
        Self {
            correction_samples,
            ..self
        }
    }

    /// Change the shared iteration budget
    pub fn with_max_iterations(self, max_iterations: u16) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    /// Change the bracket location step
    pub fn with_bracket_step(self, bracket_step: i16) -> Self {
        Self {
            bracket_step,
            ..self
        }
    }
}

/// Holds running sums during sample mean computation
/// (wide enough that any realistic sample count cannot overflow)
#[derive(Clone, Debug, Default)]
pub struct MeanAccumulator {
    sums: [i64; 6],
    count: u32,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sample: &SixAxis<i16>) {
        for (sum, value) in self.sums.iter_mut().zip(sample.values()) {
            *sum += value as i64;
        }
        self.count += 1;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Mean of the samples minus `target`, per channel
    /// (the mean is truncated before the target is subtracted)
    pub fn residuals(&self, target: &TargetVector) -> SixAxis<i16> {
        let count = self.count.max(1) as i64;
        let sums = SixAxis::new(self.sums);
        sums.zip_with(*target, |sum, target| {
            saturate(sum / count - target as i64)
        })
    }
}

fn saturate(value: i64) -> i16 {
    value.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

fn midpoint(low: i16, high: i16) -> i16 {
    ((low as i32 + high as i32) / 2) as i16
}

/// Where the search currently is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SearchPhase {
    /// Bracket location, measuring at the low candidates
    BracketLow,
    /// Bracket location, measuring at the high candidates
    BracketHigh,
    /// Range reduction at the bracket midpoints
    Reduce,
    /// Finished, see [`OffsetSearch::next_step`]
    Done,
}

/// A measurement requested by the search: write `offsets`, then average `samples`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Measurement {
    pub offsets: OffsetVector,
    pub samples: u32,
}

/// Result of a converged search.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct CalibrationOutcome {
    /// Offsets to commit to the device
    pub offsets: OffsetVector,
    /// Residual measured at those offsets
    pub correction: OffsetCorrection,
    /// Iterations used across both stages
    pub iterations: u16,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SearchStep {
    Measure(Measurement),
    Converged(CalibrationOutcome),
    /// The iteration budget ran out before the brackets closed
    Exhausted,
}

/// Two-stage bisection over the six offset registers.
///
/// Drive it with:
///
/// ```ignore
/// let mut search = OffsetSearch::new(initial, &parameters);
/// loop {
///     match search.next_step() {
///         SearchStep::Measure(m) => {
///             write_offsets(&m.offsets)?;
///             search.record(average_residuals(m.samples)?);
///         }
///         SearchStep::Converged(outcome) => break Ok(outcome),
///         SearchStep::Exhausted => break Err(..),
///     }
/// }
/// ```
#[derive(Clone, Debug)]
pub struct OffsetSearch {
    low: OffsetVector,
    high: OffsetVector,
    low_value: SixAxis<i16>,
    high_value: SixAxis<i16>,
    working: OffsetVector,
    phase: SearchPhase,
    straddled: bool,
    fine: bool,
    exhausted: bool,
    iterations: u16,
    max_width: i32,
    coarse_samples: u32,
    fine_samples: u32,
    bracket_step: i16,
    fine_width: i32,
    min_width: i32,
    max_iterations: u16,
}

impl OffsetSearch {
    pub fn new(initial: OffsetVector, parameters: &CalibrationParameters) -> Self {
        Self {
            low: initial,
            high: initial,
            low_value: SixAxis::ZERO,
            high_value: SixAxis::ZERO,
            working: initial,
            phase: SearchPhase::BracketLow,
            straddled: true,
            fine: false,
            exhausted: false,
            iterations: 0,
            max_width: 0,
            coarse_samples: parameters.coarse_samples,
            fine_samples: parameters.fine_samples,
            bracket_step: parameters.bracket_step,
            fine_width: parameters.fine_width as i32,
            min_width: parameters.min_width as i32,
            max_iterations: parameters.max_iterations,
        }
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Iterations completed so far (a bracket location iteration covers both candidates)
    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    /// Current `(low, high)` offsets
    pub fn bracket(&self) -> (OffsetVector, OffsetVector) {
        (self.low, self.high)
    }

    /// Residuals last measured at the `(low, high)` offsets
    pub fn bracket_values(&self) -> (SixAxis<i16>, SixAxis<i16>) {
        (self.low_value, self.high_value)
    }

    /// Widest bracket after the last range reduction iteration
    pub fn max_width(&self) -> i32 {
        self.max_width
    }

    /// What the driver has to do next.
    pub fn next_step(&self) -> SearchStep {
        match self.phase {
            SearchPhase::BracketLow => SearchStep::Measure(Measurement {
                offsets: self.low,
                samples: self.coarse_samples,
            }),
            SearchPhase::BracketHigh => SearchStep::Measure(Measurement {
                offsets: self.high,
                samples: self.coarse_samples,
            }),
            SearchPhase::Reduce => SearchStep::Measure(Measurement {
                offsets: self.working,
                samples: if self.fine {
                    self.fine_samples
                } else {
                    self.coarse_samples
                },
            }),
            SearchPhase::Done if self.exhausted => SearchStep::Exhausted,
            SearchPhase::Done => SearchStep::Converged(self.outcome()),
        }
    }

    /// Feed the residuals measured for the last [`SearchStep::Measure`].
    pub fn record(&mut self, residuals: SixAxis<i16>) {
        match self.phase {
            SearchPhase::BracketLow => {
                self.straddled = true;
                for axis in Axis::ALL {
                    self.low_value[axis] = residuals[axis];
                    if residuals[axis] >= 0 {
                        self.straddled = false;
                        self.low[axis] = self.low[axis].saturating_sub(self.bracket_step);
                    }
                }
                self.phase = SearchPhase::BracketHigh;
            }
            SearchPhase::BracketHigh => {
                for axis in Axis::ALL {
                    self.high_value[axis] = residuals[axis];
                    if residuals[axis] <= 0 {
                        self.straddled = false;
                        self.high[axis] = self.high[axis].saturating_add(self.bracket_step);
                    }
                }
                self.iterations += 1;
                debug!(
                    "bracket location iteration {}: low {:?} high {:?}",
                    self.iterations,
                    self.low,
                    self.high
                );

                if self.iterations > self.max_iterations {
                    self.finish(true);
                } else if self.straddled {
                    self.working = self.low.zip_with(self.high, midpoint);
                    self.phase = SearchPhase::Reduce;
                } else {
                    self.phase = SearchPhase::BracketLow;
                }
            }
            SearchPhase::Reduce => {
                self.max_width = 0;
                for axis in Axis::ALL {
                    if residuals[axis] <= 0 {
                        self.low[axis] = self.working[axis];
                        self.low_value[axis] = residuals[axis];
                    } else {
                        self.high[axis] = self.working[axis];
                        self.high_value[axis] = residuals[axis];
                    }
                    let width = self.high[axis] as i32 - self.low[axis] as i32;
                    self.max_width = self.max_width.max(width);
                    self.working[axis] = midpoint(self.low[axis], self.high[axis]);
                }
                self.iterations += 1;
                debug!(
                    "range reduction iteration {}: max width {}",
                    self.iterations,
                    self.max_width
                );

                if self.max_width <= self.fine_width {
                    self.fine = true;
                }
                if self.iterations > self.max_iterations {
                    self.finish(true);
                } else if self.max_width <= self.min_width {
                    self.finish(false);
                }
            }
            SearchPhase::Done => {}
        }
    }

    fn finish(&mut self, exhausted: bool) {
        self.exhausted = exhausted;
        self.phase = SearchPhase::Done;
    }

    /// Per channel, the end of the bracket with the smaller residual.
    fn outcome(&self) -> CalibrationOutcome {
        let mut offsets = OffsetVector::ZERO;
        let mut correction = OffsetCorrection::ZERO;
        for axis in Axis::ALL {
            if -(self.low_value[axis] as i32) <= self.high_value[axis] as i32 {
                offsets[axis] = self.low[axis];
                correction[axis] = self.low_value[axis];
            } else {
                offsets[axis] = self.high[axis];
                correction[axis] = self.high_value[axis];
            }
        }
        CalibrationOutcome {
            offsets,
            correction,
            iterations: self.iterations,
        }
    }
}
