//! Blocking Calibration Implementation
//!
//! Runs the [`OffsetSearch`] state machine against a blocking driver: every
//! requested measurement writes the candidate offsets, then averages one
//! sample per data-ready notification.

use crate::{
    axis::{OffsetCorrection, OffsetVector, SixAxis, TargetVector},
    calibration::{
        CalibrationOutcome, CalibrationParameters, MeanAccumulator, OffsetSearch, SearchStep,
    },
    data_ready::DataReady,
    error::Error,
    sensor::Mpu6050,
};
use embedded_hal::i2c::I2c;

/// Average `samples` readings and subtract `target`
pub fn average_residuals<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReady,
    samples: u32,
    target: &TargetVector,
) -> Result<SixAxis<i16>, Error<I>>
where
    I: I2c,
{
    let mut accumulator = MeanAccumulator::new();
    for _ in 0..samples {
        ready.wait_for_sample();
        accumulator.add(&mpu.motion6()?);
    }
    Ok(accumulator.residuals(target))
}

/// Search the offset registers that null the residuals
/// (the device must be in its calibration configuration)
pub fn calibrate<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReady,
    parameters: &CalibrationParameters,
    initial: OffsetVector,
) -> Result<CalibrationOutcome, Error<I>>
where
    I: I2c,
{
    let target = parameters.target();
    let mut search = OffsetSearch::new(initial, parameters);
    loop {
        match search.next_step() {
            SearchStep::Measure(measurement) => {
                mpu.set_offsets(&measurement.offsets)?;
                let residuals = average_residuals(mpu, ready, measurement.samples, &target)?;
                search.record(residuals);
            }
            SearchStep::Converged(outcome) => {
                info!(
                    "calibration converged after {} iterations: {:?}",
                    outcome.iterations,
                    outcome.offsets
                );
                return Ok(outcome);
            }
            SearchStep::Exhausted => return Err(Error::CalibrationExhausted),
        }
    }
}

/// Residual bias with the offsets currently in the device
pub fn measure_correction<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReady,
    parameters: &CalibrationParameters,
) -> Result<OffsetCorrection, Error<I>>
where
    I: I2c,
{
    average_residuals(mpu, ready, parameters.correction_samples, &parameters.target())
}
