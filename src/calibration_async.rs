use crate::{
    axis::{OffsetCorrection, OffsetVector, SixAxis, TargetVector},
    calibration::{
        CalibrationOutcome, CalibrationParameters, MeanAccumulator, OffsetSearch, SearchStep,
    },
    data_ready::DataReadyAsync,
    error_async::Error,
    sensor_async::Mpu6050,
};
use embedded_hal_async::i2c::I2c;

/// Average `samples` readings and subtract `target`
pub async fn average_residuals<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReadyAsync,
    samples: u32,
    target: &TargetVector,
) -> Result<SixAxis<i16>, Error<I>>
where
    I: I2c,
{
    let mut accumulator = MeanAccumulator::new();
    for _ in 0..samples {
        ready.wait_for_sample().await;
        accumulator.add(&mpu.motion6().await?);
    }
    Ok(accumulator.residuals(target))
}

/// Search the offset registers that null the residuals
/// (the device must be in its calibration configuration)
pub async fn calibrate<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReadyAsync,
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
                mpu.set_offsets(&measurement.offsets).await?;
                let residuals =
                    average_residuals(mpu, ready, measurement.samples, &target).await?;
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
pub async fn measure_correction<I>(
    mpu: &mut Mpu6050<I>,
    ready: &mut impl DataReadyAsync,
    parameters: &CalibrationParameters,
) -> Result<OffsetCorrection, Error<I>>
where
    I: I2c,
{
    average_residuals(mpu, ready, parameters.correction_samples, &parameters.target()).await
}
