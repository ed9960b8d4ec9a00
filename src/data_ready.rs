//! Data-ready notification.
//!
//! The device raises its interrupt line each time a new sample is available.
//! Whatever handles that edge (an interrupt handler, an EXTI task) only has to
//! record the time of the sample, in milliseconds, into a single-slot
//! [`Signal`]. The driver consumes one notification per sample it reads.
//!
//! ```ignore
//! static DATA_READY: Signal<CriticalSectionRawMutex, u64> = Signal::new();
//!
//! // interrupt side
//! DATA_READY.signal(Instant::now().as_millis());
//!
//! // driver side
//! mpu.initialize_phase_two(&mut delay, &mut &DATA_READY, &mut store).await?;
//! ```
//!
//! A second edge arriving before the first was consumed overwrites it: only
//! the newest sample matters.

use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};

/// Blocking wait for the next sample.
pub trait DataReady {
    /// Wait until a new sample is available and return its timestamp (ms).
    fn wait_for_sample(&mut self) -> u64;
}

/// Async wait for the next sample.
#[allow(async_fn_in_trait)]
pub trait DataReadyAsync {
    /// Wait until a new sample is available and return its timestamp (ms).
    async fn wait_for_sample(&mut self) -> u64;
}

impl<M: RawMutex> DataReady for &Signal<M, u64> {
    fn wait_for_sample(&mut self) -> u64 {
        embassy_futures::block_on(self.wait())
    }
}

impl<M: RawMutex> DataReadyAsync for &Signal<M, u64> {
    async fn wait_for_sample(&mut self) -> u64 {
        self.wait().await
    }
}
