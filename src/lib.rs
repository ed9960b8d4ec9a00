#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod accel;
pub mod address;
pub mod axis;
pub mod calibration;
pub mod calibration_async;
pub mod calibration_blocking;
pub mod clock_source;
pub mod config;
pub mod data_ready;
pub mod error;
pub mod error_async;
pub mod estimator;
pub mod gyro;
pub mod motion;
pub mod registers;
pub mod sensor;
pub mod sensor_async;
pub mod status;
pub mod store;
pub mod temperature;

#[cfg(test)]
mod testing;
