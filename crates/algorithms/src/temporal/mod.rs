//! Multi-scene composites
//!
//! - **composite**: resample scenes onto a common grid, stack them along a
//!   time axis, calibrate raw counts and reduce the whole cube

pub mod composite;

pub use composite::{resample_nearest, Calibration, CompositeCube, TargetGrid};
