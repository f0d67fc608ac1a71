//! Pure domain logic for the movement-analysis engine.
//!
//! Stages, leaves first:
//!
//! - [`sequence`] validates the raw keypoint stream.
//! - [`kinematics`] and [`metrics`] compute the five performance scores.
//! - [`notes`] and [`risk`] flag biomechanical issues and score injury risk.
//! - [`progress`] and [`plan`] fold the session into the patient's history.
//! - [`analysis`] is the record those stages populate.
//!
//! No I/O and no logging; recoverable issues are returned to the caller.

pub mod analysis;
pub mod error;
pub mod geometry;
pub mod keypoint;
pub mod kinematics;
pub mod metrics;
pub mod notes;
pub mod plan;
pub mod progress;
pub mod reference;
pub mod risk;
pub mod sequence;
pub mod types;
