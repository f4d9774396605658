//! Compensation and assignment engine for dispatching instructors to school classes.

pub mod config;
pub mod error;
pub mod security;
pub mod telemetry;
pub mod workflows;
