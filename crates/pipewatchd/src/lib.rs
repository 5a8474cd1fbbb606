//! Pipeline health monitoring daemon
//!
//! Loads execution events, serves health and metrics endpoints and runs
//! peer anomaly detection on an interval.

pub mod api;
pub mod config;
