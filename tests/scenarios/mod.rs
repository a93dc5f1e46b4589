//! Scenario-based tests for nbflow

mod data_flow;
mod failures;
mod magics;
mod metrics;
mod notebook_files;
mod parameters;
mod sweep;
