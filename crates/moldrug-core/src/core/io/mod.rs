//! Provides input/output functionality for the files produced and consumed by a run.
//!
//! This module reads AutoDock Vina results, persists the genetic-algorithm state as
//! zstd-compressed TOML checkpoints, and writes population tables as CSV.

pub mod checkpoint;
pub mod table;
pub mod vina_out;
