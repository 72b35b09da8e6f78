//! # Engine Module
//!
//! The stateful layer of MolDrug. It validates configuration, runs the docking
//! executable, turns responses into costs and drives the evaluation of whole
//! populations on a worker pool.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - GA, local search, docking and receptor settings
//! - **Docking** ([`docking`]) - Free and constrained Vina runs with failure reports
//! - **Cost Functions** ([`cost`]) - The four closed cost functions built on desirability
//! - **Evaluation** ([`evaluation`]) - Parallel, cached evaluation of individuals
//! - **Selection** ([`selection`]) and **Variation** ([`variation`]) - Genetic operators
//! - **State Tracking** ([`state`]) - Checkpointable genetic-algorithm state
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-level error type
//!
//! ## Key Capabilities
//!
//! - **Failure isolation**: a molecule that cannot be prepared, docked or scored
//!   receives an infinite cost instead of aborting the run
//! - **Evaluation cache** so that a SMILES string is never scored twice in a run
//! - **Reproducible runs** through seeded, per-generation random number generators

pub mod config;
pub mod cost;
pub mod docking;
pub mod error;
pub mod evaluation;
pub mod progress;
pub mod selection;
pub mod state;
pub mod variation;
