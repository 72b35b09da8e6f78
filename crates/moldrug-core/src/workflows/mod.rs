//! # Workflows Module
//!
//! Complete optimization procedures built from the engine. Each workflow takes
//! validated configuration, a chemistry toolkit and a cost function, reports its
//! progress through a [`ProgressReporter`](crate::engine::progress::ProgressReporter)
//! and writes its results to the configured output directory.
//!
//! - **Genetic Algorithm** ([`ga`]) - Roulette selection, CReM mutation and elitist
//!   replacement over a number of generations, with checkpoints and resume.
//! - **Local Exploration** ([`local`]) - A single round of growing the seed molecule
//!   and scoring every grown candidate.

pub mod ga;
pub mod local;
