//! # Core Module
//!
//! This module provides the stateless building blocks of MolDrug: the data model
//! for candidate molecules, the desirability arithmetic used to fold several
//! responses into a single cost, file formats, and the boundary to the external
//! chemistry toolkit.
//!
//! ## Architecture
//!
//! - **Candidate Representation** ([`models`]) - The `Individual` record evolved by the GA
//! - **Multi-objective Scoring** ([`desirability`]) - Derringer-Suich desirability functions
//!   and their weighted geometric mean
//! - **File I/O** ([`io`]) - Vina result parsing, compressed checkpoints and CSV tables
//! - **Chemistry Boundary** ([`chem`]) - Traits and the process-backed implementation for
//!   CReM enumeration, ligand preparation, descriptors and model predictions
//! - **Utilities** ([`utils`]) - Small geometric helpers such as the receptor clash filter
//!
//! ## Scientific Foundation
//!
//! - **Desirability functions** (Derringer & Suich) mapping each response to [0, 1]
//! - **Weighted geometric mean** aggregation, so that any fully undesirable response
//!   drives the overall desirability to zero
//! - **AutoDock Vina** affinities (kcal/mol) as the binding response

pub mod chem;
pub mod desirability;
pub mod io;
pub mod models;
pub mod utils;
