//! # MolDrug Core Library
//!
//! Genetic-algorithm driven optimization of small molecules toward multi-objective
//! property targets: docking affinity combined with drug-likeness and predicted
//! ADMET properties through Derringer-Suich desirability functions.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Individual`), the
//!   desirability arithmetic, Vina output parsing, checkpoint and table I/O, and
//!   the seam to the external chemistry toolkit (CReM, conformers, descriptors,
//!   pretrained property models).
//!
//! - **[`engine`]: The Logic Core.** Validated configuration, docking through the
//!   Vina executable, the cost functions, selection operators and the parallel
//!   evaluation of populations.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built from the engine:
//!   the genetic algorithm (`ga`) and the one-shot local exploration (`local`).
//!
//! Docking physics, chemical enumeration and cheminformatics perception are never
//! performed in-process; they are delegated to the Vina binary and to a toolkit
//! helper program reached through [`core::chem::ChemToolkit`].

pub mod core;
pub mod engine;
pub mod workflows;
