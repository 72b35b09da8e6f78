//! # Core Models Module
//!
//! Data structures describing the candidates handled by the optimizer.
//!
//! ## Key Components
//!
//! - [`individual`] - A candidate molecule together with its computed properties and cost
//!
//! ```ignore
//! use moldrug::core::models::individual::Individual;
//!
//! let seed = Individual::new("COC(=O)C=1C=CC(=CC1)S(=O)(=O)N", 0);
//! assert!(seed.cost.is_infinite());
//! ```

pub mod individual;
