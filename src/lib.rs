//! # bdd-sharpsat: exact model counting via Binary Decision Diagrams
//!
//! **`bdd-sharpsat`** counts the satisfying assignments (#SAT) of a CNF formula
//! by building its Binary Decision Diagram and counting paths to the true terminal.
//!
//! A run goes through the following steps:
//!
//! 1. Read the DIMACS formula ([`cnf`]) and hash it ([`hash`]).
//! 2. Check whether a prior report is still valid for this input ([`validity`], [`report`]).
//! 3. Pick a variable order: the cached one, the identity, or one computed by
//!    FORCE ([`force`]).
//! 4. Sort clauses by their normalized span under that order ([`sequence`]).
//! 5. Build the diagram with a [`backend`], which writes a cache artifact ([`artifact`]).
//! 6. Count models on the artifact ([`sat`]) and write the report.
//!
//! [`pipeline::Runner`] ties these together.
//!
//! ## Basic Usage
//!
//! ```rust
//! use num_bigint::BigUint;
//! use bdd_sharpsat::cnf::{Cnf, FileIdentity};
//! use bdd_sharpsat::manager::Manager;
//! use bdd_sharpsat::order::default_order;
//! use bdd_sharpsat::sat::CountStrategy;
//!
//! let content = "p cnf 2 1\n1 2 0\n";
//! let cnf = Cnf::parse(content, FileIdentity::in_memory("or.cnf", content)).unwrap();
//!
//! let manager = Manager::new(default_order(cnf.num_vars()));
//! let root = manager.conjoin_clauses(cnf.clauses());
//! let artifact = manager.to_artifact(root, &cnf);
//!
//! assert_eq!(artifact.sat_count(CountStrategy::Paths).unwrap(), BigUint::from(3u32));
//! ```

pub mod artifact;
pub mod backend;
pub mod cnf;
pub mod config;
pub mod error;
pub mod force;
pub mod hash;
pub mod manager;
pub mod order;
pub mod pipeline;
pub mod reference;
pub mod report;
pub mod sat;
pub mod sequence;
pub mod validity;
