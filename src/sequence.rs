//! Clause sequencing for incremental conjunction.
//!
//! Backends conjoin clauses one by one. Presenting short-range clauses first
//! tends to keep the intermediate diagram small, so clauses are sorted by
//! their span normalized by length.

use crate::cnf::Clause;
use crate::force::normalized_span;
use crate::order::VariableOrder;

/// Sorts clauses ascending by `span / len` under `order`.
///
/// The sort is stable and only permutes the clauses.
pub fn sort_clauses_by_span(clauses: &[Clause], order: &VariableOrder) -> Vec<Clause> {
    let mut keyed: Vec<(f64, &Clause)> = clauses.iter().map(|c| (normalized_span(c, order), c)).collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().map(|(_, c)| c.clone()).collect()
}

/// Same as [`sort_clauses_by_span`], returning the permutation of clause indices.
pub fn clause_permutation_by_span(clauses: &[Clause], order: &VariableOrder) -> Vec<usize> {
    let mut keyed: Vec<(f64, usize)> = clauses
        .iter()
        .enumerate()
        .map(|(i, c)| (normalized_span(c, order), i))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().map(|(_, i)| i).collect()
}
