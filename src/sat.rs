//! Model counting over decoded cache artifacts.
//!
//! Two strategies compute the same exact count:
//!
//! - [`count_paths`] enumerates root-to-terminal paths with an explicit
//!   stack. A path that ends in the true function at depth `d` contributes
//!   `2^(n - d)`: the `d` variables tested on the path are fixed, the rest are
//!   free. Paths of a decision diagram denote disjoint cubes, so the sum is
//!   exact as long as no variable is tested twice on one path. Shared
//!   subgraphs are revisited once per incoming path.
//!
//! - [`count_shared`] evaluates every node once (post-order, memoized by node
//!   id): `count(v) = (count(low) + count(high)) / 2`, relative to `2^n`, and a
//!   complemented edge turns `c` into `2^n - c`.
//!
//! Neither uses recursion, since diagrams can be deeper than the call stack.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use num_bigint::BigUint;

use crate::artifact::{CacheArtifact, Edge, NodeId, NodeRecord, FALSE_ID, TRUE_ID};

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum CountStrategy {
    /// Enumerate paths with an explicit stack
    #[default]
    Paths,
    /// Evaluate every node once
    Shared,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CountError {
    #[error("the number of variables is unknown")]
    MissingVariableCount,
    #[error("edge points to missing node {0}")]
    DanglingEdge(NodeId),
    #[error("node {node} tests variable {variable}, outside 1..={n_vars}")]
    VariableOutOfRange { node: NodeId, variable: u32, n_vars: u32 },
    #[error("a path through node {node} reaches depth {depth}, but there are only {n_vars} variables")]
    PathTooDeep { node: NodeId, depth: u32, n_vars: u32 },
    #[error("node {0} lies on a cycle")]
    Cycle(NodeId),
}

fn pow2(exp: u32) -> BigUint {
    BigUint::from(1u8) << exp as usize
}

fn check_variable(node: NodeId, record: &NodeRecord, n_vars: u32) -> Result<(), CountError> {
    if record.variable == 0 || record.variable > n_vars {
        return Err(CountError::VariableOutOfRange {
            node,
            variable: record.variable,
            n_vars,
        });
    }
    Ok(())
}

/// Counts satisfying assignments by enumerating paths from `root`.
///
/// Every inner node must be reached at a depth below `n_vars`; deeper nodes
/// mean a variable is tested twice on a path (or the table is cyclic), and are
/// reported as [`CountError::PathTooDeep`]. This also bounds the traversal on
/// malformed input.
pub fn count_paths(root: Edge, n_vars: u32, nodes: &BTreeMap<NodeId, NodeRecord>) -> Result<BigUint, CountError> {
    let mut count = BigUint::default();
    let mut paths = 0u64;

    let mut stack: Vec<(NodeId, u32, bool)> = vec![(root.target, 0, root.complement)];

    while let Some((node, depth, complemented)) = stack.pop() {
        if node == FALSE_ID || node == TRUE_ID {
            // ~0 or 1
            if (node == FALSE_ID) == complemented {
                count += pow2(n_vars - depth);
                paths += 1;
            }
            continue;
        }

        if depth >= n_vars {
            return Err(CountError::PathTooDeep { node, depth, n_vars });
        }

        let record = nodes.get(&node).ok_or(CountError::DanglingEdge(node))?;
        check_variable(node, record, n_vars)?;
        stack.push((record.low.target, depth + 1, complemented ^ record.low.complement));
        stack.push((record.high.target, depth + 1, complemented ^ record.high.complement));
    }

    debug!("count_paths: {} satisfying paths, count = {}", paths, count);
    Ok(count)
}

/// Counts satisfying assignments evaluating each node once.
///
/// Rejects the same tables as [`count_paths`]: alongside its count, every
/// node gets the height of its subgraph (inner nodes on the longest path
/// below it, itself included), which may not exceed `n_vars`.
pub fn count_shared(root: Edge, n_vars: u32, nodes: &BTreeMap<NodeId, NodeRecord>) -> Result<BigUint, CountError> {
    let max = pow2(n_vars);

    // Count of the (uncomplemented) function rooted at each inner node, and its height.
    let mut memo: HashMap<NodeId, (BigUint, u32)> = HashMap::new();
    let mut in_progress: HashSet<NodeId> = HashSet::new();

    let value = |memo: &HashMap<NodeId, (BigUint, u32)>, edge: Edge| -> (BigUint, u32) {
        let (base, height) = match edge.target {
            FALSE_ID => (BigUint::default(), 0),
            TRUE_ID => (max.clone(), 0),
            id => memo[&id].clone(),
        };
        if edge.complement {
            (&max - base, height)
        } else {
            (base, height)
        }
    };

    let mut stack: Vec<(NodeId, bool)> = Vec::new();
    if !root.is_terminal() {
        stack.push((root.target, false));
    }

    while let Some((id, expanded)) = stack.pop() {
        let record = nodes.get(&id).ok_or(CountError::DanglingEdge(id))?;

        if expanded {
            let (low, low_height) = value(&memo, record.low);
            let (high, high_height) = value(&memo, record.high);
            let height = 1 + low_height.max(high_height);
            if height > n_vars {
                return Err(CountError::PathTooDeep {
                    node: id,
                    depth: height - 1,
                    n_vars,
                });
            }
            // Both children are multiples of 2^(n_vars - height + 1), so the sum is even.
            let sum = low + high;
            debug_assert!(!sum.bit(0));
            in_progress.remove(&id);
            memo.insert(id, (sum >> 1usize, height));
            continue;
        }

        if memo.contains_key(&id) {
            continue;
        }
        check_variable(id, record, n_vars)?;
        if !in_progress.insert(id) {
            return Err(CountError::Cycle(id));
        }

        stack.push((id, true));
        for child in [record.high, record.low] {
            if child.is_terminal() || memo.contains_key(&child.target) {
                continue;
            }
            if in_progress.contains(&child.target) {
                return Err(CountError::Cycle(child.target));
            }
            stack.push((child.target, false));
        }
    }

    let (count, _) = value(&memo, root);
    debug!("count_shared: {} nodes evaluated, count = {}", memo.len(), count);
    Ok(count)
}

/// Counts with the chosen strategy.
pub fn count_models(
    root: Edge,
    n_vars: u32,
    nodes: &BTreeMap<NodeId, NodeRecord>,
    strategy: CountStrategy,
) -> Result<BigUint, CountError> {
    match strategy {
        CountStrategy::Paths => count_paths(root, n_vars, nodes),
        CountStrategy::Shared => count_shared(root, n_vars, nodes),
    }
}

impl CacheArtifact {
    /// Number of satisfying assignments over the `n_vars` recorded in the header.
    pub fn sat_count(&self, strategy: CountStrategy) -> Result<BigUint, CountError> {
        let n_vars = self.n_vars().ok_or(CountError::MissingVariableCount)?;
        count_models(self.root(), n_vars, &self.nodes, strategy)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::artifact::CacheHeader;

    const STRATEGIES: [CountStrategy; 2] = [CountStrategy::Paths, CountStrategy::Shared];

    fn node(variable: u32, low: Edge, high: Edge) -> NodeRecord {
        NodeRecord { variable, low, high }
    }

    fn artifact(n_vars: u32, root: Edge, nodes: Vec<(NodeId, NodeRecord)>) -> CacheArtifact {
        let mut header = CacheHeader::new(nodes.len() as u64 + 1, root);
        header.n_vars = Some(n_vars);
        CacheArtifact::new(header, nodes.into_iter().collect())
    }

    fn count_all(a: &CacheArtifact) -> BigUint {
        let counts: Vec<BigUint> = STRATEGIES.iter().map(|&s| a.sat_count(s).unwrap()).collect();
        assert_eq!(counts[0], counts[1], "strategies disagree");
        counts[0].clone()
    }

    #[test]
    fn test_count_or() {
        // x1 ∨ x2: root tests x1, low tests x2
        let a = artifact(
            2,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(3), Edge::plain(TRUE_ID))),
                (3, node(2, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(3u32));
    }

    #[test]
    fn test_count_or_with_complemented_edges() {
        // Single-terminal style: false is ~1
        let a = artifact(
            2,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(3), Edge::plain(TRUE_ID))),
                (3, node(2, Edge::complemented(TRUE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(3u32));
    }

    #[test]
    fn test_count_cube() {
        // x1 ∧ x2 ∧ x3
        let a = artifact(
            3,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(FALSE_ID), Edge::plain(3))),
                (3, node(2, Edge::plain(FALSE_ID), Edge::plain(4))),
                (4, node(3, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(1u32));
    }

    #[test]
    fn test_count_complemented_root() {
        // ~(x1 ∧ x2) over 3 variables: 8 - 2
        let a = artifact(
            3,
            Edge::complemented(2),
            vec![
                (2, node(1, Edge::plain(FALSE_ID), Edge::plain(3))),
                (3, node(2, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(6u32));
    }

    #[test]
    fn test_count_xor_shared_node() {
        // x1 ⊕ x2 with a single x2 node reached through a plain and a complemented edge
        let a = artifact(
            2,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(3), Edge::complemented(3))),
                (3, node(2, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(2u32));
    }

    #[test]
    fn test_count_terminals() {
        for n in [0, 1, 5, 10] {
            let tautology = artifact(n, Edge::plain(TRUE_ID), vec![]);
            assert_eq!(count_all(&tautology), pow2(n));
            let also_tautology = artifact(n, Edge::complemented(FALSE_ID), vec![]);
            assert_eq!(count_all(&also_tautology), pow2(n));
            let contradiction = artifact(n, Edge::complemented(TRUE_ID), vec![]);
            assert_eq!(count_all(&contradiction), BigUint::default());
        }
    }

    #[test]
    fn test_count_exceeds_u64() {
        let a = artifact(200, Edge::plain(TRUE_ID), vec![]);
        assert_eq!(count_all(&a), BigUint::from(1u8) << 200usize);
    }

    #[test]
    fn test_count_skipped_levels() {
        // x1 ∧ x3 over 3 variables, x2 never tested
        let a = artifact(
            3,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(FALSE_ID), Edge::plain(3))),
                (3, node(3, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(count_all(&a), BigUint::from(2u32));
    }

    #[test]
    fn test_deep_chain_does_not_overflow_stack() {
        let n = 50_000u32;
        let nodes: BTreeMap<NodeId, NodeRecord> = (0..n)
            .map(|i| {
                let id = i as NodeId + 2;
                let high = if i + 1 == n { Edge::plain(TRUE_ID) } else { Edge::plain(id + 1) };
                (id, node(i + 1, Edge::plain(FALSE_ID), high))
            })
            .collect();
        assert_eq!(count_paths(Edge::plain(2), n, &nodes).unwrap(), BigUint::from(1u32));
        assert_eq!(count_paths(Edge::complemented(2), n, &nodes).unwrap(), pow2(n) - 1u32);

        let m = 2_000u32;
        // Keep nodes 2..=m and cut the chain there.
        let mut short: BTreeMap<NodeId, NodeRecord> = nodes.into_iter().filter(|(id, _)| *id <= m as NodeId).collect();
        short.get_mut(&(m as NodeId)).unwrap().high = Edge::plain(TRUE_ID);
        assert_eq!(count_shared(Edge::plain(2), m, &short).unwrap(), pow2(1));
        assert_eq!(count_paths(Edge::plain(2), m, &short).unwrap(), pow2(1));
    }

    #[test]
    fn test_path_too_deep() {
        // Two levels over a single variable
        let a = artifact(
            1,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(FALSE_ID), Edge::plain(3))),
                (3, node(1, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        assert_eq!(
            a.sat_count(CountStrategy::Paths),
            Err(CountError::PathTooDeep {
                node: 3,
                depth: 1,
                n_vars: 1
            })
        );
        assert_eq!(
            a.sat_count(CountStrategy::Shared),
            Err(CountError::PathTooDeep {
                node: 2,
                depth: 1,
                n_vars: 1
            })
        );
    }

    #[test]
    fn test_inner_node_without_variables() {
        let a = CacheArtifact::decode("n_vars:0\nn_nodes:2\nroot:0:2\n----\n2 1 0:0 0:1\n").unwrap();
        assert!(matches!(
            a.sat_count(CountStrategy::Paths),
            Err(CountError::PathTooDeep { node: 2, depth: 0, n_vars: 0 })
        ));
        assert_eq!(
            a.sat_count(CountStrategy::Shared),
            Err(CountError::VariableOutOfRange {
                node: 2,
                variable: 1,
                n_vars: 0
            })
        );
    }

    #[test]
    fn test_variable_out_of_range() {
        for variable in [0, 3] {
            let a = artifact(
                2,
                Edge::plain(2),
                vec![
                    (2, node(1, Edge::plain(FALSE_ID), Edge::plain(3))),
                    (3, node(variable, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
                ],
            );
            for strategy in STRATEGIES {
                assert_eq!(
                    a.sat_count(strategy),
                    Err(CountError::VariableOutOfRange { node: 3, variable, n_vars: 2 })
                );
            }
        }
    }

    #[test]
    fn test_shared_subgraph_too_deep_under_complement() {
        // x2 is tested twice below a shared node reached through both edge kinds
        let a = artifact(
            2,
            Edge::plain(2),
            vec![
                (2, node(1, Edge::plain(3), Edge::complemented(3))),
                (3, node(2, Edge::plain(FALSE_ID), Edge::plain(4))),
                (4, node(2, Edge::plain(FALSE_ID), Edge::plain(TRUE_ID))),
            ],
        );
        for strategy in STRATEGIES {
            assert!(matches!(a.sat_count(strategy), Err(CountError::PathTooDeep { n_vars: 2, .. })));
        }
    }

    #[test]
    fn test_dangling_edge() {
        let mut nodes = BTreeMap::new();
        nodes.insert(2, node(1, Edge::plain(FALSE_ID), Edge::plain(7)));
        for strategy in STRATEGIES {
            assert_eq!(
                count_models(Edge::plain(2), 2, &nodes, strategy),
                Err(CountError::DanglingEdge(7))
            );
        }
    }

    #[test]
    fn test_cyclic_table_terminates() {
        let mut nodes = BTreeMap::new();
        nodes.insert(2, node(1, Edge::plain(3), Edge::plain(TRUE_ID)));
        nodes.insert(3, node(2, Edge::plain(2), Edge::plain(TRUE_ID)));
        assert!(matches!(
            count_paths(Edge::plain(2), 4, &nodes),
            Err(CountError::PathTooDeep { .. })
        ));
        assert!(matches!(count_shared(Edge::plain(2), 4, &nodes), Err(CountError::Cycle(_))));
    }

    #[test]
    fn test_missing_variable_count() {
        let a = CacheArtifact::new(CacheHeader::new(1, Edge::plain(TRUE_ID)), BTreeMap::new());
        assert_eq!(a.sat_count(CountStrategy::Paths), Err(CountError::MissingVariableCount));
    }
}
