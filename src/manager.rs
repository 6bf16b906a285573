//! In-process ROBDD manager.
//!
//! Nodes are hash-consed in a unique table and referenced by signed [`Ref`]
//! handles, where the sign is the complement bit. There is a single terminal
//! node `@1` (the constant one) and `~@1` is the constant zero. High edges are
//! never complemented, which keeps the representation canonical.
//!
//! Variables are ordered by their position in the [`VariableOrder`] the manager
//! was created with: lower positions are closer to the root.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;

use log::debug;

use crate::artifact::{CacheArtifact, CacheHeader, Edge, NodeId, NodeRecord, TRUE_ID};
use crate::cnf::{Clause, Cnf};
use crate::order::VariableOrder;
use crate::reference::Ref;

/// Number of computed-table entries after which the table is flushed.
const CACHE_LIMIT: usize = 1 << 22;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

pub struct Manager {
    order: VariableOrder,
    /// Position of each variable, indexed by variable id.
    levels: Vec<u32>,
    nodes: RefCell<Vec<Node>>,
    unique: RefCell<HashMap<Node, u32>>,
    cache: RefCell<HashMap<(Ref, Ref, Ref), Ref>>,
    pub zero: Ref,
    pub one: Ref,
}

impl Manager {
    pub fn new(order: VariableOrder) -> Self {
        let mut levels = vec![u32::MAX; order.num_vars() as usize + 1];
        for (position, &var) in order.vars().iter().enumerate() {
            levels[var as usize] = position as u32;
        }

        let terminal = Node {
            variable: 0,
            low: Ref::positive(1),
            high: Ref::positive(1),
        };
        // Index 0 is unused so that every handle has a non-zero magnitude.
        let nodes = vec![terminal, terminal];

        let one = Ref::positive(1);
        Self {
            order,
            levels,
            nodes: RefCell::new(nodes),
            unique: RefCell::new(HashMap::new()),
            cache: RefCell::new(HashMap::new()),
            zero: -one,
            one,
        }
    }

    pub fn order(&self) -> &VariableOrder {
        &self.order
    }

    /// Number of allocated inner nodes, dead ones included.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len() - 2
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        node.index() == 1
    }

    fn node(&self, node: Ref) -> Node {
        self.nodes.borrow()[node.index()]
    }

    pub fn variable(&self, node: Ref) -> u32 {
        self.node(node).variable
    }

    /// Position of the top variable of `node`, `u32::MAX` for the terminal.
    fn level(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            u32::MAX
        } else {
            self.levels[self.variable(node) as usize]
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Ref {
        assert_ne!(v, 0, "Variable index should not be zero");

        if high.is_negated() {
            return -self.mk_node(v, -low, -high);
        }
        if low == high {
            return low;
        }

        let node = Node { variable: v, low, high };
        if let Some(&index) = self.unique.borrow().get(&node) {
            return Ref::positive(index);
        }

        let mut nodes = self.nodes.borrow_mut();
        let index = nodes.len() as u32;
        nodes.push(node);
        self.unique.borrow_mut().insert(node, index);
        Ref::positive(index)
    }

    pub fn mk_var(&self, v: u32) -> Ref {
        self.mk_node(v, self.zero, self.one)
    }

    pub fn mk_literal(&self, lit: i32) -> Ref {
        let node = self.mk_var(lit.unsigned_abs());
        if lit < 0 {
            -node
        } else {
            node
        }
    }

    /// Disjunction of `literals`, built bottom-up along the order.
    ///
    /// Repeated literals are merged, and a clause holding both polarities of a
    /// variable is the constant one.
    pub fn clause(&self, literals: &[i32]) -> Ref {
        let mut literals = literals.to_vec();
        literals.sort_by_key(|&lit| (std::cmp::Reverse(self.levels[lit.unsigned_abs() as usize]), lit));
        literals.dedup();
        if literals.windows(2).any(|w| w[0] == -w[1]) {
            return self.one;
        }

        let mut current = self.zero;
        for lit in literals {
            let v = lit.unsigned_abs();
            current = if lit < 0 {
                self.mk_node(v, self.one, current)
            } else {
                self.mk_node(v, current, self.one)
            };
        }
        current
    }

    fn cofactors(&self, node: Ref, level: u32) -> (Ref, Ref) {
        if self.level(node) != level {
            return (node, node);
        }
        let Node { low, high, .. } = self.node(node);
        if node.is_negated() {
            (-low, -high)
        } else {
            (low, high)
        }
    }

    /// ```text
    /// ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Ref {
        if self.is_one(f) {
            return g;
        }
        if self.is_zero(f) {
            return h;
        }
        if g == h {
            return g;
        }
        if self.is_one(g) && self.is_zero(h) {
            return f;
        }
        if self.is_zero(g) && self.is_one(h) {
            return -f;
        }

        // Standard triples
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        // ite(~F,G,H) => ite(F,H,G)
        let (f, g, h) = if f.is_negated() { (-f, h, g) } else { (f, g, h) };
        // ite(F,~G,H) => ~ite(F,G,~H)
        let (g, h, n) = if g.is_negated() { (-g, -h, true) } else { (g, h, false) };

        let key = (f, g, h);
        if let Some(&res) = self.cache.borrow().get(&key) {
            return if n { -res } else { res };
        }

        let m = self.level(f).min(self.level(g)).min(self.level(h));
        let (f0, f1) = self.cofactors(f, m);
        let (g0, g1) = self.cofactors(g, m);
        let (h0, h1) = self.cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0);
        let t = self.apply_ite(f1, g1, h1);
        let res = self.mk_node(self.order.var_at(m as usize), e, t);

        let mut cache = self.cache.borrow_mut();
        if cache.len() >= CACHE_LIMIT {
            debug!("Flushing computed table ({} entries)", cache.len());
            cache.clear();
        }
        cache.insert(key, res);

        if n {
            -res
        } else {
            res
        }
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Ref {
        self.apply_ite(u, self.one, v)
    }

    /// Conjoins `clauses` in the given sequence.
    pub fn conjoin_clauses(&self, clauses: &[Clause]) -> Ref {
        let mut res = self.one;
        for (i, clause) in clauses.iter().enumerate() {
            let c = self.clause(clause);
            res = self.apply_and(res, c);
            debug!(
                "Conjoined clause {}/{}, {} nodes allocated",
                i + 1,
                clauses.len(),
                self.num_nodes()
            );
            if self.is_zero(res) {
                debug!("Formula is unsatisfiable after {} clauses", i + 1);
                break;
            }
        }
        res
    }

    /// Number of nodes reachable from `f`, the terminal included.
    pub fn size(&self, f: Ref) -> u64 {
        let mut visited = std::collections::HashSet::new();
        visited.insert(1);
        let mut queue = VecDeque::from([f.index()]);
        while let Some(i) = queue.pop_front() {
            if visited.insert(i) {
                let node = self.nodes.borrow()[i];
                queue.push_back(node.low.index());
                queue.push_back(node.high.index());
            }
        }
        visited.len() as u64
    }

    /// Exports the diagram rooted at `root` as a cache artifact for `cnf`.
    ///
    /// The terminal becomes node 1 and reachable inner nodes are renumbered
    /// from 2 in breadth-first order.
    pub fn to_artifact(&self, root: Ref, cnf: &Cnf) -> CacheArtifact {
        let mut ids: HashMap<usize, NodeId> = HashMap::new();
        let mut queue = VecDeque::new();
        let mut next_id: NodeId = TRUE_ID + 1;

        let mut edge = |r: Ref, queue: &mut VecDeque<usize>| -> Edge {
            if self.is_terminal(r) {
                return Edge::new(r.is_negated(), TRUE_ID);
            }
            let id = *ids.entry(r.index()).or_insert_with(|| {
                queue.push_back(r.index());
                let id = next_id;
                next_id += 1;
                id
            });
            Edge::new(r.is_negated(), id)
        };

        let root_edge = edge(root, &mut queue);
        let mut records = Vec::new();
        while let Some(i) = queue.pop_front() {
            let node = self.nodes.borrow()[i];
            let low = edge(node.low, &mut queue);
            let high = edge(node.high, &mut queue);
            records.push(NodeRecord {
                variable: node.variable,
                low,
                high,
            });
        }

        let nodes = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| (TRUE_ID + 1 + i as NodeId, record))
            .collect();

        let mut header = CacheHeader::new(next_id - 1, root_edge);
        header.input_file = Some(cnf.file().path.display().to_string());
        header.input_hash = Some(cnf.file().hash.to_string());
        header.order = Some(self.order.vars().to_vec());
        header.n_vars = Some(cnf.num_vars());
        CacheArtifact::new(header, nodes)
    }
}

impl Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("num_vars", &self.order.num_vars())
            .field("nodes", &self.num_nodes())
            .field("cache", &self.cache.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use test_log::test;

    use super::*;
    use crate::cnf::FileIdentity;
    use crate::order::default_order;
    use crate::sat::CountStrategy;

    fn cnf(num_vars: u32, clauses: Vec<Clause>) -> Cnf {
        Cnf::new(FileIdentity::in_memory("test.cnf", ""), num_vars, clauses).unwrap()
    }

    fn count(cnf: &Cnf, order: VariableOrder, strategy: CountStrategy) -> BigUint {
        let manager = Manager::new(order);
        let root = manager.conjoin_clauses(cnf.clauses());
        manager.to_artifact(root, cnf).sat_count(strategy).unwrap()
    }

    fn brute_force(cnf: &Cnf) -> BigUint {
        let n = cnf.num_vars();
        let models = (0u64..1 << n)
            .filter(|bits| {
                cnf.clauses().iter().all(|clause| {
                    clause.iter().any(|&lit| {
                        let value = bits >> (lit.unsigned_abs() - 1) & 1 == 1;
                        value == (lit > 0)
                    })
                })
            })
            .count();
        BigUint::from(models)
    }

    fn random_cnf(rng: &mut impl Rng, num_vars: u32, num_clauses: usize) -> Cnf {
        let clauses = (0..num_clauses)
            .map(|_| {
                (0..3)
                    .map(|_| {
                        let v = rng.gen_range(1..=num_vars) as i32;
                        if rng.gen_bool(0.5) {
                            v
                        } else {
                            -v
                        }
                    })
                    .collect()
            })
            .collect();
        cnf(num_vars, clauses)
    }

    #[test]
    fn test_terminal() {
        let manager = Manager::new(default_order(2));
        assert!(manager.is_one(manager.one));
        assert!(manager.is_zero(manager.zero));
        assert_eq!(manager.apply_not(manager.one), manager.zero);
        assert_eq!(manager.num_nodes(), 0);
    }

    #[test]
    fn test_var() {
        let manager = Manager::new(default_order(2));
        let x = manager.mk_var(1);
        assert_eq!(manager.variable(x), 1);
        assert_eq!(manager.mk_var(1), x);
        assert_eq!(manager.mk_literal(-1), -x);
        assert_eq!(manager.num_nodes(), 1);
    }

    #[test]
    fn test_de_morgan() {
        let manager = Manager::new(default_order(3));
        let x = manager.mk_var(1);
        let y = manager.mk_var(3);
        let and = manager.apply_and(x, y);
        let or = manager.apply_or(-x, -y);
        assert_eq!(and, -or);
    }

    #[test]
    fn test_clause_matches_apply_or() {
        let manager = Manager::new(VariableOrder::new(vec![3, 1, 2]).unwrap());
        let c = manager.clause(&[1, -2, 3]);
        let expected = manager.apply_or(manager.apply_or(manager.mk_literal(1), manager.mk_literal(-2)), manager.mk_literal(3));
        assert_eq!(c, expected);
        assert_eq!(manager.variable(c), 3);
    }

    #[test]
    fn test_clause_edge_cases() {
        let manager = Manager::new(default_order(2));
        assert!(manager.is_zero(manager.clause(&[])));
        assert!(manager.is_one(manager.clause(&[1, -1])));
        assert!(manager.is_one(manager.clause(&[2, 1, -2])));
        assert_eq!(manager.clause(&[1, 1]), manager.mk_var(1));
    }

    #[test]
    fn test_size() {
        let manager = Manager::new(default_order(3));
        assert_eq!(manager.size(manager.one), 1);
        let f = manager.clause(&[1, 2, 3]);
        assert_eq!(manager.size(f), 4);
        assert_eq!(manager.size(-f), 4);
    }

    #[test]
    fn test_or_count() {
        let f = cnf(2, vec![vec![1, 2]]);
        assert_eq!(count(&f, default_order(2), CountStrategy::Paths), BigUint::from(3u32));
    }

    #[test]
    fn test_cube_count() {
        let f = cnf(3, vec![vec![1], vec![-2], vec![3]]);
        assert_eq!(count(&f, default_order(3), CountStrategy::Paths), BigUint::from(1u32));
    }

    #[test]
    fn test_no_clauses_count() {
        let f = cnf(5, vec![]);
        assert_eq!(count(&f, default_order(5), CountStrategy::Paths), BigUint::from(32u32));
    }

    #[test]
    fn test_unsat_count() {
        let f = cnf(2, vec![vec![1], vec![-1]]);
        let manager = Manager::new(default_order(2));
        let root = manager.conjoin_clauses(f.clauses());
        assert!(manager.is_zero(root));

        let artifact = manager.to_artifact(root, &f);
        assert_eq!(artifact.header.n_nodes, 1);
        assert!(artifact.nodes.is_empty());
        assert_eq!(artifact.sat_count(CountStrategy::Paths).unwrap(), BigUint::from(0u32));
    }

    #[test]
    fn test_counts_match_brute_force() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..20 {
            let f = random_cnf(&mut rng, 10, 30);
            let expected = brute_force(&f);
            assert_eq!(count(&f, default_order(10), CountStrategy::Paths), expected);
            assert_eq!(count(&f, default_order(10), CountStrategy::Shared), expected);
        }
    }

    #[test]
    fn test_count_is_order_invariant() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..10 {
            let f = random_cnf(&mut rng, 12, 40);
            let expected = count(&f, default_order(12), CountStrategy::Shared);

            let mut vars: Vec<u32> = (1..=12).collect();
            vars.shuffle(&mut rng);
            let shuffled = VariableOrder::new(vars).unwrap();
            assert_eq!(count(&f, shuffled.clone(), CountStrategy::Shared), expected);
            assert_eq!(count(&f, shuffled, CountStrategy::Paths), expected);
        }
    }

    #[test]
    fn test_artifact_export() {
        let f = cnf(3, vec![vec![1, 2], vec![-2, 3]]);
        let order = VariableOrder::new(vec![2, 3, 1]).unwrap();
        let manager = Manager::new(order.clone());
        let root = manager.conjoin_clauses(f.clauses());

        let artifact = manager.to_artifact(root, &f);
        artifact.validate().unwrap();

        assert_eq!(artifact.header.n_nodes, manager.size(root));
        assert_eq!(artifact.header.n_nodes, artifact.nodes.len() as u64 + 1);
        let ids: Vec<NodeId> = artifact.nodes.keys().copied().collect();
        let expected: Vec<NodeId> = (2..2 + ids.len() as NodeId).collect();
        assert_eq!(ids, expected);

        assert_eq!(artifact.header.order.as_deref(), Some(order.vars()));
        assert_eq!(artifact.header.n_vars, Some(3));
        assert_eq!(artifact.header.input_file.as_deref(), Some("test.cnf"));
        assert_eq!(artifact.header.input_hash.as_deref(), Some(f.file().hash.as_str()));
        // The top variable is the first one in the order.
        assert_eq!(artifact.node(artifact.root().target).unwrap().variable, 2);

        let decoded = CacheArtifact::decode(&artifact.encode()).unwrap();
        assert_eq!(decoded.sat_count(CountStrategy::Paths).unwrap(), brute_force(&f));
    }

    #[test]
    fn test_tautology_export() {
        let f = cnf(2, vec![vec![1, -1]]);
        let manager = Manager::new(default_order(2));
        let root = manager.conjoin_clauses(f.clauses());
        let artifact = manager.to_artifact(root, &f);
        assert_eq!(artifact.root(), Edge::plain(TRUE_ID));
        assert_eq!(artifact.sat_count(CountStrategy::Shared).unwrap(), BigUint::from(4u32));
    }
}
