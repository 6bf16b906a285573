//! Static variable ordering with the FORCE heuristic.
//!
//! # Span
//!
//! The *span* of a clause under an order is the distance between the
//! positions of its first and last variable. The total span of a formula is a
//! cheap proxy for the size of its BDD: clauses whose variables sit close
//! together in the order can be conjoined without blowing up the diagram.
//!
//! # FORCE
//!
//! FORCE (Aloul, Markov, Sakallah, 2003) is a force-directed placement:
//!
//! 1. Every clause computes its *center of gravity*, the mean position of its variables.
//! 2. Every variable moves to the mean center of gravity of the clauses it appears in.
//! 3. Variables are re-sorted by their new tentative locations.
//!
//! This repeats until the span stops changing or the time budget runs out.
//! The budget is checked once per iteration, so an iteration that has started
//! always completes.
//!
//! Ties between equal scores are broken by the order in which variables were
//! first encountered while aggregating (clauses in sequence, literals in
//! clause order), never by variable id. Variables that occur in no clause keep
//! their current position as score and are encountered after all others.
//!
//! # Triage
//!
//! FORCE is sensitive to the random initial order. [`force_triage`] runs a
//! population of independent FORCE instances and repeatedly keeps the better
//! half, refining the survivors, until one candidate is left.
//!
//! # References
//!
//! - F. Aloul, I. Markov, K. Sakallah. "FORCE: A Fast and Easy-To-Implement
//!   Variable-Ordering Heuristic." GLSVLSI 2003.

use std::time::{Duration, Instant};

use log::{debug, info};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cnf::{Clause, Cnf};
use crate::order::{default_order, OrderError, VariableOrder};

/// Preordering algorithm to run before building the diagram.
#[derive(Debug, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
pub enum Preorder {
    Force,
    ForceTriage,
}

/// Order found by FORCE, with its span.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForceResult {
    pub order: VariableOrder,
    pub span: u64,
}

/// Budgets and population for [`force`] and [`force_triage`].
#[derive(Debug, Clone)]
pub struct ForceConfig {
    /// Number of independent FORCE runs seeding the triage
    pub population: usize,
    /// Budget of a plain FORCE run
    pub time_limit: Duration,
    /// Budget of every seeding run in triage
    pub seed_time_limit: Duration,
    /// Budget of every refinement run in triage
    pub refine_time_limit: Duration,
    /// Random seed (None for OS entropy)
    pub seed: Option<u64>,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            population: 32,
            time_limit: Duration::from_secs(60),
            seed_time_limit: Duration::from_secs(30),
            refine_time_limit: Duration::from_secs(15),
            seed: None,
        }
    }
}

impl ForceConfig {
    pub fn with_population(mut self, population: usize) -> Self {
        self.population = population;
        self
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_triage_limits(mut self, seed: Duration, refine: Duration) -> Self {
        self.seed_time_limit = seed;
        self.refine_time_limit = refine;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Random number generator for this configuration.
    pub fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

fn clause_span(clause: &[i32], order: &VariableOrder) -> u64 {
    let mut positions = clause.iter().map(|lit| order.position(lit.unsigned_abs()));
    let Some(first) = positions.next() else {
        return 0;
    };
    let (min, max) = positions.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
    (max - min) as u64
}

/// Total span of `clauses` under `order`.
pub fn span(clauses: &[Clause], order: &VariableOrder) -> u64 {
    clauses.iter().map(|c| clause_span(c, order)).sum()
}

/// Span of a single clause divided by its length (0 for the empty clause).
pub fn normalized_span(clause: &[i32], order: &VariableOrder) -> f64 {
    if clause.is_empty() {
        return 0.0;
    }
    clause_span(clause, order) as f64 / clause.len() as f64
}

/// One FORCE iteration: move every variable to the mean center of gravity of its clauses.
fn force_step(clauses: &[Clause], order: &VariableOrder) -> VariableOrder {
    let n = order.num_vars() as usize;
    let mut sums = vec![0.0f64; n];
    let mut counts = vec![0u32; n];
    let mut seen = vec![false; n];
    let mut encountered = Vec::with_capacity(n);

    for clause in clauses {
        if clause.is_empty() {
            continue;
        }
        let total: f64 = clause.iter().map(|lit| order.position(lit.unsigned_abs()) as f64).sum();
        let cog = total / clause.len() as f64;

        for lit in clause {
            let i = lit.unsigned_abs() as usize - 1;
            sums[i] += cog;
            counts[i] += 1;
            if !seen[i] {
                seen[i] = true;
                encountered.push(lit.unsigned_abs());
            }
        }
    }

    for &var in order.vars() {
        if !seen[var as usize - 1] {
            encountered.push(var);
        }
    }

    let mut scored: Vec<(u32, f64)> = encountered
        .into_iter()
        .map(|var| {
            let i = var as usize - 1;
            let score = if counts[i] > 0 {
                sums[i] / counts[i] as f64
            } else {
                order.position(var) as f64
            };
            (var, score)
        })
        .collect();

    // Stable, so ties keep their encounter order.
    scored.sort_by(|a, b| a.1.total_cmp(&b.1));

    VariableOrder::from_permutation(scored.into_iter().map(|(var, _)| var).collect())
}

/// Runs FORCE on `cnf` for at most `time_limit`.
///
/// Starts from `initial` when given, otherwise from a random shuffle of the
/// default order. The span of the returned order is never larger than the
/// span of the starting order: if an iteration increases the span, the
/// previous order is kept and the search stops.
///
/// Fails with [`OrderError::WrongLength`] if `initial` does not cover exactly
/// the variables of `cnf`.
pub fn force<R: Rng + ?Sized>(
    cnf: &Cnf,
    time_limit: Duration,
    initial: Option<VariableOrder>,
    rng: &mut R,
) -> Result<ForceResult, OrderError> {
    let clauses = cnf.clauses();

    let mut order = match initial {
        Some(order) if order.num_vars() != cnf.num_vars() => {
            return Err(OrderError::WrongLength {
                found: order.num_vars() as usize,
                expected: cnf.num_vars() as usize,
            });
        }
        Some(order) => order,
        None => {
            let mut vars = default_order(cnf.num_vars()).into_vars();
            vars.shuffle(rng);
            VariableOrder::from_permutation(vars)
        }
    };

    let mut current = span(clauses, &order);
    debug!("[FORCE] start, span = {}", current);

    let start = Instant::now();
    let mut iterations = 0usize;

    while start.elapsed() < time_limit {
        let next = force_step(clauses, &order);
        let next_span = span(clauses, &next);
        iterations += 1;
        debug!("[FORCE] iteration {}: span = {}", iterations, next_span);

        if next_span > current {
            debug!("[FORCE] span increased ({} -> {}), keeping previous order", current, next_span);
            break;
        }

        let converged = next_span == current;
        order = next;
        current = next_span;
        if converged {
            break;
        }
    }

    debug!("[FORCE] end after {} iterations, span = {}", iterations, current);
    Ok(ForceResult { order, span: current })
}

/// Population-based FORCE: seeds `config.population` random runs, then
/// repeatedly keeps and refines the better half until one remains.
pub fn force_triage<R: Rng + ?Sized>(
    cnf: &Cnf,
    config: &ForceConfig,
    rng: &mut R,
) -> Result<ForceResult, OrderError> {
    let population = config.population.max(1);

    let mut candidates: Vec<ForceResult> = (0..population)
        .map(|i| {
            debug!("Seeding ({}/{})", i + 1, population);
            force(cnf, config.seed_time_limit, None, rng)
        })
        .collect::<Result<_, _>>()?;

    while candidates.len() > 1 {
        candidates.sort_by_key(|c| c.span);
        candidates.truncate(candidates.len() / 2);
        debug!(
            "Triage round: {} survivors, best span = {}",
            candidates.len(),
            candidates[0].span
        );

        let survivors = candidates.len();
        candidates = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| {
                debug!("Processing seed {}/{}", i + 1, survivors);
                force(cnf, config.refine_time_limit, Some(c.order), rng)
            })
            .collect::<Result<_, _>>()?;
    }

    // population >= 1, and halving never empties a list of two or more
    Ok(candidates.swap_remove(0))
}

/// Computes an order for `cnf` with the chosen preordering algorithm.
pub fn run_preorder(cnf: &Cnf, preorder: Preorder, config: &ForceConfig) -> Result<ForceResult, OrderError> {
    let mut rng = config.rng();
    let result = match preorder {
        Preorder::Force => {
            info!("Computing variable order with FORCE");
            force(cnf, config.time_limit, None, &mut rng)?
        }
        Preorder::ForceTriage => {
            info!("Computing variable order with triaged FORCE (population {})", config.population);
            force_triage(cnf, config, &mut rng)?
        }
    };
    info!("Variable ordering finished, span = {}", result.span);
    Ok(result)
}
