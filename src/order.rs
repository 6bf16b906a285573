//! Variable orders.
//!
//! A [`VariableOrder`] is a permutation of the variables `1..=n`, stored
//! position-indexed: `order.var_at(p)` is the variable placed at (0-based)
//! position `p`. The inverse mapping is kept alongside, so both directions are
//! constant-time lookups.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("variable {var} is out of range 1..={num_vars}")]
    OutOfRange { var: u32, num_vars: u32 },
    #[error("variable {0} appears more than once")]
    Duplicate(u32),
    #[error("order lists {found} variables, expected {expected}")]
    WrongLength { found: usize, expected: usize },
    #[error("invalid variable `{0}` in order")]
    Invalid(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VariableOrder {
    vars: Vec<u32>,
    // positions[var - 1] = position of var
    positions: Vec<usize>,
}

impl VariableOrder {
    /// Builds an order from a position-indexed list of variables,
    /// checking that it is a permutation of `1..=vars.len()`.
    pub fn new(vars: Vec<u32>) -> Result<Self, OrderError> {
        let n = vars.len();
        let mut positions = vec![usize::MAX; n];
        for (pos, &var) in vars.iter().enumerate() {
            if var == 0 || var as usize > n {
                return Err(OrderError::OutOfRange { var, num_vars: n as u32 });
            }
            let slot = &mut positions[var as usize - 1];
            if *slot != usize::MAX {
                return Err(OrderError::Duplicate(var));
            }
            *slot = pos;
        }
        Ok(Self { vars, positions })
    }

    /// Like [`VariableOrder::new`], additionally requiring exactly `num_vars` variables.
    pub fn with_num_vars(vars: Vec<u32>, num_vars: u32) -> Result<Self, OrderError> {
        if vars.len() != num_vars as usize {
            return Err(OrderError::WrongLength {
                found: vars.len(),
                expected: num_vars as usize,
            });
        }
        Self::new(vars)
    }

    /// Builds an order from a list already known to be a permutation of `1..=n`.
    pub(crate) fn from_permutation(vars: Vec<u32>) -> Self {
        let mut positions = vec![0; vars.len()];
        for (pos, &var) in vars.iter().enumerate() {
            positions[var as usize - 1] = pos;
        }
        debug_assert!(Self::new(vars.clone()).is_ok());
        Self { vars, positions }
    }

    /// The identity order `1, 2, ..., n`.
    pub fn identity(num_vars: u32) -> Self {
        Self {
            vars: (1..=num_vars).collect(),
            positions: (0..num_vars as usize).collect(),
        }
    }

    pub fn num_vars(&self) -> u32 {
        self.vars.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Variables in position order.
    pub fn vars(&self) -> &[u32] {
        &self.vars
    }

    pub fn var_at(&self, position: usize) -> u32 {
        self.vars[position]
    }

    /// 0-based position of a 1-based variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` is not in `1..=n`.
    pub fn position(&self, var: u32) -> usize {
        assert_ne!(var, 0, "Variable index should not be zero");
        self.positions[var as usize - 1]
    }

    pub fn into_vars(self) -> Vec<u32> {
        self.vars
    }
}

/// The identity permutation over `num_vars` variables.
pub fn default_order(num_vars: u32) -> VariableOrder {
    VariableOrder::identity(num_vars)
}

impl Display for VariableOrder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, var) in self.vars.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", var)?;
        }
        Ok(())
    }
}

/// Parses a comma list of variables without validating it as a permutation.
pub fn parse_var_list(s: &str) -> Result<Vec<u32>, OrderError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split(',')
        .map(|t| t.trim().parse::<u32>().map_err(|_| OrderError::Invalid(t.trim().to_string())))
        .collect()
}

/// Formats a list of variables as a comma list.
pub fn format_var_list(vars: &[u32]) -> String {
    vars.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

impl FromStr for VariableOrder {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(parse_var_list(s)?)
    }
}
