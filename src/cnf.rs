//! CNF formulas and the DIMACS format.
//!
//! ```text
//! c 1 engine            # optional variable description: c <id> <label>
//! p cnf <num_vars> <num_clauses>
//! 1 -2 0                # clauses are 0-terminated lists of signed literals
//! 2 3 0
//! ```
//!
//! A formula is parsed once per run and is immutable afterwards, except that
//! its clause sequence may be replaced by a permutation of itself.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::hash::ContentHash;

/// A disjunction of signed literals (DIMACS convention, no terminating zero).
pub type Clause = Vec<i32>;

#[derive(Debug, thiserror::Error)]
pub enum CnfError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("missing problem line (`p cnf <vars> <clauses>`)")]
    MissingHeader,
    #[error("line {line}: invalid problem line `{content}`")]
    InvalidHeader { line: usize, content: String },
    #[error("line {line}: only CNF formulas are supported, but the type is `{kind}`")]
    UnsupportedFormat { line: usize, kind: String },
    #[error("line {line}: invalid literal `{token}`")]
    InvalidLiteral { line: usize, token: String },
    #[error("line {line}: literal {literal} is out of range for {num_vars} variables")]
    LiteralOutOfRange { line: usize, literal: i32, num_vars: u32 },
}

/// Where a formula came from: its path and the hash of its content.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub hash: ContentHash,
}

impl FileIdentity {
    pub fn new(path: impl Into<PathBuf>, hash: ContentHash) -> Self {
        Self { path: path.into(), hash }
    }

    /// Identity for content that was never read from disk.
    pub fn in_memory(name: &str, content: &str) -> Self {
        Self::new(name, ContentHash::of_bytes(content))
    }
}

#[derive(Debug, Clone)]
pub struct Cnf {
    file: FileIdentity,
    num_vars: u32,
    descriptions: BTreeMap<u32, String>,
    clauses: Vec<Clause>,
}

impl Cnf {
    /// Creates a formula, checking that every literal is in range.
    pub fn new(file: FileIdentity, num_vars: u32, clauses: Vec<Clause>) -> Result<Self, CnfError> {
        for (i, clause) in clauses.iter().enumerate() {
            for &lit in clause {
                check_literal(lit, num_vars, i + 1)?;
            }
        }
        Ok(Self {
            file,
            num_vars,
            descriptions: BTreeMap::new(),
            clauses,
        })
    }

    pub fn file(&self) -> &FileIdentity {
        &self.file
    }
    pub fn num_vars(&self) -> u32 {
        self.num_vars
    }
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }
    pub fn descriptions(&self) -> &BTreeMap<u32, String> {
        &self.descriptions
    }
    pub fn description(&self, var: u32) -> Option<&str> {
        self.descriptions.get(&var).map(String::as_str)
    }

    /// Replaces the clause sequence with a permutation of itself.
    ///
    /// # Panics
    ///
    /// Panics if `permutation` is not a permutation of `0..num_clauses`.
    pub fn reorder_clauses(&mut self, permutation: &[usize]) {
        assert_eq!(permutation.len(), self.clauses.len(), "Permutation length mismatch");
        let mut taken = vec![false; self.clauses.len()];
        let mut reordered = Vec::with_capacity(self.clauses.len());
        for &i in permutation {
            assert!(!taken[i], "Index {} appears twice in the permutation", i);
            taken[i] = true;
            reordered.push(std::mem::take(&mut self.clauses[i]));
        }
        self.clauses = reordered;
    }

    /// Loads and parses a DIMACS file, hashing its content.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CnfError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file = FileIdentity::new(path, ContentHash::of_bytes(&content));
        Self::parse(&content, file)
    }

    /// Parses DIMACS text.
    ///
    /// A mismatch between the declared and the parsed number of clauses is
    /// only reported as a warning; the parsed clauses are used.
    pub fn parse(content: &str, file: FileIdentity) -> Result<Self, CnfError> {
        let mut header: Option<(u32, usize)> = None;
        let mut descriptions = BTreeMap::new();
        let mut clauses = Vec::new();
        let mut current: Clause = Vec::new();

        for (i, line) in content.lines().enumerate() {
            let line_no = i + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('%') {
                // SATLIB end marker
                break;
            }

            if let Some(comment) = line.strip_prefix('c') {
                if let Some((var, label)) = parse_description(comment) {
                    descriptions.insert(var, label);
                }
                continue;
            }

            if line.starts_with('p') {
                header = Some(parse_header(line, line_no)?);
                continue;
            }

            let num_vars = match header {
                Some((num_vars, _)) => num_vars,
                None => return Err(CnfError::MissingHeader),
            };
            for token in line.split_whitespace() {
                let lit: i32 = token.parse().map_err(|_| CnfError::InvalidLiteral {
                    line: line_no,
                    token: token.to_string(),
                })?;
                if lit == 0 {
                    clauses.push(std::mem::take(&mut current));
                } else {
                    check_literal(lit, num_vars, line_no)?;
                    current.push(lit);
                }
            }
        }

        if !current.is_empty() {
            clauses.push(current);
        }

        let (num_vars, num_clauses) = header.ok_or(CnfError::MissingHeader)?;
        if num_clauses != clauses.len() {
            warn!(
                "Specified number of clauses ({}) differs from number of parsed ones ({})",
                num_clauses,
                clauses.len()
            );
        }
        descriptions.retain(|&var, _| var <= num_vars);
        debug!(
            "Parsed {}: {} variables, {} clauses, {} descriptions",
            file.path.display(),
            num_vars,
            clauses.len(),
            descriptions.len()
        );

        Ok(Self {
            file,
            num_vars,
            descriptions,
            clauses,
        })
    }

    /// Renders the formula (with its current clause sequence) as DIMACS.
    pub fn to_dimacs(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cnf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (var, label) in &self.descriptions {
            writeln!(f, "c {} {}", var, label)?;
        }
        writeln!(f, "p cnf {} {}", self.num_vars, self.clauses.len())?;
        for clause in &self.clauses {
            for lit in clause {
                write!(f, "{} ", lit)?;
            }
            writeln!(f, "0")?;
        }
        Ok(())
    }
}

fn check_literal(lit: i32, num_vars: u32, line: usize) -> Result<(), CnfError> {
    if lit == 0 || lit.unsigned_abs() > num_vars {
        return Err(CnfError::LiteralOutOfRange {
            line,
            literal: lit,
            num_vars,
        });
    }
    Ok(())
}

fn parse_header(line: &str, line_no: usize) -> Result<(u32, usize), CnfError> {
    let invalid = || CnfError::InvalidHeader {
        line: line_no,
        content: line.to_string(),
    };
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "p" {
        return Err(invalid());
    }
    if parts[1] != "cnf" {
        return Err(CnfError::UnsupportedFormat {
            line: line_no,
            kind: parts[1].to_string(),
        });
    }
    if parts.len() != 4 {
        return Err(invalid());
    }
    let num_vars = parts[2].parse::<u32>().map_err(|_| invalid())?;
    let num_clauses = parts[3].parse::<usize>().map_err(|_| invalid())?;
    Ok((num_vars, num_clauses))
}

/// Parses `<id> <label>` out of a comment body.
fn parse_description(comment: &str) -> Option<(u32, String)> {
    let comment = comment.trim_start();
    let (id, label) = comment.split_once(char::is_whitespace)?;
    let id: u32 = id.parse().ok()?;
    let label = label.trim();
    if id == 0 || label.is_empty() {
        return None;
    }
    Some((id, label.to_string()))
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn parse(content: &str) -> Result<Cnf, CnfError> {
        Cnf::parse(content, FileIdentity::in_memory("test.cnf", content))
    }

    #[test]
    fn test_parse_simple() {
        let cnf = parse("c 1 engine\nc 2 wheels\nc a comment\np cnf 3 2\n1 -2 0\n2 3 0\n").unwrap();
        assert_eq!(cnf.num_vars(), 3);
        assert_eq!(cnf.clauses(), &[vec![1, -2], vec![2, 3]]);
        assert_eq!(cnf.description(1), Some("engine"));
        assert_eq!(cnf.description(2), Some("wheels"));
        assert_eq!(cnf.description(3), None);
    }

    #[test]
    fn test_parse_multiline_clause() {
        let cnf = parse("p cnf 3 2\n1 2\n3 0 -1 0\n").unwrap();
        assert_eq!(cnf.clauses(), &[vec![1, 2, 3], vec![-1]]);
    }

    #[test]
    fn test_parse_unterminated_last_clause() {
        let cnf = parse("p cnf 2 1\n1 2\n").unwrap();
        assert_eq!(cnf.clauses(), &[vec![1, 2]]);
    }

    #[test]
    fn test_parse_count_mismatch_is_not_fatal() {
        let cnf = parse("p cnf 2 5\n1 0\n").unwrap();
        assert_eq!(cnf.clauses().len(), 1);
    }

    #[test]
    fn test_parse_satlib_end_marker() {
        let cnf = parse("p cnf 2 1\n1 2 0\n%\n0\n").unwrap();
        assert_eq!(cnf.clauses(), &[vec![1, 2]]);
    }

    #[test]
    fn test_parse_unsupported_format() {
        let err = parse("p dnf 2 1\n1 2 0\n").unwrap_err();
        assert!(matches!(err, CnfError::UnsupportedFormat { kind, .. } if kind == "dnf"));
    }

    #[test]
    fn test_parse_invalid_header() {
        assert!(matches!(parse("p cnf x 1\n"), Err(CnfError::InvalidHeader { line: 1, .. })));
        assert!(matches!(parse("p cnf 2\n"), Err(CnfError::InvalidHeader { .. })));
    }

    #[test]
    fn test_parse_missing_header() {
        assert!(matches!(parse("1 2 0\n"), Err(CnfError::MissingHeader)));
        assert!(matches!(parse("c nothing\n"), Err(CnfError::MissingHeader)));
    }

    #[test]
    fn test_parse_out_of_range() {
        let err = parse("p cnf 2 1\n1 -3 0\n").unwrap_err();
        assert!(matches!(err, CnfError::LiteralOutOfRange { line: 2, literal: -3, num_vars: 2 }));
    }

    #[test]
    fn test_parse_invalid_literal() {
        let err = parse("p cnf 2 1\n1 x 0\n").unwrap_err();
        assert!(matches!(err, CnfError::InvalidLiteral { token, .. } if token == "x"));
    }

    #[test]
    fn test_dimacs_roundtrip() {
        let cnf = parse("c 2 brake\np cnf 3 2\n1 -2 0\n2 3 0\n").unwrap();
        let text = cnf.to_dimacs();
        let again = parse(&text).unwrap();
        assert_eq!(again.num_vars(), 3);
        assert_eq!(again.clauses(), cnf.clauses());
        assert_eq!(again.description(2), Some("brake"));
    }

    #[test]
    fn test_reorder_clauses() {
        let mut cnf = parse("p cnf 3 3\n1 0\n2 0\n3 0\n").unwrap();
        cnf.reorder_clauses(&[2, 0, 1]);
        assert_eq!(cnf.clauses(), &[vec![3], vec![1], vec![2]]);
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        let file = FileIdentity::in_memory("x", "");
        assert!(Cnf::new(file.clone(), 2, vec![vec![1, 2]]).is_ok());
        assert!(matches!(
            Cnf::new(file, 2, vec![vec![1], vec![3]]),
            Err(CnfError::LiteralOutOfRange { line: 2, literal: 3, .. })
        ));
    }
}
