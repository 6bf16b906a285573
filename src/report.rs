//! Run reports.
//!
//! A report summarizes one run as `key:value` lines:
//!
//! ```text
//! file:<formula path>
//! file_md5:<hash of the formula>
//! bdd:<artifact path>
//! bdd_md5:<hash of the artifact>
//! order:<comma-separated variables>
//! #SAT:<model count>
//! #nodes:<diagram size>
//! ```
//!
//! Every run overwrites the canonical `<base>.ddrep` and adds a timestamped
//! snapshot `<base>-<YYYYmmddHHMMSS>.ddrep` that is never overwritten. Right
//! after a fresh preorder, an order-only report carrying just `file`,
//! `file_md5` and `order` is written as the canonical report.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use num_bigint::BigUint;

use crate::cnf::Cnf;
use crate::hash::ContentHash;
use crate::order::{format_var_list, parse_var_list, VariableOrder};

pub const REPORT_EXTENSION: &str = "ddrep";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Report {
    pub file: Option<String>,
    pub file_md5: Option<ContentHash>,
    pub bdd: Option<String>,
    pub bdd_md5: Option<ContentHash>,
    pub order: Option<Vec<u32>>,
    pub sat_count: Option<BigUint>,
    pub n_nodes: Option<u64>,
}

/// Where a report was written.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ReportPaths {
    pub canonical: PathBuf,
    pub snapshot: PathBuf,
}

pub fn canonical_path(dir: &Path, base: &str) -> PathBuf {
    dir.join(format!("{}.{}", base, REPORT_EXTENSION))
}

impl Report {
    /// Report recording only the order computed for `cnf`.
    pub fn order_only(cnf: &Cnf, order: &VariableOrder) -> Self {
        Self {
            file: Some(cnf.file().path.display().to_string()),
            file_md5: Some(cnf.file().hash.clone()),
            order: Some(order.vars().to_vec()),
            ..Self::default()
        }
    }

    /// Full report of a finished run.
    pub fn finished(
        cnf: &Cnf,
        artifact: &Path,
        artifact_hash: ContentHash,
        order: &VariableOrder,
        sat_count: BigUint,
        n_nodes: u64,
    ) -> Self {
        Self {
            bdd: Some(artifact.display().to_string()),
            bdd_md5: Some(artifact_hash),
            sat_count: Some(sat_count),
            n_nodes: Some(n_nodes),
            ..Self::order_only(cnf, order)
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn encode(&self) -> String {
        self.to_string()
    }

    pub fn parse(content: &str) -> Result<Self, ReportError> {
        let invalid = |key: &str, value: &str| ReportError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        let mut report = Self::default();
        for line in content.lines().map(|l| l.trim_end_matches('\r')) {
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                warn!("Ignoring malformed report line `{}`", line);
                continue;
            };
            match key {
                "file" => report.file = Some(value.to_string()),
                "file_md5" => report.file_md5 = Some(ContentHash::from_hex(value)),
                "bdd" => report.bdd = Some(value.to_string()),
                "bdd_md5" => report.bdd_md5 = Some(ContentHash::from_hex(value)),
                "order" => {
                    let vars = parse_var_list(value).map_err(|_| invalid(key, value))?;
                    report.order = if vars.is_empty() { None } else { Some(vars) };
                }
                "#SAT" => report.sat_count = Some(value.trim().parse().map_err(|_| invalid(key, value))?),
                "#nodes" => report.n_nodes = Some(value.trim().parse().map_err(|_| invalid(key, value))?),
                _ => debug!("Ignoring unknown report key `{}`", key),
            }
        }
        Ok(report)
    }

    /// Reads a report, returning `None` if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, ReportError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(Self::parse(&content)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites the canonical report `<dir>/<base>.ddrep`.
    pub fn write_canonical(&self, dir: &Path, base: &str) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir)?;
        let path = canonical_path(dir, base);
        fs::write(&path, self.encode())?;
        debug!("Report written to {}", path.display());
        Ok(path)
    }

    /// Writes the canonical report and a new timestamped snapshot.
    pub fn write(&self, dir: &Path, base: &str) -> Result<ReportPaths, ReportError> {
        let snapshot = self.write_snapshot(dir, base)?;
        let canonical = self.write_canonical(dir, base)?;
        Ok(ReportPaths { canonical, snapshot })
    }

    fn write_snapshot(&self, dir: &Path, base: &str) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let content = self.encode();

        for attempt in 0u32.. {
            let name = if attempt == 0 {
                format!("{}-{}.{}", base, stamp, REPORT_EXTENSION)
            } else {
                format!("{}-{}-{}.{}", base, stamp, attempt, REPORT_EXTENSION)
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())?;
                    debug!("Report snapshot written to {}", path.display());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("snapshot attempts are unbounded")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            writeln!(f, "file:{}", file)?;
        }
        if let Some(hash) = &self.file_md5 {
            writeln!(f, "file_md5:{}", hash)?;
        }
        if let Some(bdd) = &self.bdd {
            writeln!(f, "bdd:{}", bdd)?;
        }
        if let Some(hash) = &self.bdd_md5 {
            writeln!(f, "bdd_md5:{}", hash)?;
        }
        if let Some(order) = &self.order {
            writeln!(f, "order:{}", format_var_list(order))?;
        }
        if let Some(count) = &self.sat_count {
            writeln!(f, "#SAT:{}", count)?;
        }
        if let Some(n_nodes) = self.n_nodes {
            writeln!(f, "#nodes:{}", n_nodes)?;
        }
        Ok(())
    }
}
