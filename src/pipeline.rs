//! One model-counting run, from the formula file to the report.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use num_bigint::BigUint;

use crate::artifact::{CacheArtifact, ARTIFACT_EXTENSION};
use crate::backend::Backend;
use crate::cnf::Cnf;
use crate::config::Config;
use crate::error::Error;
use crate::force::run_preorder;
use crate::hash::ContentHash;
use crate::order::{default_order, VariableOrder};
use crate::report::{canonical_path, Report};
use crate::sequence::clause_permutation_by_span;
use crate::validity::{validate, Validity};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub file: PathBuf,
    pub artifact: PathBuf,
    pub report: PathBuf,
    pub order: VariableOrder,
    pub count: BigUint,
    pub n_nodes: u64,
    pub reused_order: bool,
    pub reused_artifact: bool,
}

/// File name of `path` up to its first `.`.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split('.').next() {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => name,
    }
}

pub struct Runner<'a> {
    config: &'a Config,
    backend: Box<dyn Backend + 'a>,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a Config, backend: Box<dyn Backend + 'a>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn run(&mut self, path: impl AsRef<Path>) -> Result<RunSummary, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }

        let base = base_name(path);
        let report_path = canonical_path(&self.config.report_dir, &base);
        let artifact_path = self
            .backend
            .artifact_path(&self.config.cache_dir.join(format!("{}.{}", base, ARTIFACT_EXTENSION)));

        let mut cnf = Cnf::load(path)?;
        info!(
            "Loaded {}: {} variables, {} clauses",
            path.display(),
            cnf.num_vars(),
            cnf.clauses().len()
        );

        let prior = if self.config.caching {
            self.load_prior(&report_path, &cnf.file().hash)
        } else {
            None
        };

        let (order, reused_order) = self.choose_order(&cnf, prior.as_ref(), &base)?;
        debug!("Variable order: {}", order);

        let permutation = clause_permutation_by_span(cnf.clauses(), &order);
        cnf.reorder_clauses(&permutation);

        let reused = prior
            .as_ref()
            .and_then(|report| self.reusable_artifact(report, &artifact_path, &order, reused_order));
        let reused_artifact = reused.is_some();
        let artifact = match reused {
            Some(artifact) => artifact,
            None => {
                let written = self
                    .backend
                    .build(&cnf, &order, self.config.dynorder, &artifact_path)?;
                CacheArtifact::load(&written)?
            }
        };

        let count = artifact.sat_count(self.config.count)?;
        let n_nodes = artifact.header.n_nodes;
        info!("#SAT = {}, {} nodes", count, n_nodes);

        let artifact_hash = ContentHash::of_file(&artifact_path)?;
        let report = Report::finished(&cnf, &artifact_path, artifact_hash, &order, count.clone(), n_nodes);
        let written = report.write(&self.config.report_dir, &base)?;
        info!("Report written to {}", written.canonical.display());

        Ok(RunSummary {
            file: path.to_path_buf(),
            artifact: artifact_path,
            report: written.canonical,
            order,
            count,
            n_nodes,
            reused_order,
            reused_artifact,
        })
    }

    /// Reads the canonical report and keeps it only if it is still valid.
    fn load_prior(&self, report_path: &Path, current: &ContentHash) -> Option<Report> {
        if !report_path.exists() {
            debug!("No prior report at {}", report_path.display());
            return None;
        }
        info!("Found cache {}", report_path.display());

        let report = match Report::load(report_path) {
            Ok(report) => report,
            Err(e) => {
                warn!("Discarding cache: {}", e);
                return None;
            }
        };
        match validate(report.as_ref(), current) {
            Validity::Valid => report,
            Validity::Invalid(reason) => {
                warn!("Discarding cache: {}", reason);
                None
            }
        }
    }

    fn choose_order(
        &self,
        cnf: &Cnf,
        prior: Option<&Report>,
        base: &str,
    ) -> Result<(VariableOrder, bool), Error> {
        let cached = prior.and_then(|report| report.order.clone());
        if let Some(vars) = cached {
            match VariableOrder::with_num_vars(vars, cnf.num_vars()) {
                Ok(order) => {
                    info!("Using variable order from cache");
                    if let Some(preorder) = self.config.preorder {
                        warn!("Ignoring preorder {:?} as a cached order exists", preorder);
                    }
                    return Ok((order, true));
                }
                Err(e) => warn!("Ignoring cached order: {}", e),
            }
        } else if prior.is_some() {
            info!("Cache contains no variable order");
        }

        let Some(preorder) = self.config.preorder else {
            return Ok((default_order(cnf.num_vars()), false));
        };

        let result = run_preorder(cnf, preorder, &self.config.force)?;
        info!("Preorder {:?} finished with span {}", preorder, result.span);
        // Keep the computed order even if the build fails.
        Report::order_only(cnf, &result.order).write_canonical(&self.config.report_dir, base)?;
        Ok((result.order, false))
    }

    /// Artifact of a valid prior run, if it is unchanged, still decodes and
    /// was built under `order`.
    ///
    /// An artifact whose header carries no order is only trusted when `order`
    /// itself came from the prior report.
    fn reusable_artifact(
        &self,
        report: &Report,
        artifact_path: &Path,
        order: &VariableOrder,
        reused_order: bool,
    ) -> Option<CacheArtifact> {
        let recorded = report.bdd_md5.as_ref()?;
        let current = ContentHash::of_file(artifact_path).ok()?;
        if *recorded != current {
            debug!("Artifact {} changed since the last run", artifact_path.display());
            return None;
        }
        let artifact = match CacheArtifact::load(artifact_path) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("Discarding cached artifact {}: {}", artifact_path.display(), e);
                return None;
            }
        };
        let same_order = match &artifact.header.order {
            Some(built) => built.as_slice() == order.vars(),
            None => reused_order,
        };
        if !same_order {
            info!("Rebuilding {}: it was built under another variable order", artifact_path.display());
            return None;
        }
        info!("Reusing artifact {}", artifact_path.display());
        Some(artifact)
    }
}
