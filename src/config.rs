//! Run configuration.

use std::path::PathBuf;

use log::LevelFilter;

use crate::backend::DynOrder;
use crate::force::{ForceConfig, Preorder};
use crate::sat::CountStrategy;

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    Silent,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    /// Resolves the `--silent`/`--verbose` pair. Both at once cancel out.
    pub fn from_flags(silent: bool, verbose: bool) -> Self {
        match (silent, verbose) {
            (true, false) => Verbosity::Silent,
            (false, true) => Verbosity::Verbose,
            _ => Verbosity::Normal,
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        match self {
            Verbosity::Silent => LevelFilter::Warn,
            Verbosity::Normal => LevelFilter::Info,
            Verbosity::Verbose => LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding diagram artifacts.
    pub cache_dir: PathBuf,
    /// Directory holding run reports.
    pub report_dir: PathBuf,
    /// Whether prior reports and artifacts may be reused.
    pub caching: bool,
    pub preorder: Option<Preorder>,
    pub dynorder: DynOrder,
    pub force: ForceConfig,
    pub count: CountStrategy,
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
            report_dir: PathBuf::from("reports"),
            caching: true,
            preorder: None,
            dynorder: DynOrder::default(),
            force: ForceConfig::default(),
            count: CountStrategy::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl Config {
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_preorder(mut self, preorder: Option<Preorder>) -> Self {
        self.preorder = preorder;
        self
    }

    pub fn with_dynorder(mut self, dynorder: DynOrder) -> Self {
        self.dynorder = dynorder;
        self
    }

    pub fn with_force(mut self, force: ForceConfig) -> Self {
        self.force = force;
        self
    }

    pub fn with_count(mut self, count: CountStrategy) -> Self {
        self.count = count;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_verbosity_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Silent);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Normal);
    }

    #[test]
    fn test_level_filter() {
        assert_eq!(Verbosity::Silent.level_filter(), LevelFilter::Warn);
        assert_eq!(Verbosity::Normal.level_filter(), LevelFilter::Info);
        assert_eq!(Verbosity::Verbose.level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.caching);
        assert_eq!(config.preorder, None);
        assert_eq!(config.dynorder, DynOrder::SiftConv);
        assert_eq!(config.count, CountStrategy::Paths);
    }
}
