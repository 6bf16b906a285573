use std::io;
use std::path::PathBuf;

use crate::artifact::ArtifactError;
use crate::backend::BackendError;
use crate::cnf::CnfError;
use crate::order::OrderError;
use crate::report::ReportError;
use crate::sat::CountError;

/// Fatal conditions of a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input file {} does not exist", .0.display())]
    InputNotFound(PathBuf),
    #[error("invalid input: {0}")]
    Cnf(#[from] CnfError),
    #[error("invalid variable order: {0}")]
    Order(#[from] OrderError),
    #[error("invalid diagram artifact: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("model counting failed: {0}")]
    Count(#[from] CountError),
    #[error("report error: {0}")]
    Report(#[from] ReportError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
