//! Diagram builders.
//!
//! A [`Backend`] turns a sequenced formula and a variable order into a cache
//! artifact on disk. Each backend writes to its own flavour of the artifact
//! path, so that artifacts of different builders never clash.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};

use crate::artifact::ARTIFACT_EXTENSION;
use crate::cnf::Cnf;
use crate::manager::Manager;
use crate::order::VariableOrder;

/// Dynamic reordering mode requested from a backend.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
pub enum DynOrder {
    Off,
    Sift,
    #[default]
    SiftConv,
}

impl DynOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            DynOrder::Off => "off",
            DynOrder::Sift => "sift",
            DynOrder::SiftConv => "sift-conv",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend `{backend}` is unavailable: {hint}")]
    Unavailable { backend: String, hint: String },
    #[error("backend `{backend}` failed to build the diagram: {reason}")]
    BuildFailed { backend: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub trait Backend {
    fn name(&self) -> &str;

    /// Short tag appended to artifact file names.
    fn stub(&self) -> &str;

    /// Builds the diagram of `cnf` under `order` and writes it to `artifact_path`.
    ///
    /// Clauses are conjoined in the sequence `cnf` holds them.
    fn build(
        &mut self,
        cnf: &Cnf,
        order: &VariableOrder,
        dynorder: DynOrder,
        artifact_path: &Path,
    ) -> Result<PathBuf, BackendError>;

    /// Artifact path of this backend for the unflavoured `path`.
    fn artifact_path(&self, path: &Path) -> PathBuf {
        flavour_filename(path, self.stub())
    }
}

/// `<dir>/<base>.dd` becomes `<dir>/<base>-<stub>.dd`.
pub fn flavour_filename(path: &Path, stub: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| ARTIFACT_EXTENSION.to_string());
    path.with_file_name(format!("{}-{}.{}", stem, stub, extension))
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

/// Builds diagrams in-process with [`Manager`].
#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn stub(&self) -> &str {
        "native"
    }

    fn build(
        &mut self,
        cnf: &Cnf,
        order: &VariableOrder,
        dynorder: DynOrder,
        artifact_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        if dynorder != DynOrder::Off {
            warn!(
                "Dynamic reordering `{}` is not supported by the {} backend, keeping the static order",
                dynorder.as_str(),
                self.name()
            );
        }

        let manager = Manager::new(order.clone());
        let root = manager.conjoin_clauses(cnf.clauses());
        let artifact = manager.to_artifact(root, cnf);
        debug_assert_eq!(artifact.header.n_nodes, manager.size(root));
        info!(
            "Built diagram with {} nodes ({} allocated)",
            artifact.header.n_nodes,
            manager.num_nodes()
        );

        ensure_parent(artifact_path)?;
        fs::write(artifact_path, artifact.encode())?;
        debug!("Artifact written to {}", artifact_path.display());
        Ok(artifact_path.to_path_buf())
    }
}

/// Runs an external builder executable.
///
/// The program is invoked as
///
/// ```text
/// <program> [args..] --cnf <sequenced.cnf> --order <list> --dynorder <mode> --output <artifact>
/// ```
///
/// and must write the artifact to the given output path.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: PathBuf,
    args: Vec<OsString>,
    name: String,
}

impl CommandBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let name = program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "command".to_string());
        Self {
            program,
            args: Vec::new(),
            name,
        }
    }

    /// Arguments passed before the standard ones, e.g. a script for an interpreter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn build_failed(&self, reason: impl Into<String>) -> BackendError {
        BackendError::BuildFailed {
            backend: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl Backend for CommandBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn stub(&self) -> &str {
        &self.name
    }

    fn build(
        &mut self,
        cnf: &Cnf,
        order: &VariableOrder,
        dynorder: DynOrder,
        artifact_path: &Path,
    ) -> Result<PathBuf, BackendError> {
        ensure_parent(artifact_path)?;
        let cnf_path = artifact_path.with_extension("cnf");
        fs::write(&cnf_path, cnf.to_dimacs())?;

        // A stale artifact must not pass for a fresh one.
        match fs::remove_file(artifact_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        debug!("Running {} for {}", self.program.display(), cnf_path.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--cnf")
            .arg(&cnf_path)
            .arg("--order")
            .arg(order.to_string())
            .arg("--dynorder")
            .arg(dynorder.as_str())
            .arg("--output")
            .arg(artifact_path)
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::Unavailable {
                    backend: self.name.clone(),
                    hint: format!(
                        "`{}` was not found, install it or point --backend-program to it",
                        self.program.display()
                    ),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.build_failed(format!("{}: {}", output.status, stderr.trim())));
        }
        if !artifact_path.exists() {
            return Err(self.build_failed(format!("no artifact written to {}", artifact_path.display())));
        }

        info!("Backend {} wrote {}", self.name, artifact_path.display());
        Ok(artifact_path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;
    use crate::artifact::CacheArtifact;
    use crate::cnf::FileIdentity;
    use crate::order::default_order;
    use crate::sat::CountStrategy;

    fn or_cnf() -> Cnf {
        let content = "p cnf 2 1\n1 2 0\n";
        Cnf::parse(content, FileIdentity::in_memory("or.cnf", content)).unwrap()
    }

    #[test]
    fn test_flavour_filename() {
        assert_eq!(
            flavour_filename(Path::new(".cache/or.dd"), "native"),
            PathBuf::from(".cache/or-native.dd")
        );
        assert_eq!(flavour_filename(Path::new("or"), "cudd"), PathBuf::from("or-cudd.dd"));
    }

    #[test]
    fn test_dynorder_names() {
        use clap::ValueEnum;
        for mode in DynOrder::value_variants() {
            let name = mode.to_possible_value().unwrap();
            assert_eq!(name.get_name(), mode.as_str());
        }
        assert_eq!(DynOrder::default(), DynOrder::SiftConv);
    }

    #[test]
    fn test_native_build() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = NativeBackend::new();
        let path = backend.artifact_path(&dir.path().join("or.dd"));
        assert_eq!(path, dir.path().join("or-native.dd"));

        let cnf = or_cnf();
        let written = backend.build(&cnf, &default_order(2), DynOrder::SiftConv, &path).unwrap();
        assert_eq!(written, path);

        let artifact = CacheArtifact::load(&path).unwrap();
        assert_eq!(artifact.header.n_nodes, 3);
        assert_eq!(artifact.sat_count(CountStrategy::Paths).unwrap(), BigUint::from(3u32));
    }

    #[test]
    fn test_command_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = CommandBackend::new(dir.path().join("no-such-builder"));
        let path = backend.artifact_path(&dir.path().join("or.dd"));
        let res = backend.build(&or_cnf(), &default_order(2), DynOrder::Off, &path);
        assert!(matches!(res, Err(BackendError::Unavailable { backend, .. }) if backend == "no-such-builder"));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("or.dd");

        let mut failing = CommandBackend::new("sh").with_args(["-c", "echo boom >&2; exit 3", "sh"]);
        let res = failing.build(&or_cnf(), &default_order(2), DynOrder::Off, &path);
        assert!(matches!(res, Err(BackendError::BuildFailed { ref reason, .. }) if reason.contains("boom")));

        let mut silent = CommandBackend::new("sh").with_args(["-c", "exit 0", "sh"]);
        let res = silent.build(&or_cnf(), &default_order(2), DynOrder::Off, &path);
        assert!(matches!(res, Err(BackendError::BuildFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_success() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("builder.sh");
        fs::write(
            &script,
            concat!(
                "while [ $# -gt 0 ]; do\n",
                "  case \"$1\" in\n",
                "    --output) out=\"$2\"; shift ;;\n",
                "    --dynorder) mode=\"$2\"; shift ;;\n",
                "  esac\n",
                "  shift\n",
                "done\n",
                "[ \"$mode\" = sift ] || exit 1\n",
                "printf 'n_vars:2\\nn_nodes:1\\nroot:0:1\\n----\\n' > \"$out\"\n",
            ),
        )
        .unwrap();

        let mut backend = CommandBackend::new("sh").with_args([script.as_os_str()]).with_name("script");
        let path = backend.artifact_path(&dir.path().join("or.dd"));
        assert_eq!(path, dir.path().join("or-script.dd"));

        backend.build(&or_cnf(), &default_order(2), DynOrder::Sift, &path).unwrap();
        assert!(dir.path().join("or-script.cnf").exists());

        let artifact = CacheArtifact::load(&path).unwrap();
        assert_eq!(artifact.sat_count(CountStrategy::Paths).unwrap(), BigUint::from(4u32));
    }
}
