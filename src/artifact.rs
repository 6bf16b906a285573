//! BDD cache artifacts.
//!
//! A cache artifact is the on-disk form of one completed decision diagram,
//! written by a backend after building the diagram for one formula under one
//! variable order, and read back to count models.
//!
//! # Format (.dd)
//!
//! ```text
//! input_file:<path>
//! input_hash:<md5 hex of the formula file>
//! order:<comma-separated variables, position-indexed>
//! n_vars:<number of variables>
//! n_nodes:<number of nodes>
//! root:<complement 0|1>:<node id>
//! ----
//! <id> <variable> <complement 0|1>:<low id> <complement 0|1>:<high id>
//! ...
//! ```
//!
//! Ids `0` and `1` are the false and true terminals and never appear as a
//! body line. A complemented edge denotes the negation of the function rooted
//! at its target. Only `root` and `n_nodes` are required in the header; the
//! delimiter line is mandatory even if the body is empty.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::Path;
use std::str::FromStr;

use log::{debug, warn};

use crate::order::{format_var_list, parse_var_list};

pub type NodeId = u64;

pub const FALSE_ID: NodeId = 0;
pub const TRUE_ID: NodeId = 1;

pub const ARTIFACT_EXTENSION: &str = "dd";

const DELIMITER: &str = "----";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("cache broken: delimiter `----` missing")]
    MissingDelimiter,
    #[error("cache broken: `{0}` missing")]
    MissingKey(&'static str),
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("line {line}: invalid header line `{content}`")]
    InvalidHeaderLine { line: usize, content: String },
    #[error("line {line}: invalid node line `{content}`")]
    InvalidNodeLine { line: usize, content: String },
    #[error("node {0} is defined twice")]
    DuplicateNode(NodeId),
    #[error("node id {0} is reserved for terminals")]
    ReservedNodeId(NodeId),
    #[error("edge from {from} points to missing node {target}")]
    DanglingEdge { from: String, target: NodeId },
    #[error("node {0} lies on a cycle")]
    Cycle(NodeId),
}

/// A (possibly complemented) edge to a node.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Edge {
    pub complement: bool,
    pub target: NodeId,
}

impl Edge {
    pub const fn new(complement: bool, target: NodeId) -> Self {
        Self { complement, target }
    }

    pub const fn plain(target: NodeId) -> Self {
        Self::new(false, target)
    }

    pub const fn complemented(target: NodeId) -> Self {
        Self::new(true, target)
    }

    pub const fn is_terminal(&self) -> bool {
        self.target == FALSE_ID || self.target == TRUE_ID
    }

    pub const fn negate(self) -> Self {
        Self::new(!self.complement, self.target)
    }
}

impl Display for Edge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.complement as u8, self.target)
    }
}

impl FromStr for Edge {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (complement, target) = s.trim().split_once(':').ok_or(())?;
        let complement = match complement {
            "0" => false,
            "1" => true,
            _ => return Err(()),
        };
        let target = target.parse::<NodeId>().map_err(|_| ())?;
        Ok(Self::new(complement, target))
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct NodeRecord {
    pub variable: u32,
    pub low: Edge,
    pub high: Edge,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CacheHeader {
    pub input_file: Option<String>,
    pub input_hash: Option<String>,
    pub order: Option<Vec<u32>>,
    pub n_vars: Option<u32>,
    pub n_nodes: u64,
    pub root: Edge,
}

impl CacheHeader {
    pub fn new(n_nodes: u64, root: Edge) -> Self {
        Self {
            input_file: None,
            input_hash: None,
            order: None,
            n_vars: None,
            n_nodes,
            root,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CacheArtifact {
    pub header: CacheHeader,
    pub nodes: BTreeMap<NodeId, NodeRecord>,
}

impl CacheArtifact {
    pub fn new(header: CacheHeader, nodes: BTreeMap<NodeId, NodeRecord>) -> Self {
        Self { header, nodes }
    }

    pub fn root(&self) -> Edge {
        self.header.root
    }

    pub fn n_vars(&self) -> Option<u32> {
        self.header.n_vars
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&id)
    }

    /// Serializes the artifact into its text form.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parses the text form and checks the structural invariants.
    pub fn decode(content: &str) -> Result<Self, ArtifactError> {
        let mut lines = content.lines().map(|line| line.trim_end_matches('\r')).enumerate();

        let mut input_file = None;
        let mut input_hash = None;
        let mut order = None;
        let mut n_vars = None;
        let mut n_nodes = None;
        let mut root = None;
        let mut delimited = false;

        for (i, line) in lines.by_ref() {
            if line == DELIMITER {
                delimited = true;
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| ArtifactError::InvalidHeaderLine {
                line: i + 1,
                content: line.to_string(),
            })?;
            match key {
                "input_file" => input_file = Some(value.to_string()),
                "input_hash" => input_hash = Some(value.to_string()),
                "order" => order = Some(parse_var_list(value).map_err(|_| invalid("order", value))?),
                "n_vars" => n_vars = Some(parse_number::<u32>("n_vars", value)?),
                "n_nodes" => n_nodes = Some(parse_number::<u64>("n_nodes", value)?),
                "root" => root = Some(value.parse::<Edge>().map_err(|_| invalid("root", value))?),
                _ => warn!("Ignoring unknown cache header key `{}`", key),
            }
        }

        if !delimited {
            return Err(ArtifactError::MissingDelimiter);
        }
        let root = root.ok_or(ArtifactError::MissingKey("root"))?;
        let n_nodes = n_nodes.ok_or(ArtifactError::MissingKey("n_nodes"))?;

        let mut nodes = BTreeMap::new();
        for (i, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let (id, node) = parse_node_line(line).ok_or_else(|| ArtifactError::InvalidNodeLine {
                line: i + 1,
                content: line.to_string(),
            })?;
            if id == FALSE_ID || id == TRUE_ID {
                return Err(ArtifactError::ReservedNodeId(id));
            }
            if nodes.insert(id, node).is_some() {
                return Err(ArtifactError::DuplicateNode(id));
            }
        }

        let artifact = Self {
            header: CacheHeader {
                input_file,
                input_hash,
                order,
                n_vars,
                n_nodes,
                root,
            },
            nodes,
        };
        artifact.validate()?;
        debug!(
            "Decoded cache artifact: {} nodes in table, root {}",
            artifact.nodes.len(),
            artifact.header.root
        );
        Ok(artifact)
    }

    /// Checks that every edge points to a terminal or a stored node and that
    /// the node table is acyclic.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        let check = |from: String, edge: Edge| {
            if edge.is_terminal() || self.nodes.contains_key(&edge.target) {
                Ok(())
            } else {
                Err(ArtifactError::DanglingEdge {
                    from,
                    target: edge.target,
                })
            }
        };
        check("root".to_string(), self.header.root)?;
        for (id, node) in &self.nodes {
            check(id.to_string(), node.low)?;
            check(id.to_string(), node.high)?;
        }

        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: HashMap<NodeId, Mark> = HashMap::with_capacity(self.nodes.len());
        for &start in self.nodes.keys() {
            if marks.contains_key(&start) {
                continue;
            }
            marks.insert(start, Mark::Visiting);
            // (node, number of children already explored)
            let mut stack: Vec<(NodeId, u8)> = vec![(start, 0)];

            while let Some(top) = stack.last_mut() {
                let (id, explored) = *top;
                if explored == 2 {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                    continue;
                }
                top.1 += 1;

                let node = &self.nodes[&id];
                let edge = if explored == 0 { node.low } else { node.high };
                if edge.is_terminal() {
                    continue;
                }
                match marks.get(&edge.target) {
                    Some(Mark::Visiting) => return Err(ArtifactError::Cycle(edge.target)),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(edge.target, Mark::Visiting);
                        stack.push((edge.target, 0));
                    }
                }
            }
        }

        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ArtifactError> {
        fs::write(path, self.encode())?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let content = fs::read_to_string(path)?;
        Self::decode(&content)
    }
}

impl Display for CacheArtifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let h = &self.header;
        if let Some(input_file) = &h.input_file {
            writeln!(f, "input_file:{}", input_file)?;
        }
        if let Some(input_hash) = &h.input_hash {
            writeln!(f, "input_hash:{}", input_hash)?;
        }
        if let Some(order) = &h.order {
            writeln!(f, "order:{}", format_var_list(order))?;
        }
        if let Some(n_vars) = h.n_vars {
            writeln!(f, "n_vars:{}", n_vars)?;
        }
        writeln!(f, "n_nodes:{}", h.n_nodes)?;
        writeln!(f, "root:{}", h.root)?;
        writeln!(f, "{}", DELIMITER)?;

        for (id, node) in &self.nodes {
            writeln!(f, "{} {} {} {}", id, node.variable, node.low, node.high)?;
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str) -> ArtifactError {
    ArtifactError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ArtifactError> {
    value.trim().parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_node_line(line: &str) -> Option<(NodeId, NodeRecord)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() != 4 {
        return None;
    }
    let id = parts[0].parse::<NodeId>().ok()?;
    let variable = parts[1].parse::<u32>().ok()?;
    let low = parts[2].parse::<Edge>().ok()?;
    let high = parts[3].parse::<Edge>().ok()?;
    Some((id, NodeRecord { variable, low, high }))
}
