//! Architecture Graph
//!
//! A segmentation architecture is a DAG whose nodes are stored in topological
//! order. Every input reference must name a node at a strictly lower position,
//! so the ordering itself rules out cycles.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;

use super::operations::OperationType;
use crate::error::{Result, SegNasError};

/// Downsampling levels a node may live at
pub const SCALE_LADDER: [u32; 5] = [1, 2, 4, 8, 16];

/// Name of the source sentinel node
pub const INPUT_NODE: &str = "input";

/// Name of the sink sentinel node
pub const OUTPUT_NODE: &str = "output";

/// A single layer of the architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Unique name within the graph
    pub name: String,
    /// Operator applied by this node
    pub op: OperationType,
    /// Downsampling factor of this node's feature map
    pub scale: u32,
    /// Names of predecessor nodes
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl Node {
    /// Create a node with no inputs
    pub fn new(name: impl Into<String>, op: OperationType, scale: u32) -> Self {
        Self {
            name: name.into(),
            op,
            scale,
            inputs: Vec::new(),
        }
    }

    /// Set the input references
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-scale channel width configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Width at scale 1
    pub base_channels: u32,
    /// Width increment per downsampling level
    pub delta_channels: u32,
    /// Grow the increment geometrically with depth
    #[serde(default)]
    pub mult_delta: bool,
}

impl ChannelConfig {
    /// Create a channel configuration
    pub fn new(base_channels: u32, delta_channels: u32, mult_delta: bool) -> Self {
        Self {
            base_channels,
            delta_channels,
            mult_delta,
        }
    }

    /// Channel width of a node living at `scale`.
    ///
    /// With `mult_delta` the width is `base + delta * (scale - 1)`, otherwise
    /// `base + delta * log2(scale)`.
    pub fn channels_at_scale(&self, scale: u32) -> u32 {
        let level = scale.max(1).trailing_zeros();
        let steps = if self.mult_delta {
            (1u32 << level) - 1
        } else {
            level
        };
        self.base_channels + self.delta_channels * steps
    }
}

/// Ordered DAG of nodes, first `input`, last `output`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Node>", into = "Vec<Node>")]
pub struct ArchGraph {
    nodes: Vec<Node>,
}

impl ArchGraph {
    /// Build a graph, checking every structural invariant.
    pub fn new(nodes: Vec<Node>) -> Result<Self> {
        validate_nodes(&nodes)?;
        Ok(Self { nodes })
    }

    /// Nodes in topological order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Consume the graph into its node list
    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    /// Iterate nodes in topological order
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.nodes.iter()
    }

    /// Number of nodes, sentinels included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a validated graph
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Position of the node called `name`
    pub fn position(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Node called `name`
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// `(source, destination)` pairs, one per input reference
    pub fn edges(&self) -> Vec<(String, String)> {
        self.nodes
            .iter()
            .flat_map(|dst| {
                dst.inputs
                    .iter()
                    .map(move |src| (src.clone(), dst.name.clone()))
            })
            .collect()
    }

    /// Number of edges leaving `name`
    pub fn out_degree(&self, name: &str) -> usize {
        self.nodes
            .iter()
            .map(|n| n.inputs.iter().filter(|inp| *inp == name).count())
            .sum()
    }

    /// Out-degree of every node, keyed by name
    pub fn out_degrees(&self) -> HashMap<&str, usize> {
        let mut degrees: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        for node in &self.nodes {
            for inp in &node.inputs {
                if let Some(d) = degrees.get_mut(inp.as_str()) {
                    *d += 1;
                }
            }
        }
        degrees
    }
}

impl TryFrom<Vec<Node>> for ArchGraph {
    type Error = SegNasError;

    fn try_from(nodes: Vec<Node>) -> Result<Self> {
        Self::new(nodes)
    }
}

impl From<ArchGraph> for Vec<Node> {
    fn from(graph: ArchGraph) -> Self {
        graph.nodes
    }
}

impl<'a> IntoIterator for &'a ArchGraph {
    type Item = &'a Node;
    type IntoIter = std::slice::Iter<'a, Node>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

fn structural(msg: impl Into<String>) -> SegNasError {
    SegNasError::StructuralError(msg.into())
}

fn validate_nodes(nodes: &[Node]) -> Result<()> {
    if nodes.len() < 2 {
        return Err(structural(format!(
            "Graph needs at least 2 nodes, got {}",
            nodes.len()
        )));
    }
    if nodes[0].name != INPUT_NODE {
        return Err(structural(format!(
            "First node must be '{}', got '{}'",
            INPUT_NODE, nodes[0].name
        )));
    }
    if nodes[nodes.len() - 1].name != OUTPUT_NODE {
        return Err(structural(format!(
            "Last node must be '{}', got '{}'",
            OUTPUT_NODE,
            nodes[nodes.len() - 1].name
        )));
    }
    if !nodes[0].inputs.is_empty() {
        return Err(structural("Input node cannot have inputs"));
    }

    let mut positions: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        if !SCALE_LADDER.contains(&node.scale) {
            return Err(structural(format!(
                "Node '{}' has scale {} outside {:?}",
                node.name, node.scale, SCALE_LADDER
            )));
        }

        for inp in &node.inputs {
            match positions.get(inp.as_str()) {
                Some(&src) if src < idx => {}
                _ => {
                    return Err(structural(format!(
                        "Node '{}' references '{}' which is not an earlier node",
                        node.name, inp
                    )))
                }
            }
        }

        if positions.insert(node.name.as_str(), idx).is_some() {
            return Err(structural(format!("Duplicate node name '{}'", node.name)));
        }
    }

    Ok(())
}
