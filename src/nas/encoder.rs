//! Graph encoder for surrogate models
//!
//! Turns an architecture into a node-feature matrix and an edge list suitable
//! for a graph neural network predictor.

use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::architecture::SegmentationArchitecture;
use super::graph::SCALE_LADDER;
use super::operations::OperatorRegistry;
use crate::error::{Result, SegNasError};

/// Channel widths are divided by this before encoding
const CHANNEL_NORM: f32 = 64.0;

/// Feature groups that can make up a node's feature row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderFeature {
    /// One-hot scale against the scale ladder
    Scale,
    /// Normalized base and delta channels
    Channels,
    /// One-hot operator against the registry
    Op,
}

impl EncoderFeature {
    /// Every feature group
    pub fn all() -> Vec<Self> {
        vec![Self::Scale, Self::Channels, Self::Op]
    }
}

/// Numeric graph representation of one architecture
#[derive(Debug, Clone, PartialEq)]
pub struct ArchRepr {
    /// Node features, one row per node in graph order
    pub x: Array2<f32>,
    /// `(predecessor, successor)` index pairs, one per input reference
    pub edges: Vec<(usize, usize)>,
    /// Content hash of the encoded architecture
    pub archid: String,
}

impl ArchRepr {
    /// Edge list as a `(2, E)` COO matrix
    pub fn edge_index(&self) -> Array2<i64> {
        let mut index = Array2::zeros((2, self.edges.len()));
        for (col, &(src, dst)) in self.edges.iter().enumerate() {
            index[[0, col]] = src as i64;
            index[[1, col]] = dst as i64;
        }
        index
    }

    /// Number of encoded nodes
    pub fn num_nodes(&self) -> usize {
        self.x.nrows()
    }
}

/// Encodes architectures with a fixed operator set and feature selection
#[derive(Debug, Clone)]
pub struct ArchEncoder {
    features: Vec<EncoderFeature>,
    operators: OperatorRegistry,
}

impl ArchEncoder {
    /// Create an encoder
    pub fn new(features: Vec<EncoderFeature>, operators: OperatorRegistry) -> Self {
        Self {
            features,
            operators,
        }
    }

    fn enabled(&self, feature: EncoderFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Width of each feature row
    pub fn num_features(&self) -> usize {
        let mut cols = 0;
        if self.enabled(EncoderFeature::Scale) {
            cols += SCALE_LADDER.len();
        }
        if self.enabled(EncoderFeature::Op) {
            cols += self.operators.len();
        }
        if self.enabled(EncoderFeature::Channels) {
            cols += 2;
        }
        cols
    }

    /// Encode `arch`; column groups are laid out scale, op, channels.
    ///
    /// Each enabled group is built as its own `(nodes, width)` block and the
    /// blocks are concatenated column-wise; blocks disagreeing on the row
    /// count surface as `ShapeError`.
    pub fn encode(&self, arch: &SegmentationArchitecture) -> Result<ArchRepr> {
        let graph = arch.graph();
        let num_nodes = graph.len();

        let mut blocks: Vec<Array2<f32>> = Vec::with_capacity(3);
        if self.enabled(EncoderFeature::Scale) {
            blocks.push(one_hot_block(
                graph.iter().map(|n| SCALE_LADDER.iter().position(|&s| s == n.scale)),
                SCALE_LADDER.len(),
            )?);
        }
        if self.enabled(EncoderFeature::Op) {
            blocks.push(one_hot_block(
                graph.iter().map(|n| self.operators.index_of(n.op)),
                self.operators.len(),
            )?);
        }
        if self.enabled(EncoderFeature::Channels) {
            blocks.push(channel_block(num_nodes, arch)?);
        }

        if blocks.iter().map(|b| b.ncols()).sum::<usize>() == 0 {
            return Err(SegNasError::EncodingError(
                "Enabled feature groups produce zero columns".to_string(),
            ));
        }
        let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
        let x = concatenate(Axis(1), &views)?;

        let index: HashMap<&str, usize> = graph
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.as_str(), i))
            .collect();

        let mut edges = Vec::new();
        for (dst, node) in graph.iter().enumerate() {
            for inp in &node.inputs {
                let src = index.get(inp.as_str()).copied().ok_or_else(|| {
                    SegNasError::EncodingError(format!(
                        "Node '{}' references unknown node '{}'",
                        node.name, inp
                    ))
                })?;
                edges.push((src, dst));
            }
        }

        Ok(ArchRepr {
            x,
            edges,
            archid: arch.archid().to_string(),
        })
    }
}

/// One row per item with a single 1.0 at the given column.
fn one_hot_block<I>(positions: I, width: usize) -> Result<Array2<f32>>
where
    I: ExactSizeIterator<Item = Option<usize>>,
{
    let rows = positions.len();
    let mut data = vec![0.0f32; rows * width];
    for (row, pos) in positions.enumerate() {
        if let Some(col) = pos {
            data[row * width + col] = 1.0;
        }
    }
    Ok(Array2::from_shape_vec((rows, width), data)?)
}

fn channel_block(num_nodes: usize, arch: &SegmentationArchitecture) -> Result<Array2<f32>> {
    let channels = arch.channels();
    let row = [
        channels.base_channels as f32 / CHANNEL_NORM,
        channels.delta_channels as f32 / CHANNEL_NORM,
    ];
    let data: Vec<f32> = row.iter().copied().cycle().take(num_nodes * 2).collect();
    Ok(Array2::from_shape_vec((num_nodes, 2), data)?)
}
