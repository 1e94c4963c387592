//! Compiled architectures and their metadata
//!
//! A [`SegmentationArchitecture`] owns a validated graph plus the channel and
//! post-upsample configuration, and carries its content hash (`archid`).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::graph::{ArchGraph, ChannelConfig, Node, SCALE_LADDER};
use crate::error::{Result, SegNasError};

/// On-disk description of an architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureFile {
    /// Nodes in topological order
    pub graph: Vec<Node>,
    /// Channel configuration
    pub channels_per_scale: ChannelConfig,
    /// Number of layers after the final upsample
    #[serde(default = "default_post_upsample_layers")]
    pub post_upsample_layers: u32,
}

fn default_post_upsample_layers() -> u32 {
    1
}

#[derive(Serialize)]
struct HashContent<'a> {
    graph: &'a [Node],
    channels_per_scale: &'a ChannelConfig,
    post_upsample_layers: u32,
}

/// Content hash of an architecture's structure.
///
/// SHA-256 over the canonical JSON of nodes, channel configuration and
/// post-upsample count. The image size does not take part.
pub fn compute_archid(
    graph: &ArchGraph,
    channels: &ChannelConfig,
    post_upsample_layers: u32,
) -> Result<String> {
    let content = HashContent {
        graph: graph.nodes(),
        channels_per_scale: channels,
        post_upsample_layers,
    };
    let bytes = serde_json::to_vec(&content)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// A segmentation architecture ready for validation and measurement
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationArchitecture {
    graph: ArchGraph,
    channels: ChannelConfig,
    post_upsample_layers: u32,
    img_size: u32,
    archid: String,
}

impl SegmentationArchitecture {
    /// Build an architecture from an already-validated graph
    pub fn new(
        graph: ArchGraph,
        channels: ChannelConfig,
        post_upsample_layers: u32,
        img_size: u32,
    ) -> Result<Self> {
        if img_size == 0 {
            return Err(SegNasError::StructuralError(
                "Image size must be positive".to_string(),
            ));
        }
        let archid = compute_archid(&graph, &channels, post_upsample_layers)?;

        Ok(Self {
            graph,
            channels,
            post_upsample_layers,
            img_size,
            archid,
        })
    }

    /// Build an architecture from a raw node list
    pub fn from_nodes(
        nodes: Vec<Node>,
        channels: ChannelConfig,
        post_upsample_layers: u32,
        img_size: u32,
    ) -> Result<Self> {
        Self::new(ArchGraph::new(nodes)?, channels, post_upsample_layers, img_size)
    }

    /// Load from a JSON architecture file
    pub fn from_file(path: impl AsRef<Path>, img_size: u32) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let file: ArchitectureFile = serde_json::from_str(&contents)?;
        Self::from_nodes(
            file.graph,
            file.channels_per_scale,
            file.post_upsample_layers,
            img_size,
        )
    }

    /// Write as a JSON architecture file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.to_file())?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Serializable form
    pub fn to_file(&self) -> ArchitectureFile {
        ArchitectureFile {
            graph: self.graph.nodes().to_vec(),
            channels_per_scale: self.channels,
            post_upsample_layers: self.post_upsample_layers,
        }
    }

    /// Content hash
    pub fn archid(&self) -> &str {
        &self.archid
    }

    /// Node graph
    pub fn graph(&self) -> &ArchGraph {
        &self.graph
    }

    /// Channel configuration
    pub fn channels(&self) -> &ChannelConfig {
        &self.channels
    }

    /// Number of layers after the final upsample
    pub fn post_upsample_layers(&self) -> u32 {
        self.post_upsample_layers
    }

    /// Input image side length
    pub fn img_size(&self) -> u32 {
        self.img_size
    }

    /// Channel width for each scale on the ladder
    pub fn channels_per_scale(&self) -> BTreeMap<u32, u32> {
        SCALE_LADDER
            .iter()
            .map(|&s| (s, self.channels.channels_at_scale(s)))
            .collect()
    }

    /// Canonical input tensor shape `[1, 3, img, img]`
    pub fn input_shape(&self) -> [usize; 4] {
        let side = self.img_size as usize;
        [1, 3, side, side]
    }
}

/// Provenance record attached to every produced architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchMetadata {
    /// Dataset the search space targets
    pub dataset_name: String,
    /// Content hash of the architecture
    pub archid: String,
    /// Parent archid for mutated architectures
    pub parent: Option<String>,
    /// `left,right` parent archids for crossover children
    pub parents: Option<String>,
    /// Resource estimate (MACs) if measured
    pub macs: Option<f64>,
}

impl ArchMetadata {
    /// Metadata for a root architecture
    pub fn new(dataset_name: impl Into<String>, archid: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            archid: archid.into(),
            parent: None,
            parents: None,
            macs: None,
        }
    }

    /// Set single-parent lineage
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Set dual-parent lineage
    pub fn with_parents(mut self, left: &str, right: &str) -> Self {
        self.parents = Some(format!("{},{}", left, right));
        self
    }

    /// Set resource estimate
    pub fn with_macs(mut self, macs: f64) -> Self {
        self.macs = Some(macs);
        self
    }
}

/// An architecture paired with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ArchWithMetadata {
    /// The architecture
    pub arch: SegmentationArchitecture,
    /// Its provenance record
    pub metadata: ArchMetadata,
}

impl ArchWithMetadata {
    /// Pair an architecture with metadata
    pub fn new(arch: SegmentationArchitecture, metadata: ArchMetadata) -> Self {
        Self { arch, metadata }
    }

    /// Content hash of the architecture
    pub fn archid(&self) -> &str {
        self.arch.archid()
    }
}
