//! Model compiler boundary
//!
//! The search space never instantiates trainable layers itself. It asks a
//! [`ModelCompiler`] to construct candidate architectures, to check that they
//! are realizable with one forward shape pass, and to sample fresh random
//! graphs. [`SegmentationCompiler`] is the built-in implementation that
//! propagates shapes without allocating tensors.

use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tracing::debug;

use super::architecture::SegmentationArchitecture;
use super::graph::{ArchGraph, ChannelConfig, Node, INPUT_NODE, OUTPUT_NODE, SCALE_LADDER};
use super::operations::OperationType;
use crate::error::{Result, SegNasError};

/// Everything the compiler needs to sample a random architecture
#[derive(Debug, Clone)]
pub struct SamplingParams<'a> {
    /// Number of interior layers
    pub num_layers: usize,
    /// Largest allowed scale
    pub max_downsample_factor: u32,
    /// Allow inputs other than the previous node
    pub skip_connections: bool,
    /// How many positions back a skip connection may reach
    pub max_skip_connection_length: usize,
    /// Largest scale change, in ladder steps, between consecutive nodes
    pub max_scale_delta: u32,
    /// Weight of downsampling moves relative to the others
    pub downsample_prob_ratio: f64,
    /// Operators to draw from
    pub operations: &'a [OperationType],
    /// Base channel domain
    pub base_channels: &'a [u32],
    /// Delta channel domain
    pub delta_channels: &'a [u32],
    /// Post-upsample layer domain
    pub post_upsample_layers: &'a [u32],
    /// Geometric channel growth
    pub mult_delta: bool,
    /// Input image side length
    pub img_size: u32,
}

/// Builds and validates concrete models from architecture graphs
pub trait ModelCompiler {
    /// Instantiate an architecture from a node list.
    fn construct(
        &self,
        nodes: Vec<Node>,
        channels: ChannelConfig,
        post_upsample_layers: u32,
        img_size: u32,
    ) -> Result<SegmentationArchitecture> {
        SegmentationArchitecture::new(ArchGraph::new(nodes)?, channels, post_upsample_layers, img_size)
    }

    /// Run one forward pass over `input_shape` and return the output shape.
    fn validate_forward(
        &self,
        arch: &SegmentationArchitecture,
        input_shape: [usize; 4],
    ) -> Result<[usize; 4]>;

    /// Draw a random architecture within `params`.
    fn sample_architecture(
        &self,
        params: &SamplingParams<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<SegmentationArchitecture>;
}

/// Shape-propagating compiler for segmentation DAGs
#[derive(Debug, Clone)]
pub struct SegmentationCompiler {
    num_classes: usize,
}

impl SegmentationCompiler {
    /// Create a compiler producing `num_classes` output channels
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn next_level<R: Rng + ?Sized>(
        &self,
        level: u32,
        max_level: u32,
        params: &SamplingParams<'_>,
        rng: &mut R,
    ) -> Result<u32> {
        let lo = level.saturating_sub(params.max_scale_delta);
        let hi = (level + params.max_scale_delta).min(max_level);

        let candidates: Vec<u32> = (lo..=hi).collect();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&l| if l > level { params.downsample_prob_ratio } else { 1.0 })
            .collect();

        let dist = WeightedIndex::new(&weights)
            .map_err(|e| SegNasError::StructuralError(format!("Invalid scale weights: {}", e)))?;
        Ok(candidates[dist.sample(rng)])
    }
}

impl Default for SegmentationCompiler {
    fn default() -> Self {
        Self::new(19)
    }
}

fn pick<T: Copy, R: Rng + ?Sized>(values: &[T], what: &str, rng: &mut R) -> Result<T> {
    values
        .choose(rng)
        .copied()
        .ok_or_else(|| SegNasError::InvalidInput(format!("Empty {} domain", what)))
}

impl ModelCompiler for SegmentationCompiler {
    fn validate_forward(
        &self,
        arch: &SegmentationArchitecture,
        input_shape: [usize; 4],
    ) -> Result<[usize; 4]> {
        let [batch, in_channels, height, width] = input_shape;
        let side = arch.img_size() as usize;

        if in_channels != 3 || height != side || width != side {
            return Err(SegNasError::ShapeError {
                expected: format!("[N, 3, {}, {}]", side, side),
                actual: format!("{:?}", input_shape),
            });
        }
        if arch.post_upsample_layers() == 0 {
            return Err(SegNasError::StructuralError(
                "At least one post-upsample layer is required".to_string(),
            ));
        }

        for (idx, node) in arch.graph().iter().enumerate() {
            if side % node.scale as usize != 0 {
                return Err(SegNasError::StructuralError(format!(
                    "Image size {} is not divisible by scale {} of node '{}'",
                    side, node.scale, node.name
                )));
            }
            if idx > 0 && node.inputs.is_empty() {
                return Err(SegNasError::StructuralError(format!(
                    "Node '{}' has no inputs",
                    node.name
                )));
            }
            if arch.channels().channels_at_scale(node.scale) == 0 {
                return Err(SegNasError::StructuralError(format!(
                    "Node '{}' resolves to zero channels",
                    node.name
                )));
            }
        }

        let output_shape = [batch, self.num_classes, height, width];
        debug!(archid = %arch.archid(), ?output_shape, "Forward shape check passed");
        Ok(output_shape)
    }

    fn sample_architecture(
        &self,
        params: &SamplingParams<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<SegmentationArchitecture> {
        let max_factor = params.max_downsample_factor.max(1);
        if !SCALE_LADDER.contains(&max_factor) {
            return Err(SegNasError::InvalidInput(format!(
                "Downsample factor {} is not on the scale ladder",
                max_factor
            )));
        }
        let max_level = max_factor.trailing_zeros();

        let total = params.num_layers + 2;
        let mut nodes: Vec<Node> = Vec::with_capacity(total);
        nodes.push(Node::new(INPUT_NODE, pick(params.operations, "operation", rng)?, 1));

        let mut level = 0;
        for idx in 1..total {
            level = self.next_level(level, max_level, params, rng)?;

            let name = if idx + 1 == total {
                OUTPUT_NODE.to_string()
            } else {
                format!("layer_{}", idx)
            };

            let mut inputs = vec![nodes[idx - 1].name.clone()];
            if params.skip_connections && idx >= 2 && rng.gen_bool(0.5) {
                let earliest = idx.saturating_sub(params.max_skip_connection_length);
                let skips: Vec<usize> = (earliest..idx - 1).collect();
                if let Some(&src) = skips.choose(rng) {
                    inputs.push(nodes[src].name.clone());
                }
            }

            nodes.push(
                Node::new(name, pick(params.operations, "operation", rng)?, 1 << level)
                    .with_inputs(inputs),
            );
        }

        let channels = ChannelConfig::new(
            pick(params.base_channels, "base channel", rng)?,
            pick(params.delta_channels, "delta channel", rng)?,
            params.mult_delta,
        );
        let post_upsample_layers = pick(params.post_upsample_layers, "post-upsample", rng)?;

        self.construct(nodes, channels, post_upsample_layers, params.img_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    const OPS: [OperationType; 2] = [OperationType::Conv3x3, OperationType::SepConv5x5];

    fn params(num_layers: usize) -> SamplingParams<'static> {
        SamplingParams {
            num_layers,
            max_downsample_factor: 16,
            skip_connections: true,
            max_skip_connection_length: 3,
            max_scale_delta: 1,
            downsample_prob_ratio: 1.5,
            operations: &OPS,
            base_channels: &[8, 16, 24],
            delta_channels: &[8, 16],
            post_upsample_layers: &[1, 2, 3],
            mult_delta: false,
            img_size: 128,
        }
    }

    #[test]
    fn test_sampled_graph_shape() {
        let compiler = SegmentationCompiler::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        for n in 1..8 {
            let arch = compiler.sample_architecture(&params(n), &mut rng).unwrap();
            let graph = arch.graph();
            assert_eq!(graph.len(), n + 2);
            assert_eq!(graph.nodes()[0].name, INPUT_NODE);
            assert_eq!(graph.nodes()[n + 1].name, OUTPUT_NODE);
            assert!(graph.iter().all(|node| node.scale <= 16));
            assert!(graph.iter().all(|node| OPS.contains(&node.op)));
        }
    }

    #[test]
    fn test_scale_walk_respects_delta() {
        let compiler = SegmentationCompiler::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let mut p = params(10);
        p.max_downsample_factor = 4;

        for _ in 0..20 {
            let arch = compiler.sample_architecture(&p, &mut rng).unwrap();
            let nodes = arch.graph().nodes();
            for pair in nodes.windows(2) {
                let a = pair[0].scale.trailing_zeros() as i32;
                let b = pair[1].scale.trailing_zeros() as i32;
                assert!((a - b).abs() <= 1);
                assert!(pair[1].scale <= 4);
            }
        }
    }

    #[test]
    fn test_skip_connections_bounded() {
        let compiler = SegmentationCompiler::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let p = params(12);

        for _ in 0..20 {
            let arch = compiler.sample_architecture(&p, &mut rng).unwrap();
            let graph = arch.graph();
            for (idx, node) in graph.iter().enumerate().skip(1) {
                assert!(!node.inputs.is_empty() && node.inputs.len() <= 2);
                for inp in &node.inputs {
                    let src = graph.position(inp).unwrap();
                    assert!(idx - src <= 3);
                }
            }
        }
    }

    #[test]
    fn test_sampled_architecture_validates() {
        let compiler = SegmentationCompiler::new(7);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let arch = compiler.sample_architecture(&params(4), &mut rng).unwrap();

        let out = compiler.validate_forward(&arch, arch.input_shape()).unwrap();
        assert_eq!(out, [1, 7, 128, 128]);
    }

    #[test]
    fn test_validate_rejects_bad_input_shape() {
        let compiler = SegmentationCompiler::default();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let arch = compiler.sample_architecture(&params(2), &mut rng).unwrap();

        assert!(matches!(
            compiler.validate_forward(&arch, [1, 1, 128, 128]),
            Err(SegNasError::ShapeError { .. })
        ));
        assert!(compiler.validate_forward(&arch, [1, 3, 64, 64]).is_err());
    }

    #[test]
    fn test_validate_rejects_orphan_node() {
        let compiler = SegmentationCompiler::default();
        let nodes = vec![
            Node::new("input", OperationType::Conv3x3, 1),
            Node::new("layer_1", OperationType::Conv3x3, 2),
            Node::new("output", OperationType::Conv3x3, 1).with_inputs(["layer_1"]),
        ];
        let arch = compiler
            .construct(nodes, ChannelConfig::new(8, 8, false), 1, 64)
            .unwrap();

        assert!(matches!(
            compiler.validate_forward(&arch, arch.input_shape()),
            Err(SegNasError::StructuralError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_indivisible_image() {
        let compiler = SegmentationCompiler::default();
        let nodes = vec![
            Node::new("input", OperationType::Conv3x3, 1),
            Node::new("layer_1", OperationType::Conv3x3, 16).with_inputs(["input"]),
            Node::new("output", OperationType::Conv3x3, 1).with_inputs(["layer_1"]),
        ];
        let arch = compiler
            .construct(nodes, ChannelConfig::new(8, 8, false), 1, 40)
            .unwrap();

        assert!(compiler.validate_forward(&arch, arch.input_shape()).is_err());
    }
}
