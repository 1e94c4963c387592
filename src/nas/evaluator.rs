//! Architecture cost estimation
//!
//! Resource measurement is a single capability, [`CostEstimator`]. Backends are
//! swappable: the analytical [`MacEstimator`], a hardware profiler, or any
//! closure with the right signature.

use serde::{Deserialize, Serialize};

use super::architecture::SegmentationArchitecture;
use super::operations::OperationKind;
use crate::error::{Result, SegNasError};

/// Estimates the resource cost of an architecture
pub trait CostEstimator {
    /// Scalar cost for one forward pass over `input_shape`
    fn estimate_cost(
        &self,
        arch: &SegmentationArchitecture,
        input_shape: [usize; 4],
    ) -> Result<f64>;
}

impl<F> CostEstimator for F
where
    F: Fn(&SegmentationArchitecture, [usize; 4]) -> Result<f64>,
{
    fn estimate_cost(
        &self,
        arch: &SegmentationArchitecture,
        input_shape: [usize; 4],
    ) -> Result<f64> {
        self(arch, input_shape)
    }
}

/// Analytical multiply-accumulate counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacEstimator {
    /// Output classes of the final 1x1 classifier
    pub num_classes: usize,
    /// Channels of the input image
    pub in_channels: usize,
    /// Kernel size of the stem and post-upsample convolutions
    pub head_kernel: usize,
}

impl Default for MacEstimator {
    fn default() -> Self {
        Self {
            num_classes: 19,
            in_channels: 3,
            head_kernel: 3,
        }
    }
}

impl MacEstimator {
    /// Create an estimator for `num_classes` outputs
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            ..Self::default()
        }
    }

    /// MACs of one operator at spatial size `hw` with `c` channels in and out
    fn op_macs(kind: OperationKind, kernel: usize, expansion: usize, c: f64, hw: f64) -> f64 {
        let k2 = (kernel * kernel) as f64;
        let e = expansion as f64;
        let per_pixel = match kind {
            OperationKind::Plain => k2 * c * c,
            OperationKind::Separable => k2 * c + c * c,
            OperationKind::InvertedBottleneck => c * e * c + k2 * c * e + c * e * c,
        };
        per_pixel * hw
    }
}

impl CostEstimator for MacEstimator {
    fn estimate_cost(
        &self,
        arch: &SegmentationArchitecture,
        input_shape: [usize; 4],
    ) -> Result<f64> {
        let [batch, _, height, width] = input_shape;
        if height == 0 || width == 0 {
            return Err(SegNasError::InvalidInput(format!(
                "Cannot estimate cost for input shape {:?}",
                input_shape
            )));
        }

        let graph = arch.graph();
        let channels = arch.channels();
        let spatial = |scale: u32| {
            let s = scale.max(1) as usize;
            ((height / s).max(1) * (width / s).max(1)) as f64
        };
        let width_of = |scale: u32| f64::from(channels.channels_at_scale(scale));
        let head_k2 = (self.head_kernel * self.head_kernel) as f64;

        let mut macs = 0.0;

        for (idx, node) in graph.iter().enumerate() {
            let hw = spatial(node.scale);
            let c = width_of(node.scale);

            if idx == 0 {
                // stem
                macs += hw * head_k2 * self.in_channels as f64 * c;
            } else {
                for inp in &node.inputs {
                    let src_scale = graph.node(inp).map(|n| n.scale).unwrap_or(node.scale);
                    let c_in = width_of(src_scale);
                    if (c_in - c).abs() > f64::EPSILON {
                        macs += hw * c_in * c;
                    }
                }
            }

            macs += Self::op_macs(
                node.op.kind(),
                node.op.kernel_size(),
                node.op.expansion(),
                c,
                hw,
            );
        }

        let out_c = graph
            .nodes()
            .last()
            .map(|n| width_of(n.scale))
            .unwrap_or(0.0);
        let full_res = spatial(1);

        macs += f64::from(arch.post_upsample_layers()) * full_res * head_k2 * out_c * out_c;
        macs += full_res * out_c * self.num_classes as f64;

        Ok(macs * batch.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nas::graph::{ChannelConfig, Node};
    use crate::nas::operations::OperationType;

    fn arch(op: OperationType, base: u32) -> SegmentationArchitecture {
        let nodes = vec![
            Node::new("input", OperationType::Conv3x3, 1),
            Node::new("layer_1", op, 2).with_inputs(["input"]),
            Node::new("output", OperationType::Conv3x3, 1).with_inputs(["layer_1", "input"]),
        ];
        SegmentationArchitecture::from_nodes(nodes, ChannelConfig::new(base, 8, false), 1, 64)
            .unwrap()
    }

    #[test]
    fn test_macs_positive() {
        let estimator = MacEstimator::default();
        let a = arch(OperationType::Conv3x3, 16);
        let macs = estimator.estimate_cost(&a, a.input_shape()).unwrap();
        assert!(macs > 0.0);
    }

    #[test]
    fn test_wider_is_more_expensive() {
        let estimator = MacEstimator::default();
        let narrow = arch(OperationType::Conv3x3, 8);
        let wide = arch(OperationType::Conv3x3, 32);
        let a = estimator.estimate_cost(&narrow, narrow.input_shape()).unwrap();
        let b = estimator.estimate_cost(&wide, wide.input_shape()).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_separable_cheaper_than_plain() {
        let estimator = MacEstimator::default();
        let plain = arch(OperationType::Conv7x7, 32);
        let sep = arch(OperationType::SepConv7x7, 32);
        let a = estimator.estimate_cost(&plain, plain.input_shape()).unwrap();
        let b = estimator.estimate_cost(&sep, sep.input_shape()).unwrap();
        assert!(b < a);
    }

    #[test]
    fn test_batch_scales_linearly() {
        let estimator = MacEstimator::default();
        let a = arch(OperationType::MbConv3x3E2, 16);
        let one = estimator.estimate_cost(&a, [1, 3, 64, 64]).unwrap();
        let four = estimator.estimate_cost(&a, [4, 3, 64, 64]).unwrap();
        assert!((four - 4.0 * one).abs() < 1e-6 * four);
    }

    #[test]
    fn test_closure_estimator() {
        let constant = |_: &SegmentationArchitecture, _: [usize; 4]| -> Result<f64> { Ok(42.0) };
        let a = arch(OperationType::Conv3x3, 16);
        assert_eq!(constant.estimate_cost(&a, a.input_shape()).unwrap(), 42.0);
    }
}
