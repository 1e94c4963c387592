//! Operator Registry
//!
//! The closed set of layer operators a segmentation node may use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SegNasError};

/// Types of operations in the search space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationType {
    /// 3x3 convolution
    #[serde(rename = "conv3x3")]
    Conv3x3,
    /// 5x5 convolution
    #[serde(rename = "conv5x5")]
    Conv5x5,
    /// 7x7 convolution
    #[serde(rename = "conv7x7")]
    Conv7x7,
    /// Inverted bottleneck, 3x3 depthwise, expansion 1
    #[serde(rename = "mbconv3x3_e1")]
    MbConv3x3E1,
    /// Inverted bottleneck, 3x3 depthwise, expansion 2
    #[serde(rename = "mbconv3x3_e2")]
    MbConv3x3E2,
    /// Inverted bottleneck, 5x5 depthwise, expansion 1
    #[serde(rename = "mbconv5x5_e1")]
    MbConv5x5E1,
    /// Inverted bottleneck, 5x5 depthwise, expansion 2
    #[serde(rename = "mbconv5x5_e2")]
    MbConv5x5E2,
    /// Depthwise-separable 3x3 convolution
    #[serde(rename = "sep_conv3x3")]
    SepConv3x3,
    /// Depthwise-separable 5x5 convolution
    #[serde(rename = "sep_conv5x5")]
    SepConv5x5,
    /// Depthwise-separable 7x7 convolution
    #[serde(rename = "sep_conv7x7")]
    SepConv7x7,
}

/// How an operator mixes channels, used for cost estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Dense kxk convolution
    Plain,
    /// Depthwise kxk followed by pointwise 1x1
    Separable,
    /// Pointwise expand, depthwise kxk, pointwise project
    InvertedBottleneck,
}

impl OperationType {
    /// Every operator, in registry order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Conv3x3,
            Self::Conv5x5,
            Self::Conv7x7,
            Self::MbConv3x3E1,
            Self::MbConv3x3E2,
            Self::MbConv5x5E1,
            Self::MbConv5x5E2,
            Self::SepConv3x3,
            Self::SepConv5x5,
            Self::SepConv7x7,
        ]
    }

    /// Canonical name as used in serialized graphs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conv3x3 => "conv3x3",
            Self::Conv5x5 => "conv5x5",
            Self::Conv7x7 => "conv7x7",
            Self::MbConv3x3E1 => "mbconv3x3_e1",
            Self::MbConv3x3E2 => "mbconv3x3_e2",
            Self::MbConv5x5E1 => "mbconv5x5_e1",
            Self::MbConv5x5E2 => "mbconv5x5_e2",
            Self::SepConv3x3 => "sep_conv3x3",
            Self::SepConv5x5 => "sep_conv5x5",
            Self::SepConv7x7 => "sep_conv7x7",
        }
    }

    /// Spatial kernel size
    pub fn kernel_size(&self) -> usize {
        match self {
            Self::Conv3x3 | Self::MbConv3x3E1 | Self::MbConv3x3E2 | Self::SepConv3x3 => 3,
            Self::Conv5x5 | Self::MbConv5x5E1 | Self::MbConv5x5E2 | Self::SepConv5x5 => 5,
            Self::Conv7x7 | Self::SepConv7x7 => 7,
        }
    }

    /// Channel-mixing structure
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Conv3x3 | Self::Conv5x5 | Self::Conv7x7 => OperationKind::Plain,
            Self::SepConv3x3 | Self::SepConv5x5 | Self::SepConv7x7 => OperationKind::Separable,
            _ => OperationKind::InvertedBottleneck,
        }
    }

    /// Expansion factor of inverted bottlenecks (1 for everything else)
    pub fn expansion(&self) -> usize {
        match self {
            Self::MbConv3x3E2 | Self::MbConv5x5E2 => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SegNasError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| SegNasError::ConfigError(format!("Unknown operation: '{}'", s)))
    }
}

/// Parse a comma-separated operator list such as `"conv3x3,sep_conv5x5"`
pub fn parse_op_subset(s: &str) -> Result<Vec<OperationType>> {
    s.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(OperationType::from_str)
        .collect()
}

/// Read-only table of the operators available to a search space.
///
/// Registry order defines the one-hot column order used by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRegistry {
    operations: Vec<OperationType>,
}

impl OperatorRegistry {
    /// Registry holding every known operator
    pub fn full() -> Self {
        Self {
            operations: OperationType::all(),
        }
    }

    /// Keep only operators in `subset`, preserving registry order.
    ///
    /// An empty subset keeps everything; a subset that filters the registry
    /// down to nothing is a configuration error.
    pub fn filtered(&self, subset: &[OperationType]) -> Result<Self> {
        let operations: Vec<OperationType> = if subset.is_empty() {
            self.operations.clone()
        } else {
            self.operations
                .iter()
                .copied()
                .filter(|op| subset.contains(op))
                .collect()
        };

        if operations.is_empty() {
            return Err(SegNasError::ConfigError(
                "Operator subset is empty after filtering".to_string(),
            ));
        }

        Ok(Self { operations })
    }

    /// Operators in registry order
    pub fn operations(&self) -> &[OperationType] {
        &self.operations
    }

    /// Number of operators
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Column index of `op` in one-hot encodings
    pub fn index_of(&self, op: OperationType) -> Option<usize> {
        self.operations.iter().position(|&o| o == op)
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        Self::full()
    }
}
