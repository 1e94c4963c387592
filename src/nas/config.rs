//! Search space configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::domain::discrete_range;
use super::encoder::EncoderFeature;
use super::operations::{parse_op_subset, OperationType};
use crate::error::{Result, SegNasError};

/// Bounds and domains of the segmentation search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpaceConfig {
    /// Dataset the search targets
    pub dataset_name: String,

    /// Feature groups produced by the encoder
    pub encoder_features: Vec<EncoderFeature>,

    /// Exclusive lower MAC bound
    pub min_mac: f64,

    /// Exclusive upper MAC bound
    pub max_mac: f64,

    /// Minimum number of interior layers
    pub min_layers: usize,

    /// Maximum number of interior layers
    pub max_layers: usize,

    /// Largest scale a node may reach (2, 4, 8 or 16)
    pub max_downsample_factor: u32,

    /// Whether sampled graphs may have skip connections
    pub skip_connections: bool,

    /// How far back a skip connection may reach
    pub max_skip_connection_length: usize,

    /// Largest scale change between consecutive nodes, in ladder steps
    pub max_scale_delta: u32,

    /// Upper end of the post-upsample layer domain `1..=max`
    pub max_post_upsample_layers: u32,

    pub min_base_channels: u32,
    pub max_base_channels: u32,
    pub base_channels_binwidth: u32,

    pub min_delta_channels: u32,
    pub max_delta_channels: u32,
    pub delta_channels_binwidth: u32,

    /// Relative weight of downsampling moves when sampling scales
    pub downsample_prob_ratio: f64,

    /// Operators to keep; empty keeps every registered operator
    pub op_subset: Vec<OperationType>,

    /// Geometric channel growth
    pub mult_delta: bool,

    /// Input image side length
    pub img_size: u32,
}

impl Default for SearchSpaceConfig {
    fn default() -> Self {
        Self {
            dataset_name: "default".to_string(),
            encoder_features: EncoderFeature::all(),
            min_mac: 0.0,
            max_mac: f64::MAX,
            min_layers: 1,
            max_layers: 12,
            max_downsample_factor: 16,
            skip_connections: true,
            max_skip_connection_length: 3,
            max_scale_delta: 1,
            max_post_upsample_layers: 3,
            min_base_channels: 8,
            max_base_channels: 48,
            base_channels_binwidth: 8,
            min_delta_channels: 8,
            max_delta_channels: 48,
            delta_channels_binwidth: 8,
            downsample_prob_ratio: 1.5,
            op_subset: Vec::new(),
            mult_delta: false,
            img_size: 256,
        }
    }
}

impl SearchSpaceConfig {
    /// Create a configuration for `dataset_name` with default bounds
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config)
    }

    /// Builder method to set MAC bounds
    pub fn with_mac_bounds(mut self, min_mac: f64, max_mac: f64) -> Self {
        self.min_mac = min_mac;
        self.max_mac = max_mac;
        self
    }

    /// Builder method to set layer bounds
    pub fn with_layers(mut self, min_layers: usize, max_layers: usize) -> Self {
        self.min_layers = min_layers;
        self.max_layers = max_layers;
        self
    }

    /// Builder method to set the operator subset
    pub fn with_op_subset(mut self, ops: Vec<OperationType>) -> Self {
        self.op_subset = ops;
        self
    }

    /// Builder method to set the operator subset from `"conv3x3,sep_conv5x5"`
    pub fn with_op_subset_str(mut self, ops: &str) -> Result<Self> {
        self.op_subset = parse_op_subset(ops)?;
        Ok(self)
    }

    /// Builder method to set encoder features
    pub fn with_encoder_features(mut self, features: Vec<EncoderFeature>) -> Self {
        self.encoder_features = features;
        self
    }

    /// Builder method to set base channel domain
    pub fn with_base_channels(mut self, min: u32, max: u32, binwidth: u32) -> Self {
        self.min_base_channels = min;
        self.max_base_channels = max;
        self.base_channels_binwidth = binwidth;
        self
    }

    /// Builder method to set delta channel domain
    pub fn with_delta_channels(mut self, min: u32, max: u32, binwidth: u32) -> Self {
        self.min_delta_channels = min;
        self.max_delta_channels = max;
        self.delta_channels_binwidth = binwidth;
        self
    }

    /// Builder method to set image size
    pub fn with_img_size(mut self, img_size: u32) -> Self {
        self.img_size = img_size;
        self
    }

    /// Builder method to set maximum downsample factor
    pub fn with_max_downsample_factor(mut self, factor: u32) -> Self {
        self.max_downsample_factor = factor;
        self
    }

    /// Base channel domain
    pub fn base_channels_list(&self) -> Vec<u32> {
        discrete_range(
            self.min_base_channels,
            self.max_base_channels,
            self.base_channels_binwidth,
        )
    }

    /// Delta channel domain
    pub fn delta_channels_list(&self) -> Vec<u32> {
        discrete_range(
            self.min_delta_channels,
            self.max_delta_channels,
            self.delta_channels_binwidth,
        )
    }

    /// Post-upsample layer domain
    pub fn post_upsample_layers_list(&self) -> Vec<u32> {
        (1..=self.max_post_upsample_layers).collect()
    }

    /// Check every bound, failing on the first violation
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(SegNasError::ConfigError(msg));

        if self.dataset_name.is_empty() {
            return fail("dataset_name must not be empty".to_string());
        }
        if !(self.min_mac <= self.max_mac) {
            return fail(format!(
                "min_mac ({}) must be <= max_mac ({})",
                self.min_mac, self.max_mac
            ));
        }
        if self.min_layers > self.max_layers {
            return fail(format!(
                "min_layers ({}) must be <= max_layers ({})",
                self.min_layers, self.max_layers
            ));
        }
        if ![2, 4, 8, 16].contains(&self.max_downsample_factor) {
            return fail(format!(
                "max_downsample_factor must be one of 2, 4, 8, 16, got {}",
                self.max_downsample_factor
            ));
        }
        if self.max_skip_connection_length == 0 {
            return fail("max_skip_connection_length must be > 0".to_string());
        }
        if ![1, 2, 3].contains(&self.max_scale_delta) {
            return fail(format!(
                "max_scale_delta must be one of 1, 2, 3, got {}",
                self.max_scale_delta
            ));
        }
        if !(1..5).contains(&self.max_post_upsample_layers) {
            return fail(format!(
                "max_post_upsample_layers must be in 1..=4, got {}",
                self.max_post_upsample_layers
            ));
        }
        if self.base_channels_binwidth == 0 || self.delta_channels_binwidth == 0 {
            return fail("channel bin widths must be > 0".to_string());
        }
        if self.min_base_channels > self.max_base_channels {
            return fail(format!(
                "min_base_channels ({}) must be <= max_base_channels ({})",
                self.min_base_channels, self.max_base_channels
            ));
        }
        if self.base_channels_list().len() <= 1 {
            return fail("base channel domain needs more than one value".to_string());
        }
        if self.min_delta_channels > self.max_delta_channels {
            return fail(format!(
                "min_delta_channels ({}) must be <= max_delta_channels ({})",
                self.min_delta_channels, self.max_delta_channels
            ));
        }
        if self.delta_channels_list().is_empty() {
            return fail("delta channel domain is empty".to_string());
        }
        if !(self.downsample_prob_ratio > 0.0) {
            return fail(format!(
                "downsample_prob_ratio must be > 0, got {}",
                self.downsample_prob_ratio
            ));
        }
        if self.img_size == 0 {
            return fail("img_size must be > 0".to_string());
        }

        Ok(())
    }
}
