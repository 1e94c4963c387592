//! segnas - Discrete search space for segmentation architecture search
//!
//! Represents segmentation networks as DAGs and provides the stochastic
//! operators an evolutionary search loop needs:
//! - Random sampling within resource (MAC) bounds
//! - Neighbor generation by mutation
//! - Crossover of two parents
//! - Numeric graph encoding for surrogate predictors
//!
//! # Modules
//!
//! - [`nas`] - Graph model, search space operators and encoder
//! - [`cli`] - Command-line interface
//! - [`error`] - Error types

// Core error handling
pub mod error;

// Search space
pub mod nas;

// Command-line interface
pub mod cli;

pub use error::{Result, SegNasError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Result, SegNasError};

    pub use crate::nas::{
        ArchGraph, ArchMetadata, ArchRepr, ArchWithMetadata, ChannelConfig, CostEstimator,
        EncoderFeature, MacEstimator, ModelCompiler, Node, OperationType, OperatorRegistry,
        SearchSpaceConfig, SegmentationArchitecture, SegmentationCompiler,
        SegmentationSearchSpace,
    };
}
