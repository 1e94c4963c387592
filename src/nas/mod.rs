//! Segmentation Architecture Search Space
//!
//! Discrete search space over segmentation network topologies:
//! - DAG representation with content hashing
//! - Random sampling under MAC bounds
//! - Mutation (neighbor generation)
//! - Crossover of two parents at same-scale pivots
//! - Graph encoding for surrogate predictors

mod architecture;
mod compiler;
mod config;
mod crossover;
mod domain;
mod encoder;
mod evaluator;
mod graph;
mod operations;
mod rename;
mod search_space;

pub use architecture::{
    compute_archid, ArchMetadata, ArchWithMetadata, ArchitectureFile, SegmentationArchitecture,
};
pub use compiler::{ModelCompiler, SamplingParams, SegmentationCompiler};
pub use config::SearchSpaceConfig;
pub use domain::{discrete_range, random_neighbor};
pub use encoder::{ArchEncoder, ArchRepr, EncoderFeature};
pub use evaluator::{CostEstimator, MacEstimator};
pub use graph::{ArchGraph, ChannelConfig, Node, INPUT_NODE, OUTPUT_NODE, SCALE_LADDER};
pub use operations::{parse_op_subset, OperationKind, OperationType, OperatorRegistry};
pub use rename::{rename_dag_node_list, RenameOptions};
pub use search_space::SegmentationSearchSpace;
