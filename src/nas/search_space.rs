//! Segmentation Search Space
//!
//! Owns the configured domains and exposes the stochastic operators used by an
//! outer evolutionary loop: random sampling, neighbor generation and (in
//! `crossover.rs`) crossover. Every operator builds fresh candidates from an
//! immutable snapshot of its inputs and discards them on failure.

use rand::seq::{index, SliceRandom};
use rand::Rng;
use std::path::Path;
use tracing::{debug, info, warn};

use super::architecture::{ArchMetadata, ArchWithMetadata, SegmentationArchitecture};
use super::compiler::{ModelCompiler, SamplingParams, SegmentationCompiler};
use super::config::SearchSpaceConfig;
use super::domain::random_neighbor;
use super::encoder::{ArchEncoder, ArchRepr, EncoderFeature};
use super::evaluator::{CostEstimator, MacEstimator};
use super::graph::{ChannelConfig, Node, OUTPUT_NODE};
use super::operations::{OperationType, OperatorRegistry};
use crate::error::{Result, SegNasError};

/// Most new inputs a mutated node receives
const MAX_NEW_INPUTS: usize = 3;

/// Discrete search space over segmentation DAGs
#[derive(Debug, Clone)]
pub struct SegmentationSearchSpace<C = SegmentationCompiler, E = MacEstimator> {
    config: SearchSpaceConfig,
    operators: OperatorRegistry,
    base_channels_list: Vec<u32>,
    delta_channels_list: Vec<u32>,
    post_upsample_layers_list: Vec<u32>,
    encoder: ArchEncoder,
    compiler: C,
    estimator: E,
}

impl SegmentationSearchSpace {
    /// Search space backed by the built-in compiler and MAC estimator
    pub fn with_defaults(config: SearchSpaceConfig) -> Result<Self> {
        Self::new(
            config,
            OperatorRegistry::full(),
            SegmentationCompiler::default(),
            MacEstimator::default(),
        )
    }
}

impl<C: ModelCompiler, E: CostEstimator> SegmentationSearchSpace<C, E> {
    /// Create a search space, validating the configuration.
    ///
    /// `registry` is the compiler's operator table; the configured subset is
    /// applied on top of it.
    pub fn new(
        config: SearchSpaceConfig,
        registry: OperatorRegistry,
        compiler: C,
        estimator: E,
    ) -> Result<Self> {
        config.validate()?;
        let operators = registry.filtered(&config.op_subset)?;

        let features = if config.encoder_features.is_empty() {
            EncoderFeature::all()
        } else {
            config.encoder_features.clone()
        };
        let encoder = ArchEncoder::new(features, operators.clone());

        Ok(Self {
            base_channels_list: config.base_channels_list(),
            delta_channels_list: config.delta_channels_list(),
            post_upsample_layers_list: config.post_upsample_layers_list(),
            operators,
            encoder,
            config,
            compiler,
            estimator,
        })
    }

    /// Configuration
    pub fn config(&self) -> &SearchSpaceConfig {
        &self.config
    }

    /// Operators in use
    pub fn operations(&self) -> &[OperationType] {
        self.operators.operations()
    }

    /// Base channel domain
    pub fn base_channels_list(&self) -> &[u32] {
        &self.base_channels_list
    }

    /// Delta channel domain
    pub fn delta_channels_list(&self) -> &[u32] {
        &self.delta_channels_list
    }

    /// Post-upsample layer domain
    pub fn post_upsample_layers_list(&self) -> &[u32] {
        &self.post_upsample_layers_list
    }

    /// Model compiler
    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    /// Cost estimator
    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    fn within_mac_bounds(&self, macs: f64) -> bool {
        macs > self.config.min_mac && macs < self.config.max_mac
    }

    /// Reject architectures with a node deeper than `max_downsample_factor`
    pub(super) fn check_scales(&self, arch: &SegmentationArchitecture) -> Result<()> {
        let max_factor = self.config.max_downsample_factor;
        match arch.graph().iter().find(|n| n.scale > max_factor) {
            Some(node) => Err(SegNasError::StructuralError(format!(
                "Node '{}' has scale {} above max downsample factor {}",
                node.name, node.scale, max_factor
            ))),
            None => Ok(()),
        }
    }

    fn metadata(&self, arch: &SegmentationArchitecture) -> ArchMetadata {
        ArchMetadata::new(self.config.dataset_name.clone(), arch.archid())
    }

    fn sampling_params(&self, num_layers: usize) -> SamplingParams<'_> {
        SamplingParams {
            num_layers,
            max_downsample_factor: self.config.max_downsample_factor,
            skip_connections: self.config.skip_connections,
            max_skip_connection_length: self.config.max_skip_connection_length,
            max_scale_delta: self.config.max_scale_delta,
            downsample_prob_ratio: self.config.downsample_prob_ratio,
            operations: self.operators.operations(),
            base_channels: &self.base_channels_list,
            delta_channels: &self.delta_channels_list,
            post_upsample_layers: &self.post_upsample_layers_list,
            mult_delta: self.config.mult_delta,
            img_size: self.config.img_size,
        }
    }

    /// Sample architectures until one falls strictly within the MAC bounds.
    ///
    /// There is no retry limit; callers wanting one must bound wall-clock time
    /// themselves.
    pub fn random_sample(&self, rng: &mut impl Rng) -> ArchWithMetadata {
        let mut attempt = 0usize;
        loop {
            attempt += 1;
            let num_layers = rng.gen_range(self.config.min_layers..=self.config.max_layers);
            let params = self.sampling_params(num_layers);

            let arch = match self.compiler.sample_architecture(&params, rng) {
                Ok(arch) => arch,
                Err(e) => {
                    debug!(attempt, error = %e, "Random sample failed to compile, retrying");
                    continue;
                }
            };

            let macs = match self.estimator.estimate_cost(&arch, arch.input_shape()) {
                Ok(macs) => macs,
                Err(e) => {
                    debug!(attempt, archid = %arch.archid(), error = %e, "Cost estimation failed, retrying");
                    continue;
                }
            };

            if self.within_mac_bounds(macs) {
                info!(attempt, archid = %arch.archid(), macs, num_layers, "Sampled architecture");
                let metadata = self.metadata(&arch).with_macs(macs);
                return ArchWithMetadata::new(arch, metadata);
            }

            debug!(
                attempt,
                archid = %arch.archid(),
                macs,
                "Sampled architecture falls outside of MAC bounds, retrying"
            );
        }
    }

    /// Build one mutated candidate from `base`.
    ///
    /// Channels and post-upsample count step to a neighboring value, then one
    /// non-input node gets a new operator (unless it is the output) and is
    /// rewired: inputs from shared predecessors are dropped and up to
    /// `MAX_NEW_INPUTS` earlier nodes are added.
    fn mutate<R: Rng>(
        &self,
        base: &SegmentationArchitecture,
        rng: &mut R,
    ) -> Result<(Vec<Node>, ChannelConfig, u32)> {
        let mut nodes: Vec<Node> = base.graph().nodes().to_vec();
        let base_channels = base.channels();

        let channels = ChannelConfig::new(
            random_neighbor(&self.base_channels_list, base_channels.base_channels, rng)?,
            random_neighbor(&self.delta_channels_list, base_channels.delta_channels, rng)?,
            base_channels.mult_delta,
        );
        let post_upsample_layers =
            random_neighbor(&self.post_upsample_layers_list, base.post_upsample_layers(), rng)?;

        let chosen = rng.gen_range(1..nodes.len());

        if nodes[chosen].name != OUTPUT_NODE {
            if let Some(&op) = self.operators.operations().choose(rng) {
                nodes[chosen].op = op;
            }
        }

        let k = chosen.min(rng.gen_range(1..=MAX_NEW_INPUTS));
        let new_sources: Vec<String> = index::sample(rng, chosen, k)
            .into_iter()
            .map(|idx| nodes[idx].name.clone())
            .collect();

        let degrees = base.graph().out_degrees();
        let node = &mut nodes[chosen];
        node.inputs
            .retain(|inp| degrees.get(inp.as_str()).copied().unwrap_or(0) <= 1);
        for src in new_sources {
            if !node.inputs.contains(&src) {
                node.inputs.push(src);
            }
        }

        Ok((nodes, channels, post_upsample_layers))
    }

    /// Generate mutated neighbors of `base`.
    ///
    /// Tries at most `patience` times and stops after the first attempt that
    /// yields an accepted neighbor. Compiler, measurement and MAC-bound
    /// failures all count as a spent attempt. Returns an empty list when
    /// patience runs out.
    pub fn get_neighbors(
        &self,
        base: &ArchWithMetadata,
        patience: usize,
        rng: &mut impl Rng,
    ) -> Vec<ArchWithMetadata> {
        let parent_id = base.metadata.archid.clone();
        let mut neighbors = Vec::new();
        let mut nb_tries = 0;

        while nb_tries < patience && neighbors.is_empty() {
            nb_tries += 1;

            let candidate = self.mutate(&base.arch, rng).and_then(|(nodes, channels, post)| {
                let arch = self
                    .compiler
                    .construct(nodes, channels, post, self.config.img_size)?;
                self.compiler.validate_forward(&arch, arch.input_shape())?;
                Ok(arch)
            });

            let nbr = match candidate {
                Ok(arch) => arch,
                Err(e) => {
                    info!(
                        parent = %parent_id,
                        attempt = nb_tries,
                        error = %e,
                        "Neighbor generation failed"
                    );
                    continue;
                }
            };

            let macs = match self.estimator.estimate_cost(&nbr, nbr.input_shape()) {
                Ok(macs) => macs,
                Err(e) => {
                    info!(parent = %parent_id, attempt = nb_tries, error = %e, "Neighbor cost estimation failed");
                    continue;
                }
            };

            if self.within_mac_bounds(macs) {
                let metadata = self.metadata(&nbr).with_parent(parent_id.clone()).with_macs(macs);
                neighbors.push(ArchWithMetadata::new(nbr, metadata));
            } else {
                info!(
                    parent = %parent_id,
                    archid = %nbr.archid(),
                    macs,
                    attempt = nb_tries,
                    "Neighbor MACs fall outside of acceptable range, retrying"
                );
            }
        }

        if neighbors.is_empty() {
            warn!(parent = %parent_id, patience, "No valid neighbor found");
        }

        neighbors
    }

    /// Numeric graph representation of `arch` for a surrogate model
    pub fn get_arch_repr(&self, arch: &ArchWithMetadata) -> Result<ArchRepr> {
        self.encoder.encode(&arch.arch)
    }

    /// Wrap an in-memory node list as an architecture
    pub fn load_from_graph(
        &self,
        nodes: Vec<Node>,
        channels: ChannelConfig,
        post_upsample_layers: u32,
    ) -> Result<ArchWithMetadata> {
        let arch = self
            .compiler
            .construct(nodes, channels, post_upsample_layers, self.config.img_size)?;
        self.check_scales(&arch)?;
        let metadata = self.metadata(&arch);
        Ok(ArchWithMetadata::new(arch, metadata))
    }

    /// Load an architecture from a JSON file
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<ArchWithMetadata> {
        let file = SegmentationArchitecture::from_file(path, self.config.img_size)?.to_file();
        self.load_from_graph(file.graph, file.channels_per_scale, file.post_upsample_layers)
    }

    /// Measure MACs of an architecture with the configured estimator
    pub fn estimate_macs(&self, arch: &SegmentationArchitecture) -> Result<f64> {
        self.estimator.estimate_cost(arch, arch.input_shape())
    }
}
