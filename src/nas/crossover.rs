//! Crossover
//!
//! Splices the head of one parent onto the tail of another at a pair of
//! same-scale pivot nodes.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use super::architecture::{ArchMetadata, ArchWithMetadata};
use super::compiler::ModelCompiler;
use super::evaluator::CostEstimator;
use super::graph::{Node, OUTPUT_NODE};
use super::rename::{rename_dag_node_list, RenameOptions};
use super::search_space::SegmentationSearchSpace;

impl<C: ModelCompiler, E: CostEstimator> SegmentationSearchSpace<C, E> {
    /// Recombine two architectures.
    ///
    /// One parent is picked at random as "left" and contributes the nodes up
    /// to its pivot; the "right" parent contributes its pivot and everything
    /// after it. Channel configuration and post-upsample count are each taken
    /// from a random parent. Returns `None` when either parent has no interior
    /// node, or when `patience` attempts pass without a splice that compiles.
    pub fn crossover(
        &self,
        model_1: &ArchWithMetadata,
        model_2: &ArchWithMetadata,
        patience: usize,
        rng: &mut impl Rng,
    ) -> Option<ArchWithMetadata> {
        let (left_m, right_m) = if rng.gen_bool(0.5) {
            (model_1, model_2)
        } else {
            (model_2, model_1)
        };

        let left_g = rename_dag_node_list(
            left_m.arch.graph().nodes(),
            &RenameOptions::with_prefix("left").keep_sentinels(),
        );
        let right_g = rename_dag_node_list(
            right_m.arch.graph().nodes(),
            &RenameOptions::with_prefix("right").keep_sentinels(),
        );

        if left_g.len() <= 2 || right_g.len() <= 2 {
            debug!(
                left = %left_m.metadata.archid,
                right = %right_m.metadata.archid,
                "Parent has no interior nodes, skipping crossover"
            );
            return None;
        }

        let mut nb_tries = 0;
        while nb_tries < patience {
            nb_tries += 1;

            let merged = match splice(&left_g, &right_g, rng) {
                Some(nodes) => nodes,
                None => {
                    debug!(attempt = nb_tries, "No right pivot with matching scale");
                    continue;
                }
            };

            let channels = if rng.gen_bool(0.5) {
                *left_m.arch.channels()
            } else {
                *right_m.arch.channels()
            };
            let post_upsample_layers = if rng.gen_bool(0.5) {
                left_m.arch.post_upsample_layers()
            } else {
                right_m.arch.post_upsample_layers()
            };

            let child = self
                .compiler()
                .construct(merged, channels, post_upsample_layers, self.config().img_size)
                .and_then(|arch| {
                    self.check_scales(&arch)?;
                    self.compiler().validate_forward(&arch, arch.input_shape())?;
                    Ok(arch)
                });

            match child {
                Ok(arch) => {
                    let metadata = ArchMetadata::new(self.config().dataset_name.clone(), arch.archid())
                        .with_parents(&left_m.metadata.archid, &right_m.metadata.archid);
                    info!(
                        archid = %arch.archid(),
                        parents = ?metadata.parents,
                        attempt = nb_tries,
                        "Crossover produced child"
                    );
                    return Some(ArchWithMetadata::new(arch, metadata));
                }
                Err(e) => {
                    info!(attempt = nb_tries, error = %e, "Crossover child failed to compile");
                }
            }
        }

        warn!(
            left = %left_m.metadata.archid,
            right = %right_m.metadata.archid,
            patience,
            "Crossover found no valid splice point"
        );
        None
    }
}

/// Join `left[..=pivot]` with `right[pivot'..]` where both pivots share a scale.
///
/// Both lists must be name-disjoint apart from the sentinels and have at least
/// one interior node. Returns `None` if no right pivot matches the sampled
/// left pivot's scale.
fn splice<R: Rng + ?Sized>(left: &[Node], right: &[Node], rng: &mut R) -> Option<Vec<Node>> {
    let left_pivot_idx = rng.gen_range(1..left.len() - 1);
    let pivot_scale = left[left_pivot_idx].scale;

    let right_candidates: Vec<usize> = (1..right.len() - 1)
        .filter(|&i| right[i].scale == pivot_scale)
        .collect();
    let right_pivot_idx = *right_candidates.choose(rng)?;

    let left_half = &left[..=left_pivot_idx];
    let mut right_half: Vec<Node> = right[right_pivot_idx..].to_vec();

    let right_tail: HashSet<&str> = right[right_pivot_idx..]
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    let right_scales: HashMap<&str, u32> = right
        .iter()
        .map(|n| (n.name.as_str(), n.scale))
        .collect();

    // References leaving the right tail are re-pointed at a same-scale node of
    // the left half, or dropped when there is none.
    for node in right_half.iter_mut().rev() {
        let mut repaired = Vec::with_capacity(node.inputs.len());
        for inp in &node.inputs {
            if right_tail.contains(inp.as_str()) {
                repaired.push(inp.clone());
                continue;
            }
            let scale = match right_scales.get(inp.as_str()) {
                Some(&scale) => scale,
                None => continue,
            };
            let candidates: Vec<&Node> = left_half.iter().filter(|n| n.scale == scale).collect();
            if let Some(replacement) = candidates.choose(rng) {
                repaired.push(replacement.name.clone());
            }
        }
        node.inputs = repaired;
    }

    if let Some(last) = right_half.last_mut() {
        last.name = OUTPUT_NODE.to_string();
    }

    let left_pivot = &left[left_pivot_idx].name;
    if !right_half[0].inputs.contains(left_pivot) {
        right_half[0].inputs.push(left_pivot.clone());
    }

    let merged: Vec<Node> = left_half.iter().cloned().chain(right_half).collect();
    Some(rename_dag_node_list(
        &merged,
        &RenameOptions::default().assign_sentinels(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegNasError;
    use crate::nas::architecture::SegmentationArchitecture;
    use crate::nas::compiler::SegmentationCompiler;
    use crate::nas::config::SearchSpaceConfig;
    use crate::nas::graph::{ChannelConfig, INPUT_NODE};
    use crate::nas::operations::OperationType;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn space() -> SegmentationSearchSpace {
        let config = SearchSpaceConfig::new("test")
            .with_layers(3, 8)
            .with_img_size(64);
        SegmentationSearchSpace::with_defaults(config).unwrap()
    }

    fn chain(scales: &[u32]) -> Vec<Node> {
        let mut nodes = vec![Node::new("input", OperationType::Conv3x3, 1)];
        for (i, &s) in scales.iter().enumerate() {
            let prev = nodes[i].name.clone();
            nodes.push(Node::new(format!("layer_{}", i + 1), OperationType::Conv5x5, s).with_inputs([prev]));
        }
        let prev = nodes.last().map(|n| n.name.clone()).unwrap();
        nodes.push(Node::new("output", OperationType::Conv3x3, 1).with_inputs([prev]));
        nodes
    }

    fn assert_topological(nodes: &[Node]) {
        assert_eq!(nodes[0].name, INPUT_NODE);
        assert_eq!(nodes[nodes.len() - 1].name, OUTPUT_NODE);
        for (idx, node) in nodes.iter().enumerate() {
            for inp in &node.inputs {
                let src = nodes.iter().position(|n| &n.name == inp).expect("dangling input");
                assert!(src < idx, "{} -> {} is not a forward edge", inp, node.name);
            }
        }
    }

    #[test]
    fn test_crossover_children_are_valid_dags() {
        let space = space();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let mut produced = 0;

        for _ in 0..20 {
            let a = space.random_sample(&mut rng);
            let b = space.random_sample(&mut rng);
            if let Some(child) = space.crossover(&a, &b, 10, &mut rng) {
                produced += 1;
                assert_topological(child.arch.graph().nodes());

                let parents = child.metadata.parents.clone().unwrap();
                let ids: Vec<&str> = parents.split(',').collect();
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&a.archid()) && ids.contains(&b.archid()));
                assert!(child.metadata.parent.is_none());

                let ch = child.arch.channels();
                assert!(ch == a.arch.channels() || ch == b.arch.channels());
            }
        }

        assert!(produced > 0);
    }

    #[test]
    fn test_degenerate_parent_returns_none() {
        let space = space();
        let tiny = vec![
            Node::new("input", OperationType::Conv3x3, 1),
            Node::new("output", OperationType::Conv3x3, 1).with_inputs(["input"]),
        ];
        let a = space
            .load_from_graph(tiny, ChannelConfig::new(8, 8, false), 1)
            .unwrap();
        let b = space
            .load_from_graph(chain(&[2, 4]), ChannelConfig::new(8, 8, false), 1)
            .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);

        assert!(space.crossover(&a, &b, 10, &mut rng).is_none());
        assert!(space.crossover(&b, &a, 10, &mut rng).is_none());
    }

    #[test]
    fn test_no_matching_scale_exhausts_patience() {
        let space = space();
        let a = space
            .load_from_graph(chain(&[2, 2]), ChannelConfig::new(8, 8, false), 1)
            .unwrap();
        let b = space
            .load_from_graph(chain(&[4, 8]), ChannelConfig::new(16, 8, false), 2)
            .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);

        assert!(space.crossover(&a, &b, 8, &mut rng).is_none());
    }

    #[test]
    fn test_splice_connects_pivot_and_repairs() {
        let left = rename_dag_node_list(
            &chain(&[2, 4, 2]),
            &RenameOptions::with_prefix("left").keep_sentinels(),
        );
        let mut right_nodes = chain(&[2, 2, 4]);
        // layer_3 also reads the input, which lies outside any right tail
        right_nodes[3].inputs.push("input".to_string());
        let right = rename_dag_node_list(
            &right_nodes,
            &RenameOptions::with_prefix("right").keep_sentinels(),
        );
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);

        for _ in 0..50 {
            if let Some(merged) = splice(&left, &right, &mut rng) {
                assert_topological(&merged);
                let names: HashSet<&str> = merged.iter().map(|n| n.name.as_str()).collect();
                assert_eq!(names.len(), merged.len());
                assert!(merged.iter().all(|n| !n.name.starts_with("left")
                    && !n.name.starts_with("right")));
            }
        }
    }

    #[test]
    fn test_splice_drops_reference_without_same_scale_replacement() {
        // One interior node on the left pins the pivot at scale 2; the only
        // scale-2 interior node on the right is layer_2.
        let left = rename_dag_node_list(
            &chain(&[2]),
            &RenameOptions::with_prefix("left").keep_sentinels(),
        );
        let right_nodes = vec![
            Node::new("input", OperationType::Conv3x3, 1),
            Node::new("layer_1", OperationType::Conv3x3, 4).with_inputs(["input"]),
            Node::new("layer_2", OperationType::Conv3x3, 2).with_inputs(["layer_1"]),
            Node::new("layer_3", OperationType::Conv3x3, 8).with_inputs(["layer_1"]),
            Node::new("output", OperationType::Conv3x3, 1).with_inputs(["layer_3", "layer_2"]),
        ];
        let right = rename_dag_node_list(
            &right_nodes,
            &RenameOptions::with_prefix("right").keep_sentinels(),
        );
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(4);

        let merged = splice(&left, &right, &mut rng).unwrap();
        let names: Vec<&str> = merged.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["input", "layer_1", "layer_2", "layer_3", "output"]);
        assert_eq!(merged.iter().map(|n| n.scale).collect::<Vec<_>>(), vec![1, 2, 2, 8, 1]);

        // The scale-4 source has no counterpart in the left half
        assert_eq!(merged[2].inputs, vec!["layer_1".to_string()]);
        assert!(merged[3].inputs.is_empty());
        assert_eq!(merged[4].inputs, vec!["layer_3".to_string(), "layer_2".to_string()]);

        let arch = SegmentationArchitecture::from_nodes(merged, ChannelConfig::new(8, 8, false), 1, 64)
            .unwrap();
        assert!(matches!(
            SegmentationCompiler::default().validate_forward(&arch, arch.input_shape()),
            Err(SegNasError::StructuralError(_))
        ));
    }

    #[test]
    fn test_crossover_rejects_scale_above_max_downsample() {
        let config = SearchSpaceConfig::new("test")
            .with_layers(3, 8)
            .with_img_size(64)
            .with_max_downsample_factor(4);
        let space = SegmentationSearchSpace::with_defaults(config).unwrap();
        let wide = SegmentationSearchSpace::with_defaults(
            SearchSpaceConfig::new("test").with_img_size(64),
        )
        .unwrap();
        // Any splice of this parent with itself keeps the scale-8 node
        let a = wide
            .load_from_graph(chain(&[2, 8]), ChannelConfig::new(8, 8, false), 1)
            .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);

        assert!(space.crossover(&a, &a, 10, &mut rng).is_none());
    }

    #[test]
    fn test_identical_parents_crossover() {
        let space = space();
        let a = space
            .load_from_graph(chain(&[2, 4, 2]), ChannelConfig::new(8, 8, false), 1)
            .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);

        let child = space.crossover(&a, &a, 10, &mut rng).unwrap();
        assert_topological(child.arch.graph().nodes());
        let expected = format!("{},{}", a.archid(), a.archid());
        assert_eq!(child.metadata.parents.as_deref(), Some(expected.as_str()));
    }
}
