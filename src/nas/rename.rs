//! Node renaming
//!
//! Positional relabelling of node lists, used to keep two graphs name-disjoint
//! before they are spliced and to canonicalize the merged result.

use std::collections::HashMap;

use super::graph::{Node, INPUT_NODE, OUTPUT_NODE};

/// Options for [`rename_dag_node_list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOptions {
    /// Prefix joined to positional names with `_`; empty for none
    pub prefix: String,
    /// Rename nodes already called `input`/`output` too
    pub rename_input_output: bool,
    /// Name the first node `input` and the last `output`
    pub add_input_output: bool,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            rename_input_output: true,
            add_input_output: false,
        }
    }
}

impl RenameOptions {
    /// Positional names under `prefix`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Leave nodes already named `input`/`output` untouched
    pub fn keep_sentinels(mut self) -> Self {
        self.rename_input_output = false;
        self
    }

    /// Force first/last positions to `input`/`output`
    pub fn assign_sentinels(mut self) -> Self {
        self.add_input_output = true;
        self
    }

    fn positional_name(&self, idx: usize, len: usize) -> String {
        if self.add_input_output {
            if idx == 0 {
                return INPUT_NODE.to_string();
            }
            if idx + 1 == len {
                return OUTPUT_NODE.to_string();
            }
        }
        if self.prefix.is_empty() {
            format!("layer_{}", idx)
        } else {
            format!("{}_layer_{}", self.prefix, idx)
        }
    }
}

/// Return a renamed copy of `nodes`.
///
/// Each node gets a positional name, and input references are rewritten to
/// the new names. References to nodes that were not renamed before the
/// referencing node (dangling or foreign names) are dropped.
pub fn rename_dag_node_list(nodes: &[Node], options: &RenameOptions) -> Vec<Node> {
    let mut rename_map: HashMap<String, String> = HashMap::with_capacity(nodes.len() + 2);
    if !options.rename_input_output {
        rename_map.insert(INPUT_NODE.to_string(), INPUT_NODE.to_string());
        rename_map.insert(OUTPUT_NODE.to_string(), OUTPUT_NODE.to_string());
    }

    let len = nodes.len();
    let mut renamed = Vec::with_capacity(len);

    for (idx, node) in nodes.iter().enumerate() {
        let mut node = node.clone();

        if !rename_map.contains_key(&node.name) {
            let new_name = options.positional_name(idx, len);
            rename_map.insert(node.name.clone(), new_name.clone());
            node.name = new_name;
        }

        node.inputs = node
            .inputs
            .iter()
            .filter(|inp| !inp.is_empty())
            .filter_map(|inp| rename_map.get(inp).cloned())
            .collect();

        renamed.push(node);
    }

    renamed
}
