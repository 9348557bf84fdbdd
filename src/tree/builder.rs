use std::collections::HashMap;

use crate::{
  formats::{parse_metric_paths, MetricPath},
  models::{TreeNode, STRUCTURAL_INDEX},
};

use super::{child_path, ROOT_PATH};

/// Builds the field tree for an ordered header list.
pub fn build_field_tree(headers: &[String]) -> TreeNode {
  build_field_tree_with_progress(headers, &mut |_| {})
}

/// Like `build_field_tree`, reporting the percentage of columns folded in.
pub fn build_field_tree_with_progress(headers: &[String], on_progress: &mut dyn FnMut(f64)) -> TreeNode {
  let paths = parse_metric_paths(headers);
  build_tree_from_paths(&paths, on_progress)
}

/// Folds decomposed paths into one tree.
///
/// Nodes are reused by `id` at every level; a path's final node is bound to the path's
/// column unless an earlier path already bound it.
pub fn build_tree_from_paths(paths: &[MetricPath], on_progress: &mut dyn FnMut(f64)) -> TreeNode {
  let mut arena = Arena::new();
  let total = paths.len();
  let step = (total / 100).max(1);

  for (done, path) in paths.iter().enumerate() {
    let mut current = 0usize;
    for segment in &path.segments {
      current = arena.child(current, segment);
    }
    if current != 0 && arena.nodes[current].field_index == STRUCTURAL_INDEX {
      arena.nodes[current].field_index = path.column as i64;
    }
    if (done + 1) % step == 0 || done + 1 == total {
      on_progress(((done + 1) as f64 / total as f64) * 100.0);
    }
  }

  let root = arena.materialize(0, ROOT_PATH.to_string());
  tracing::debug!(columns = total, nodes = root.node_count(), "field tree built");
  root
}

struct ArenaNode {
  id: String,
  field_index: i64,
  children: Vec<usize>,
}

/// Flat node storage with an `(parent, id) -> slot` index for constant-time lookups.
struct Arena {
  nodes: Vec<ArenaNode>,
  index: HashMap<(usize, String), usize>,
}

impl Arena {
  fn new() -> Self {
    let root = TreeNode::root();
    Self {
      nodes: vec![ArenaNode {
        id: root.id,
        field_index: root.field_index,
        children: Vec::new(),
      }],
      index: HashMap::new(),
    }
  }

  fn child(&mut self, parent: usize, id: &str) -> usize {
    if let Some(&slot) = self.index.get(&(parent, id.to_string())) {
      return slot;
    }
    let slot = self.nodes.len();
    self.nodes.push(ArenaNode {
      id: id.to_string(),
      field_index: STRUCTURAL_INDEX,
      children: Vec::new(),
    });
    self.nodes[parent].children.push(slot);
    self.index.insert((parent, id.to_string()), slot);
    slot
  }

  fn materialize(&self, slot: usize, path: String) -> TreeNode {
    let node = &self.nodes[slot];
    let children = node
      .children
      .iter()
      .map(|&c| self.materialize(c, child_path(&path, &self.nodes[c].id)))
      .collect();
    TreeNode {
      id: node.id.clone(),
      field_index: node.field_index,
      children,
      path,
    }
  }
}
