mod builder;
mod filter;
mod flatten;

pub use builder::{build_field_tree, build_field_tree_with_progress, build_tree_from_paths};
pub use filter::filter_tree;
pub use flatten::{file_groups, flatten_forest, row_id, visible_forest, ExpansionState, FileGroup, FlatRow};

use crate::models::TreeNode;

/// `path` of every tree root.
pub const ROOT_PATH: &str = "\\";

/// Path of a child named `id` under a node whose path is `parent`.
///
/// Paths re-join segments with `\`, which never occurs inside a segment, so two
/// distinct nodes of one tree never share a path.
pub fn child_path(parent: &str, id: &str) -> String {
  if parent == ROOT_PATH {
    format!("{ROOT_PATH}{id}")
  } else {
    format!("{parent}{ROOT_PATH}{id}")
  }
}

impl TreeNode {
  /// Finds the descendant (or `self`) whose path is `path`.
  pub fn find_by_path(&self, path: &str) -> Option<&TreeNode> {
    if self.path == path {
      return Some(self);
    }
    self
      .children
      .iter()
      .filter(|c| c.path.is_empty() || path.starts_with(c.path.as_str()))
      .find_map(|c| c.find_by_path(path))
  }

  /// Number of nodes in this subtree, `self` included.
  pub fn node_count(&self) -> usize {
    1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
  }

  /// Number of nodes bound to a column in this subtree.
  pub fn leaf_count(&self) -> usize {
    usize::from(self.column().is_some()) + self.children.iter().map(TreeNode::leaf_count).sum::<usize>()
  }
}
