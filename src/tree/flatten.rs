use std::{borrow::Cow, collections::HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{EsxtopData, TreeNode, VisibleRow, FILE_GROUP_INDEX};

use super::{child_path, filter_tree, ROOT_PATH};

/// Which rows are expanded and which one is selected.
///
/// Owned by the caller and never mutated by the flattener: every operation returns a
/// new state. Rows are identified by their row id (`"<file index>:<path>"`), so the same
/// counter expanded in one file stays collapsed in another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionState {
  expanded: HashSet<String>,
  selected_path: Option<String>,
}

impl ExpansionState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_expanded(&self, row_id: &str) -> bool {
    self.expanded.contains(row_id)
  }

  pub fn toggled(&self, row_id: &str) -> Self {
    let expand = !self.is_expanded(row_id);
    self.with_expanded(row_id, expand)
  }

  pub fn with_expanded(&self, row_id: &str, expanded: bool) -> Self {
    let mut next = self.clone();
    if expanded {
      next.expanded.insert(row_id.to_string());
    } else {
      next.expanded.remove(row_id);
    }
    next
  }

  pub fn with_selected(&self, row_id: Option<&str>) -> Self {
    Self {
      expanded: self.expanded.clone(),
      selected_path: row_id.map(str::to_string),
    }
  }

  pub fn selected_path(&self) -> Option<&str> {
    self.selected_path.as_deref()
  }

  pub fn expanded_count(&self) -> usize {
    self.expanded.len()
  }
}

/// One visible row of a flattened forest.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow<'a> {
  pub id: String,
  pub label: &'a str,
  pub field_index: i64,
  /// The node's path; derived from its ancestors when the node's own path is unset.
  pub path: String,
  pub depth: usize,
  pub is_expanded: bool,
  pub is_expandable: bool,
  pub data_index: usize,
  pub is_selectable: bool,
}

impl FlatRow<'_> {
  pub fn to_visible(&self, state: &ExpansionState) -> VisibleRow {
    VisibleRow {
      id: self.id.clone(),
      label: self.label.to_string(),
      path: self.path.clone(),
      field_index: self.field_index,
      depth: self.depth,
      data_index: self.data_index,
      is_expanded: self.is_expanded,
      is_expandable: self.is_expandable,
      is_selectable: self.is_selectable,
      is_selected: state.selected_path() == Some(self.id.as_str()),
    }
  }
}

pub fn row_id(data_index: usize, path: &str) -> String {
  format!("{data_index}:{path}")
}

/// One file of the browser forest: its name and its (possibly filtered) field tree.
///
/// An unfiltered tree is borrowed from the loaded file, so building the forest costs
/// nothing per node.
#[derive(Debug, Clone)]
pub struct FileGroup<'a> {
  pub file_name: &'a str,
  pub tree: Cow<'a, TreeNode>,
}

impl FileGroup<'_> {
  /// The top-level nodes shown under the grouping row.
  pub fn children(&self) -> &[TreeNode] {
    &self.tree.children
  }

  /// Owned snapshot as a synthetic, non-selectable grouping node.
  pub fn to_node(&self) -> TreeNode {
    TreeNode {
      id: self.file_name.to_string(),
      field_index: FILE_GROUP_INDEX,
      children: self.children().to_vec(),
      path: ROOT_PATH.to_string(),
    }
  }
}

/// The per-file groups the browser shows for `keyword`.
///
/// A file whose tree filters down to nothing keeps its group, just without children.
pub fn file_groups<'a>(files: &'a [EsxtopData], keyword: &str) -> Vec<FileGroup<'a>> {
  files
    .iter()
    .map(|d| FileGroup {
      file_name: &d.file_name,
      tree: filter_tree(&d.metric_field_tree, keyword),
    })
    .collect()
}

/// Owned grouping nodes (`field_index = -2`, `id` = file name) for `keyword`.
pub fn visible_forest(files: &[EsxtopData], keyword: &str) -> Vec<TreeNode> {
  file_groups(files, keyword).iter().map(FileGroup::to_node).collect()
}

/// Lists the rows a windowed view shows, in depth-first pre-order.
///
/// Every group yields its grouping row; descendants appear only below expanded rows.
/// Cost is proportional to the number of visible rows.
pub fn flatten_forest<'a>(groups: &'a [FileGroup<'_>], state: &ExpansionState) -> Vec<FlatRow<'a>> {
  let mut rows = Vec::new();
  for (data_index, group) in groups.iter().enumerate() {
    let id = row_id(data_index, ROOT_PATH);
    let is_expanded = state.is_expanded(&id);
    rows.push(FlatRow {
      id,
      label: group.file_name,
      field_index: FILE_GROUP_INDEX,
      path: ROOT_PATH.to_string(),
      depth: 0,
      is_expanded,
      is_expandable: !group.children().is_empty(),
      data_index,
      is_selectable: false,
    });
    if is_expanded {
      for child in group.children() {
        push_visible(&mut rows, child, ROOT_PATH, 1, data_index, state);
      }
    }
  }
  rows
}

fn push_visible<'a>(
  rows: &mut Vec<FlatRow<'a>>,
  node: &'a TreeNode,
  parent_path: &str,
  depth: usize,
  data_index: usize,
  state: &ExpansionState,
) {
  let path = if node.path.is_empty() {
    child_path(parent_path, &node.id)
  } else {
    node.path.clone()
  };
  let id = row_id(data_index, &path);
  let is_expanded = !node.is_leaf() && state.is_expanded(&id);
  rows.push(FlatRow {
    id,
    label: &node.id,
    field_index: node.field_index,
    path: path.clone(),
    depth,
    is_expanded,
    is_expandable: !node.is_leaf(),
    data_index,
    is_selectable: true,
  });
  if is_expanded {
    for child in &node.children {
      push_visible(rows, child, &path, depth + 1, data_index, state);
    }
  }
}
