use serde::{Deserialize, Serialize};

/// `field_index` of a node that only groups other nodes.
pub const STRUCTURAL_INDEX: i64 = -1;
/// `field_index` of the synthetic per-file node built for the browser.
pub const FILE_GROUP_INDEX: i64 = -2;

/// One segment of a decomposed header path (or the synthetic root).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeNode {
  pub id: String,
  pub field_index: i64,
  pub children: Vec<TreeNode>,
  /// Stable identity used for selection/expansion. Empty means "unset".
  pub path: String,
}

impl TreeNode {
  pub fn root() -> Self {
    Self {
      id: "root".into(),
      field_index: STRUCTURAL_INDEX,
      children: Vec::new(),
      path: crate::tree::ROOT_PATH.into(),
    }
  }

  pub fn is_leaf(&self) -> bool {
    self.children.is_empty()
  }

  /// Column this node is bound to, if any.
  pub fn column(&self) -> Option<usize> {
    usize::try_from(self.field_index).ok()
  }

  pub fn is_file_group(&self) -> bool {
    self.field_index == FILE_GROUP_INDEX
  }
}

/// One ingested cell, classified once at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Cell {
  Missing,
  Number(f64),
  Text(String),
}

impl Cell {
  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Cell::Number(n) => Some(*n),
      _ => None,
    }
  }

  pub fn is_missing(&self) -> bool {
    matches!(self, Cell::Missing)
  }
}

pub type Row = Vec<Cell>;

static MISSING: Cell = Cell::Missing;

/// Reads `column` from `row`; a short row reads as missing.
pub fn cell_at(row: &[Cell], column: usize) -> &Cell {
  row.get(column).unwrap_or(&MISSING)
}

/// Everything parsed out of one loaded capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsxtopData {
  pub file_name: String,
  /// Raw header strings aligned with data columns. Column 0 is the sample timestamp;
  /// a header field that yielded no name is kept as an empty string.
  pub metric_field: Vec<String>,
  pub metric_field_tree: TreeNode,
  pub metric_data: Vec<Row>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
  pub file_name: String,
  pub columns: usize,
  pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
  pub session_id: String,
  pub files: Vec<FileSummary>,
  pub created_at_ms: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadStage {
  /// `value` is cumulative header bytes read.
  Header,
  /// `value` is percent of header columns folded into the tree.
  Tree,
  /// `value` is percent of body bytes consumed.
  Body,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadProgress {
  pub data_index: usize,
  pub file_name: String,
  pub stage: LoadStage,
  pub value: f64,
}

impl LoadProgress {
  /// Human-readable status line for a loading overlay.
  pub fn message(&self) -> String {
    match self.stage {
      LoadStage::Header => format!("Loading header from {}: {} bytes", self.file_name, self.value as u64),
      LoadStage::Tree => format!("Computing field tree from {}: {}%", self.file_name, self.value.trunc()),
      LoadStage::Body => format!("Parsing data from {}: {}%", self.file_name, self.value.trunc()),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
  pub file_name: String,
  pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  Load,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
  pub id: String,
  pub kind: TaskKind,
  pub cancellable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  pub kind: TaskKind,
  pub started_at_ms: i64,
  pub progress_0_100: u8,
  pub message: String,
  pub cancellable: bool,
  pub finished: bool,
  pub error: Option<String>,
  /// Set once a load task finished successfully.
  pub session: Option<SessionInfo>,
}

/// A flattened browser row, detached from the tree it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VisibleRow {
  pub id: String,
  pub label: String,
  pub path: String,
  pub field_index: i64,
  pub depth: usize,
  pub data_index: usize,
  pub is_expanded: bool,
  pub is_expandable: bool,
  pub is_selectable: bool,
  pub is_selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibleRowPage {
  pub rows: Vec<VisibleRow>,
  pub total_rows: u64,
  pub next_cursor: Option<String>,
  pub reached_end: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
  pub name: String,
  pub column: usize,
  pub y: Vec<Cell>,
}

/// Series for one selected node, sharing the timestamp axis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesSet {
  pub title: String,
  pub x: Vec<Cell>,
  pub series: Vec<Series>,
}
