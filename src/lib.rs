mod cursor;
mod engine;
mod formats;
mod models;
mod search_match;
mod series;
mod source;
mod tasks;
pub mod tree;

pub use crate::engine::{CoreEngine, CoreError, CoreOptions};
pub use crate::formats::{
  parse_header_line, parse_metric_path, parse_metric_paths, sanitize_cell, tokenize_line, MetricPath, RawRow,
  RowTokenizer, FIRST_METRIC_COLUMN,
};
pub use crate::models::{
  cell_at, Cell, EsxtopData, FileFailure, FileSummary, LoadProgress, LoadStage, Row, Series, SeriesSet,
  SessionInfo, Task, TaskInfo, TaskKind, TreeNode, VisibleRow, VisibleRowPage, FILE_GROUP_INDEX,
  STRUCTURAL_INDEX,
};
pub use crate::search_match::MIN_FILTER_CHARS;
pub use crate::series::series_for_node;
pub use crate::source::{ByteSource, FileSource, MemorySource};
pub use crate::tree::{
  build_field_tree, file_groups, filter_tree, flatten_forest, visible_forest, ExpansionState, FileGroup, FlatRow,
};
