use std::{
  collections::HashMap,
  ops::ControlFlow,
  path::Path,
  sync::{atomic::AtomicBool, Arc},
  time::{SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  cursor::{decode_cursor, encode_cursor, Cursor},
  formats,
  models::{
    EsxtopData, FileFailure, FileSummary, LoadProgress, Row, SeriesSet, SessionInfo, Task, TaskInfo,
    TaskKind, TreeNode, VisibleRowPage,
  },
  series::series_for_node,
  source::{ByteSource, FileSource},
  tasks::{load_all, TaskManager, TaskManagerOptions},
  tree::{build_field_tree, file_groups, flatten_forest, visible_forest, ExpansionState},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("empty input: no header line found")]
  EmptyInput,
  #[error("stream read failed: {0}")]
  StreamRead(String),
  #[error("decode error: {0}")]
  Decode(String),
  #[error("load cancelled")]
  Cancelled,
  #[error("{} of the files failed to load", .failures.len())]
  Load { failures: Vec<FileFailure> },
  #[error("unknown session: {0}")]
  UnknownSession(String),
  #[error("unknown node: {0}")]
  UnknownNode(String),
  #[error("bad cursor token: {0}")]
  BadCursor(String),
  #[error("invalid argument: {0}")]
  InvalidArg(String),
  #[error("task error: {0}")]
  Task(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreOptions {
  /// Bytes requested per underlying read.
  pub chunk_size: usize,
  /// Rows per batch handed from the reader to the consumer.
  pub batch_rows: usize,
  /// Batches the reader may run ahead of the consumer.
  pub queue_capacity: usize,
  pub default_page_size: usize,
  pub max_concurrent_tasks: usize,
}

impl Default for CoreOptions {
  fn default() -> Self {
    Self {
      chunk_size: 64 * 1024,
      batch_rows: 1024,
      queue_capacity: 8,
      default_page_size: 200,
      max_concurrent_tasks: 2,
    }
  }
}

impl CoreOptions {
  /// Parses options from a (possibly partial) JSON object; absent keys keep their defaults.
  pub fn from_json_str(s: &str) -> Result<Self, CoreError> {
    serde_json::from_str(s).map_err(|e| CoreError::InvalidArg(format!("options: {e}")))
  }
}

#[derive(Debug, Clone)]
struct SessionState {
  info: SessionInfo,
  files: Arc<Vec<EsxtopData>>,
}

#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  sessions: Arc<Mutex<HashMap<String, SessionState>>>,
  tasks: TaskManager,
}

impl CoreEngine {
  pub fn new(options: CoreOptions) -> Self {
    let tasks = TaskManager::new(TaskManagerOptions {
      max_concurrent_tasks: options.max_concurrent_tasks,
    });
    Self {
      options,
      sessions: Arc::new(Mutex::new(HashMap::new())),
      tasks,
    }
  }

  pub fn options(&self) -> &CoreOptions {
    &self.options
  }

  /// Parser entry point: the ordered header strings of `source`.
  ///
  /// `on_bytes` receives the cumulative number of bytes read.
  pub fn extract_header(
    &self,
    source: &dyn ByteSource,
    mut on_bytes: impl FnMut(u64),
  ) -> Result<Vec<String>, CoreError> {
    formats::read_header(source, self.options.chunk_size, &mut on_bytes)
  }

  /// Parser entry point: every data row of `source`, in file order.
  ///
  /// `on_progress` receives the percentage of bytes consumed; it is never called when the
  /// source does not declare a size.
  pub fn ingest_body(
    &self,
    source: &dyn ByteSource,
    skip_first_row: bool,
    mut on_progress: impl FnMut(f64),
  ) -> Result<Vec<Row>, CoreError> {
    let never = AtomicBool::new(false);
    formats::ingest_body(source, skip_first_row, &self.options, &never, &mut on_progress)
  }

  /// Streaming variant of `ingest_body`: rows arrive in bounded batches while the file is
  /// still being read. Returning `Break` stops reading.
  pub fn ingest_body_batches(
    &self,
    source: &dyn ByteSource,
    skip_first_row: bool,
    mut on_progress: impl FnMut(f64),
    mut on_batch: impl FnMut(Vec<Row>) -> ControlFlow<()>,
  ) -> Result<u64, CoreError> {
    let never = AtomicBool::new(false);
    formats::ingest_body_batches(
      source,
      skip_first_row,
      &self.options,
      &never,
      &mut on_progress,
      &mut on_batch,
    )
  }

  /// Parser entry point: the field tree for an ordered header list.
  pub fn build_tree(&self, headers: &[String]) -> TreeNode {
    build_field_tree(headers)
  }

  pub fn open_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<SessionInfo, CoreError> {
    self.open_files_with_progress(paths, |_| {})
  }

  /// Loads every file in parallel and opens a session over them.
  pub fn open_files_with_progress<P: AsRef<Path>>(
    &self,
    paths: &[P],
    on_progress: impl FnMut(LoadProgress),
  ) -> Result<SessionInfo, CoreError> {
    let sources = file_sources(paths)?;
    self.load_sources(sources, on_progress)
  }

  pub fn load_sources(
    &self,
    sources: Vec<Box<dyn ByteSource>>,
    mut on_progress: impl FnMut(LoadProgress),
  ) -> Result<SessionInfo, CoreError> {
    if sources.is_empty() {
      return Err(CoreError::InvalidArg("no files to load".into()));
    }
    let never = AtomicBool::new(false);
    let files = load_all(&sources, &self.options, &never, &mut on_progress)?;
    Ok(register_session(&self.sessions, files))
  }

  /// Starts loading `paths` on a background task; poll it with `get_task`.
  pub fn start_load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<TaskInfo, CoreError> {
    let sources = file_sources(paths)?;
    self.start_load_sources(sources)
  }

  pub fn start_load_sources(&self, sources: Vec<Box<dyn ByteSource>>) -> Result<TaskInfo, CoreError> {
    let sessions = self.sessions.clone();
    let task = self.tasks.start_load(
      sources,
      self.options.clone(),
      Box::new(move |files| register_session(&sessions, files)),
    )?;
    Ok(TaskInfo {
      id: task.id,
      kind: TaskKind::Load,
      cancellable: true,
    })
  }

  /// Poll a background task status.
  pub fn get_task(&self, task_id: &str) -> Result<Task, CoreError> {
    self.tasks.get_task(task_id).map_err(CoreError::Task)
  }

  pub fn cancel_task(&self, task_id: &str) -> Result<(), CoreError> {
    self.tasks.cancel_task(task_id).map_err(CoreError::Task)
  }

  pub fn close_session(&self, session_id: &str) -> Result<(), CoreError> {
    self
      .sessions
      .lock()
      .remove(session_id)
      .map(|_| ())
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))
  }

  pub fn session_info(&self, session_id: &str) -> Result<SessionInfo, CoreError> {
    let sessions = self.sessions.lock();
    let s = sessions
      .get(session_id)
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))?;
    Ok(s.info.clone())
  }

  /// The loaded files of a session, in load order.
  pub fn files(&self, session_id: &str) -> Result<Arc<Vec<EsxtopData>>, CoreError> {
    let sessions = self.sessions.lock();
    let s = sessions
      .get(session_id)
      .ok_or_else(|| CoreError::UnknownSession(session_id.to_string()))?;
    Ok(s.files.clone())
  }

  /// Per-file grouping nodes after filtering by `keyword`.
  pub fn file_trees(&self, session_id: &str, keyword: &str) -> Result<Vec<TreeNode>, CoreError> {
    let files = self.files(session_id)?;
    Ok(visible_forest(&files, keyword))
  }

  /// A window of the browser's visible rows.
  ///
  /// The visible list is recomputed from `state` on each call over borrowed trees; only
  /// the requested window is returned.
  pub fn visible_rows(
    &self,
    session_id: &str,
    keyword: &str,
    state: &ExpansionState,
    cursor: Option<&str>,
    limit: usize,
  ) -> Result<VisibleRowPage, CoreError> {
    let files = self.files(session_id)?;
    let groups = file_groups(&files, keyword);
    let flat = flatten_forest(&groups, state);
    let total = flat.len();

    let limit = if limit == 0 {
      self.options.default_page_size
    } else {
      limit
    };
    // A cursor replayed after the row list shrank is clamped to its end.
    let c = decode_cursor(cursor)?;
    let start = (c.offset as usize).min(total);
    let end = start.saturating_add(limit).min(total);

    let rows: Vec<_> = flat[start..end].iter().map(|r| r.to_visible(state)).collect();
    let reached_end = end >= total;
    let next_cursor = if reached_end {
      None
    } else {
      Some(encode_cursor(Cursor { offset: end as u64 })?)
    };
    Ok(VisibleRowPage {
      rows,
      total_rows: total as u64,
      next_cursor,
      reached_end,
    })
  }

  /// Series to plot for the node at `path` in file `data_index`.
  pub fn series(&self, session_id: &str, data_index: usize, path: &str) -> Result<SeriesSet, CoreError> {
    let files = self.files(session_id)?;
    let data = files
      .get(data_index)
      .ok_or_else(|| CoreError::InvalidArg(format!("no file at index {data_index}")))?;
    let node = data
      .metric_field_tree
      .find_by_path(path)
      .ok_or_else(|| CoreError::UnknownNode(path.to_string()))?;
    Ok(series_for_node(data, node))
  }
}

fn file_sources<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Box<dyn ByteSource>>, CoreError> {
  paths
    .iter()
    .map(|p| -> Result<Box<dyn ByteSource>, CoreError> { Ok(Box::new(FileSource::new(p)?)) })
    .collect()
}

fn register_session(sessions: &Mutex<HashMap<String, SessionState>>, files: Vec<EsxtopData>) -> SessionInfo {
  let info = SessionInfo {
    session_id: Uuid::new_v4().to_string(),
    files: files
      .iter()
      .map(|d| FileSummary {
        file_name: d.file_name.clone(),
        columns: d.metric_field.len(),
        rows: d.metric_data.len(),
      })
      .collect(),
    created_at_ms: now_ms(),
  };
  tracing::info!(session = %info.session_id, files = info.files.len(), "session opened");
  sessions.lock().insert(
    info.session_id.clone(),
    SessionState {
      info: info.clone(),
      files: Arc::new(files),
    },
  );
  info
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
