use std::{
  collections::HashMap,
  sync::{
    atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering},
    Arc,
  },
  thread,
  time::{SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{
  engine::{CoreError, CoreOptions},
  formats::load_esxtop,
  models::{EsxtopData, FileFailure, LoadProgress, LoadStage, SessionInfo, Task, TaskKind},
  source::ByteSource,
};

/// Loads every source in parallel, one scoped thread per file.
///
/// Progress events from all workers are funnelled back to the calling thread, which is the
/// only one that ever runs `on_progress`. A failing file never stops its siblings; once all
/// of them are done, any failure fails the whole load.
pub(crate) fn load_all(
  sources: &[Box<dyn ByteSource>],
  options: &CoreOptions,
  cancelled: &AtomicBool,
  on_progress: &mut dyn FnMut(LoadProgress),
) -> Result<Vec<EsxtopData>, CoreError> {
  let (tx, rx) = unbounded::<LoadProgress>();

  let results: Vec<Result<EsxtopData, CoreError>> = thread::scope(|scope| {
    let handles: Vec<_> = sources
      .iter()
      .enumerate()
      .map(|(data_index, source)| {
        let tx = tx.clone();
        scope.spawn(move || {
          let file_name = source.name().to_string();
          load_esxtop(source.as_ref(), options, cancelled, &mut |stage, value| {
            let _ = tx.send(LoadProgress {
              data_index,
              file_name: file_name.clone(),
              stage,
              value,
            });
          })
        })
      })
      .collect();
    drop(tx);

    for progress in rx {
      on_progress(progress);
    }

    handles
      .into_iter()
      .map(|h| {
        h.join()
          .unwrap_or_else(|_| Err(CoreError::Task("load worker panicked".into())))
      })
      .collect()
  });

  if cancelled.load(Ordering::SeqCst) {
    return Err(CoreError::Cancelled);
  }

  let mut files = Vec::with_capacity(results.len());
  let mut failures = Vec::new();
  for (source, result) in sources.iter().zip(results) {
    match result {
      Ok(data) => files.push(data),
      Err(e) => {
        tracing::warn!(file = source.name(), error = %e, "capture failed to load");
        failures.push(FileFailure {
          file_name: source.name().to_string(),
          message: e.to_string(),
        });
      }
    }
  }
  if !failures.is_empty() {
    return Err(CoreError::Load { failures });
  }
  Ok(files)
}

#[derive(Debug, Clone)]
pub struct TaskManagerOptions {
  pub max_concurrent_tasks: usize,
}

#[derive(Clone)]
pub struct TaskManager {
  opts: TaskManagerOptions,
  tasks: Arc<Mutex<HashMap<String, Arc<TaskState>>>>,
  running: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct TaskState {
  id: String,
  kind: TaskKind,
  started_at_ms: i64,
  cancellable: bool,

  progress: AtomicU8,
  message: Mutex<String>,
  finished: AtomicBool,
  cancelled: AtomicBool,
  error: Mutex<Option<String>>,

  session: Mutex<Option<SessionInfo>>,
}

pub(crate) struct StartedTask {
  pub id: String,
}

/// Turns loaded files into a registered session.
pub(crate) type RegisterSession = Box<dyn FnOnce(Vec<EsxtopData>) -> SessionInfo + Send + 'static>;

impl TaskManager {
  pub fn new(opts: TaskManagerOptions) -> Self {
    Self {
      opts,
      tasks: Arc::new(Mutex::new(HashMap::new())),
      running: Arc::new(AtomicUsize::new(0)),
    }
  }

  pub(crate) fn start_load(
    &self,
    sources: Vec<Box<dyn ByteSource>>,
    options: CoreOptions,
    register: RegisterSession,
  ) -> Result<StartedTask, CoreError> {
    if sources.is_empty() {
      return Err(CoreError::InvalidArg("no files to load".into()));
    }

    // Concurrency limit
    let now_running = self.running.load(Ordering::SeqCst);
    if now_running >= self.opts.max_concurrent_tasks {
      return Err(CoreError::Task(format!(
        "too many concurrent tasks (max {})",
        self.opts.max_concurrent_tasks
      )));
    }
    self.running.fetch_add(1, Ordering::SeqCst);

    let id = Uuid::new_v4().to_string();
    let state = Arc::new(TaskState {
      id: id.clone(),
      kind: TaskKind::Load,
      started_at_ms: now_ms(),
      cancellable: true,
      progress: AtomicU8::new(0),
      message: Mutex::new(String::new()),
      finished: AtomicBool::new(false),
      cancelled: AtomicBool::new(false),
      error: Mutex::new(None),
      session: Mutex::new(None),
    });
    self.tasks.lock().insert(id.clone(), state.clone());

    let running = self.running.clone();
    tracing::info!(task = %id, files = sources.len(), "load task started");

    thread::spawn(move || {
      match run_load(&state, &sources, &options) {
        Ok(files) => {
          let info = register(files);
          *state.session.lock() = Some(info);
        }
        Err(e) => {
          tracing::warn!(task = %state.id, error = %e, "load task failed");
          *state.error.lock() = Some(e.to_string());
        }
      }
      state.message.lock().clear();
      state.progress.store(100, Ordering::SeqCst);
      state.finished.store(true, Ordering::SeqCst);
      running.fetch_sub(1, Ordering::SeqCst);
    });

    Ok(StartedTask { id })
  }

  pub fn get_task(&self, task_id: &str) -> Result<Task, String> {
    let t = self
      .tasks
      .lock()
      .get(task_id)
      .cloned()
      .ok_or_else(|| "unknown task".to_string())?;
    let err = t.error.lock().clone();
    let session = t.session.lock().clone();
    let message = t.message.lock().clone();
    Ok(Task {
      id: t.id.clone(),
      kind: t.kind.clone(),
      started_at_ms: t.started_at_ms,
      progress_0_100: t.progress.load(Ordering::SeqCst),
      message,
      cancellable: t.cancellable,
      finished: t.finished.load(Ordering::SeqCst),
      error: err,
      session,
    })
  }

  pub fn cancel_task(&self, task_id: &str) -> Result<(), String> {
    let t = self
      .tasks
      .lock()
      .get(task_id)
      .cloned()
      .ok_or_else(|| "unknown task".to_string())?;
    if !t.cancellable {
      return Err("task not cancellable".into());
    }
    t.cancelled.store(true, Ordering::SeqCst);
    Ok(())
  }
}

fn run_load(
  state: &TaskState,
  sources: &[Box<dyn ByteSource>],
  options: &CoreOptions,
) -> Result<Vec<EsxtopData>, CoreError> {
  // Overall progress is the mean of each file's body progress.
  let mut per_file = vec![0f64; sources.len()];
  load_all(sources, options, &state.cancelled, &mut |p| {
    if p.stage == LoadStage::Body {
      if let Some(slot) = per_file.get_mut(p.data_index) {
        *slot = p.value;
      }
      let mean = per_file.iter().sum::<f64>() / per_file.len() as f64;
      state.progress.store(mean.floor().clamp(0.0, 99.0) as u8, Ordering::SeqCst);
    }
    *state.message.lock() = p.message();
  })
}

fn now_ms() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as i64
}
