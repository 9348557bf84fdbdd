use std::{
  io::Read,
  ops::ControlFlow,
  sync::atomic::{AtomicBool, Ordering},
  thread,
};

use crossbeam_channel::{bounded, Sender};

use crate::{
  engine::{CoreError, CoreOptions},
  models::{Cell, Row},
  source::{read_chunk, ByteSource},
};

/// One tokenized record, before cell classification.
pub type RawRow = Vec<String>;

/// Incremental line splitter for esxtop bodies.
///
/// Bytes are pushed chunk by chunk; the tail of a chunk that does not end in `\n` is
/// carried over to the next push. Splitting happens on bytes, so a chunk boundary that
/// falls inside a multi-byte character is harmless.
pub struct RowTokenizer {
  carry: Vec<u8>,
  first_row_done: bool,
  batch: Vec<RawRow>,
  batch_rows: usize,
}

impl RowTokenizer {
  pub fn new(skip_first_row: bool, batch_rows: usize) -> Self {
    Self {
      carry: Vec::new(),
      first_row_done: !skip_first_row,
      batch: Vec::new(),
      batch_rows: batch_rows.max(1),
    }
  }

  /// Feeds one chunk. `emit` is called with every batch that reached the size threshold.
  pub fn push(&mut self, chunk: &[u8], emit: &mut dyn FnMut(Vec<RawRow>)) {
    let scan_from = self.carry.len();
    self.carry.extend_from_slice(chunk);
    let last_nl = match self.carry[scan_from..].iter().rposition(|b| *b == b'\n') {
      Some(p) => scan_from + p,
      None => return,
    };

    let rest = self.carry.split_off(last_nl + 1);
    let complete = std::mem::replace(&mut self.carry, rest);
    for line in complete[..last_nl].split(|b| *b == b'\n') {
      self.take_line(line, emit);
    }
  }

  /// Flushes the trailing partial line (if any) and the last, possibly short, batch.
  pub fn finish(mut self, emit: &mut dyn FnMut(Vec<RawRow>)) {
    // A leftover with no processed line before it is the header remnant of a body-less file.
    if !self.carry.is_empty() && self.first_row_done {
      let line = std::mem::take(&mut self.carry);
      self.take_line(&line, emit);
    }
    if !self.batch.is_empty() {
      emit(std::mem::take(&mut self.batch));
    }
  }

  fn take_line(&mut self, line: &[u8], emit: &mut dyn FnMut(Vec<RawRow>)) {
    if !self.first_row_done {
      self.first_row_done = true;
      return;
    }
    self.batch.push(tokenize_line(&String::from_utf8_lossy(line)));
    if self.batch.len() >= self.batch_rows {
      emit(std::mem::take(&mut self.batch));
    }
  }
}

/// Splits one line on `,` and drops the first and last character of every field.
pub fn tokenize_line(line: &str) -> RawRow {
  let line = line.strip_suffix('\r').unwrap_or(line);
  line.split(',').map(|f| strip_wrapping(f).to_string()).collect()
}

fn strip_wrapping(field: &str) -> &str {
  let mut chars = field.chars();
  chars.next();
  chars.next_back();
  chars.as_str()
}

/// Classifies a raw cell: blank and `nan` (any case) are missing, numerics are numbers,
/// anything else stays text.
pub fn sanitize_cell(raw: &str) -> Cell {
  let t = raw.trim();
  if t.is_empty() || t.eq_ignore_ascii_case("nan") {
    return Cell::Missing;
  }
  match t.parse::<f64>() {
    Ok(n) if n.is_nan() => Cell::Missing,
    Ok(n) => Cell::Number(n),
    Err(_) => Cell::Text(raw.to_string()),
  }
}

pub fn sanitize_row(raw: &[String]) -> Row {
  raw.iter().map(|s| sanitize_cell(s)).collect()
}

enum BodyEvent {
  Progress(f64),
  Batch(Vec<RawRow>),
  Failed(String),
}

/// Streams the body of `source` to `on_batch`, batch by batch and in file order.
///
/// A reader thread pushes tokenized batches onto a bounded queue; the calling thread
/// drains it, classifies cells and hands each batch over. Returning `Break` from
/// `on_batch` (or raising `cancelled`) stops further reads. Returns the number of rows
/// delivered.
pub(crate) fn ingest_body_batches(
  source: &dyn ByteSource,
  skip_first_row: bool,
  options: &CoreOptions,
  cancelled: &AtomicBool,
  on_progress: &mut dyn FnMut(f64),
  on_batch: &mut dyn FnMut(Vec<Row>) -> ControlFlow<()>,
) -> Result<u64, CoreError> {
  let reader = source.open()?;
  let total = source.size();
  let (tx, rx) = bounded::<BodyEvent>(options.queue_capacity.max(1));

  thread::scope(|scope| {
    scope.spawn(move || produce(reader, total, skip_first_row, options, cancelled, tx));

    let mut delivered: u64 = 0;
    for event in rx {
      if cancelled.load(Ordering::SeqCst) {
        return Err(CoreError::Cancelled);
      }
      match event {
        BodyEvent::Progress(pct) => on_progress(pct),
        BodyEvent::Batch(raw) => {
          delivered += raw.len() as u64;
          tracing::debug!(rows = raw.len(), source = source.name(), "batch received");
          let rows: Vec<Row> = raw.iter().map(|r| sanitize_row(r)).collect();
          if on_batch(rows).is_break() {
            return Ok(delivered);
          }
        }
        BodyEvent::Failed(msg) => return Err(CoreError::StreamRead(msg)),
      }
    }
    if cancelled.load(Ordering::SeqCst) {
      return Err(CoreError::Cancelled);
    }
    Ok(delivered)
  })
}

/// Collects the whole body into memory.
pub(crate) fn ingest_body(
  source: &dyn ByteSource,
  skip_first_row: bool,
  options: &CoreOptions,
  cancelled: &AtomicBool,
  on_progress: &mut dyn FnMut(f64),
) -> Result<Vec<Row>, CoreError> {
  let mut rows = Vec::new();
  ingest_body_batches(source, skip_first_row, options, cancelled, on_progress, &mut |batch| {
    rows.extend(batch);
    ControlFlow::Continue(())
  })?;
  Ok(rows)
}

fn produce(
  mut reader: Box<dyn Read + Send + '_>,
  total: u64,
  skip_first_row: bool,
  options: &CoreOptions,
  cancelled: &AtomicBool,
  tx: Sender<BodyEvent>,
) {
  let mut chunk = vec![0u8; options.chunk_size.max(1)];
  let mut tokenizer = RowTokenizer::new(skip_first_row, options.batch_rows);
  let mut ready: Vec<Vec<RawRow>> = Vec::new();
  let mut loaded: u64 = 0;

  loop {
    if cancelled.load(Ordering::SeqCst) {
      return;
    }
    let n = match read_chunk(reader.as_mut(), &mut chunk) {
      Ok(n) => n,
      Err(e) => {
        let _ = tx.send(BodyEvent::Failed(e.to_string()));
        return;
      }
    };
    if n == 0 {
      break;
    }
    loaded += n as u64;
    if total > 0 {
      let pct = ((loaded as f64 / total as f64) * 100.0).min(100.0);
      if tx.send(BodyEvent::Progress(pct)).is_err() {
        return;
      }
    }

    tokenizer.push(&chunk[..n], &mut |batch| ready.push(batch));
    for batch in ready.drain(..) {
      if tx.send(BodyEvent::Batch(batch)).is_err() {
        return;
      }
    }
  }

  tokenizer.finish(&mut |batch| ready.push(batch));
  for batch in ready.drain(..) {
    if tx.send(BodyEvent::Batch(batch)).is_err() {
      return;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn tokenize_all(input: &[u8], skip_first_row: bool, cuts: &[usize]) -> Vec<RawRow> {
    let mut out = Vec::new();
    let mut t = RowTokenizer::new(skip_first_row, 2);
    let mut start = 0;
    for cut in cuts.iter().copied().chain(std::iter::once(input.len())) {
      t.push(&input[start..cut], &mut |b| out.extend(b));
      start = cut;
    }
    t.finish(&mut |b| out.extend(b));
    out
  }

  #[test]
  fn short_fields_unquote_to_empty() {
    assert_eq!(tokenize_line("\"a\",x,,\"\"\r"), vec!["a", "", "", ""]);
  }

  #[test]
  fn cut_inside_multibyte_char_is_harmless() {
    let input = "\"é\",\"ü\"\n\"ß\",\"1\"\n".as_bytes();
    let whole = tokenize_all(input, false, &[]);
    let cut = tokenize_all(input, false, &[2, 9]);
    assert_eq!(whole, cut);
    assert_eq!(whole[0], vec!["é", "ü"]);
  }

  #[test]
  fn unterminated_last_line_is_kept() {
    let rows = tokenize_all(b"\"h\"\n\"1\",\"2\"", true, &[]);
    assert_eq!(rows, vec![vec!["1".to_string(), "2".to_string()]]);
  }

  #[test]
  fn header_remnant_without_body_is_dropped() {
    let rows = tokenize_all(b"\"h1\",\"h2\"", true, &[]);
    assert!(rows.is_empty());
  }

  #[test]
  fn sentinels_and_numbers() {
    assert_eq!(sanitize_cell("NaN"), Cell::Missing);
    assert_eq!(sanitize_cell("nan"), Cell::Missing);
    assert_eq!(sanitize_cell(""), Cell::Missing);
    assert_eq!(sanitize_cell("12.5"), Cell::Number(12.5));
    assert_eq!(sanitize_cell("0"), Cell::Number(0.0));
    assert_eq!(
      sanitize_cell("01/02/2024 10:00:00"),
      Cell::Text("01/02/2024 10:00:00".into())
    );
  }
}
