use std::path::PathBuf;

use esxtop_core::{CoreEngine, CoreOptions, ExpansionState};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), String> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let paths: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
  if paths.is_empty() {
    return Err("usage: cargo run --example smoke_open -- <capture.csv>...".to_string());
  }

  let eng = CoreEngine::new(CoreOptions {
    default_page_size: 20,
    ..CoreOptions::default()
  });

  let session = eng
    .open_files_with_progress(&paths, |p| eprintln!("{}", p.message()))
    .map_err(|e| e.to_string())?;
  for f in &session.files {
    println!("file={} columns={} rows={}", f.file_name, f.columns, f.rows);
  }

  let state = (0..session.files.len()).fold(ExpansionState::new(), |s, i| s.toggled(&format!("{i}:\\")));
  let page = eng
    .visible_rows(&session.session_id, "", &state, None, 0)
    .map_err(|e| e.to_string())?;
  println!("visible={} reached_end={}", page.total_rows, page.reached_end);
  for row in &page.rows {
    println!("{}{}", "  ".repeat(row.depth), row.label);
  }
  Ok(())
}
