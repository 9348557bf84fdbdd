use std::{sync::atomic::AtomicBool, time::Instant};

use crate::{
  engine::{CoreError, CoreOptions},
  models::{EsxtopData, LoadStage},
  source::ByteSource,
  tree::build_field_tree_with_progress,
};

/// Segments that carry parentheses of their own and must stay whole.
const UNSPLIT_PHRASES: [&str; 5] = [
  "Average Packet Size",
  "Link Speed",
  "Memory Overcommit",
  "Cpu Load",
  "Effective Min",
];

/// Categories whose segments split at the first colon.
const FIRST_COLON_CATEGORIES: [&str; 4] = [
  "Virtual Disk",
  "Network Port",
  "Interrupt Cookie",
  "Physical Disk",
];

const VCPU_CATEGORY: &str = "Vcpu";

/// Header columns before this index are sample metadata, never metrics.
pub const FIRST_METRIC_COLUMN: usize = 1;

/// A decomposed header, tagged with the column it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricPath {
  pub column: usize,
  pub segments: Vec<String>,
}

/// Decomposes every metric header (column 0 and blank headers are skipped).
pub fn parse_metric_paths(headers: &[String]) -> Vec<MetricPath> {
  headers
    .iter()
    .enumerate()
    .skip(FIRST_METRIC_COLUMN)
    .filter(|(_, h)| !h.is_empty())
    .map(|(column, h)| MetricPath {
      column,
      segments: parse_metric_path(h),
    })
    .collect()
}

/// Decomposes one raw header into path segments.
///
/// `\h\Group Cpu(1234:vm)\% Used` becomes `["h", "Group Cpu", "1234:vm", "% Used"]`;
/// categories listed above additionally split their segments on colons.
pub fn parse_metric_path(header: &str) -> Vec<String> {
  let segments: Vec<&str> = header.split('\\').filter(|s| !s.is_empty()).collect();

  let mut split: Vec<String> = Vec::with_capacity(segments.len() + 1);
  for seg in segments {
    if UNSPLIT_PHRASES.iter().any(|p| seg.contains(p)) {
      split.push(seg.to_string());
    } else {
      split.extend(split_at_first_paren(seg));
    }
  }

  let category = split.get(1).cloned().unwrap_or_default();
  if category == VCPU_CATEGORY {
    split.iter().flat_map(|s| split_at_second_colon(s)).collect()
  } else if FIRST_COLON_CATEGORIES.contains(&category.as_str()) {
    split.iter().flat_map(|s| split_at_first_colon(s)).collect()
  } else {
    split
  }
}

// "test(aaa)" -> ["test", "aaa"]
fn split_at_first_paren(seg: &str) -> Vec<String> {
  let parts: Vec<&str> = match seg.find('(') {
    Some(i) if i > 0 => vec![&seg[..i], &seg[i + 1..]],
    _ => vec![seg],
  };
  parts.into_iter().map(strip_first_close_run).collect()
}

/// Removes the first run of `)` characters.
fn strip_first_close_run(s: &str) -> String {
  match s.find(')') {
    Some(start) => {
      let end = s[start..]
        .find(|c: char| c != ')')
        .map(|n| start + n)
        .unwrap_or(s.len());
      format!("{}{}", &s[..start], &s[end..])
    }
    None => s.to_string(),
  }
}

// "1234:sh.12345:12345:sh" -> ["1234:sh.12345", "12345:sh"]
fn split_at_second_colon(s: &str) -> Vec<String> {
  let mut colons = s.match_indices(':').map(|(i, _)| i);
  match (colons.next(), colons.next()) {
    (Some(_), Some(second)) => vec![s[..second].to_string(), s[second + 1..].to_string()],
    _ => vec![s.to_string()],
  }
}

// "vmhba0:C0:T0:L0" -> ["vmhba0", "C0:T0:L0"]
fn split_at_first_colon(s: &str) -> Vec<String> {
  match s.find(':') {
    Some(i) if i > 0 => vec![s[..i].to_string(), s[i + 1..].to_string()],
    _ => vec![s.to_string()],
  }
}

/// Loads one capture: header line, field tree, then the body without its header row.
pub(crate) fn load_esxtop(
  source: &dyn ByteSource,
  options: &CoreOptions,
  cancelled: &AtomicBool,
  on_progress: &mut dyn FnMut(LoadStage, f64),
) -> Result<EsxtopData, CoreError> {
  let started = Instant::now();
  tracing::info!(file = source.name(), size = source.size(), "loading capture");

  let metric_field = super::read_header(source, options.chunk_size, &mut |bytes| {
    on_progress(LoadStage::Header, bytes as f64)
  })?;

  let metric_field_tree = build_field_tree_with_progress(&metric_field, &mut |pct| {
    on_progress(LoadStage::Tree, pct)
  });

  let metric_data = super::ingest_body(source, true, options, cancelled, &mut |pct| {
    on_progress(LoadStage::Body, pct)
  })?;

  tracing::info!(
    file = source.name(),
    columns = metric_field.len(),
    rows = metric_data.len(),
    elapsed_ms = started.elapsed().as_millis() as u64,
    "capture loaded"
  );
  Ok(EsxtopData {
    file_name: source.name().to_string(),
    metric_field,
    metric_field_tree,
    metric_data,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paren_split_only_at_first_open_paren() {
    assert_eq!(split_at_first_paren("Foo(bar)"), vec!["Foo", "bar"]);
    assert_eq!(split_at_first_paren("a(b(c))"), vec!["a", "b(c"]);
    assert_eq!(split_at_first_paren("(x)"), vec!["(x"]);
    assert_eq!(split_at_first_paren("plain"), vec!["plain"]);
  }

  #[test]
  fn unsplit_phrases_stay_whole() {
    let path = parse_metric_path("\\h\\Network Port(vSwitch0:1:vmk0)\\Average Packet Size Transmitted (Bytes)");
    assert_eq!(
      path,
      vec![
        "h",
        "Network Port",
        "vSwitch0",
        "1:vmk0",
        "Average Packet Size Transmitted (Bytes)"
      ]
    );
  }

  #[test]
  fn colon_helpers_leave_segments_without_delimiters() {
    assert_eq!(split_at_second_colon("1234:sh"), vec!["1234:sh"]);
    assert_eq!(split_at_second_colon("a:b:c:d"), vec!["a:b", "c:d"]);
    assert_eq!(split_at_first_colon(":lead"), vec![":lead"]);
    assert_eq!(split_at_first_colon("none"), vec!["none"]);
  }
}
