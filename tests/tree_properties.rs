use std::borrow::Cow;

use esxtop_core::{
  build_field_tree, file_groups, filter_tree, flatten_forest, parse_header_line, parse_metric_path, tokenize_line,
  visible_forest, Cell, CoreEngine, CoreOptions, EsxtopData, ExpansionState, MemorySource, RowTokenizer, TreeNode,
  FILE_GROUP_INDEX, STRUCTURAL_INDEX,
};
use proptest::prelude::*;

fn headers(raw: &[&str]) -> Vec<String> {
  raw.iter().map(|s| s.to_string()).collect()
}

fn sample_tree() -> TreeNode {
  build_field_tree(&headers(&[
    "(PDH-CSV 4.0) (UTC)(0)",
    "\\h\\Memory\\Free MBytes",
    "\\h\\Memory\\Kernel MBytes",
    "\\h\\Group Cpu(1:system)\\% Used",
    "\\h\\Group Cpu(2:idle)\\% Used",
    "\\h\\Vcpu(1234:sh.12345:12345:sh)\\% Ready",
    "\\h\\Physical Disk(vmhba0:C0:T0:L0)\\Reads/sec",
  ]))
}

#[test]
fn shared_prefixes_fold_into_one_branch() {
  let tree = build_field_tree(&headers(&["ts", "\\A\\B(c)", "\\A\\B(d)"]));
  assert_eq!(tree.id, "root");
  assert_eq!(tree.field_index, STRUCTURAL_INDEX);
  assert_eq!(tree.children.len(), 1);

  let a = &tree.children[0];
  assert_eq!((a.id.as_str(), a.field_index), ("A", -1));
  let b = &a.children[0];
  assert_eq!((b.id.as_str(), b.field_index), ("B", -1));
  let leaves: Vec<(&str, i64)> = b.children.iter().map(|c| (c.id.as_str(), c.field_index)).collect();
  assert_eq!(leaves, vec![("c", 1), ("d", 2)]);
  assert_eq!(b.children[1].path, "\\A\\B\\d");
}

#[test]
fn header_without_backslash_is_a_single_segment() {
  assert_eq!(parse_metric_path("Memory"), vec!["Memory"]);
  let tree = build_field_tree(&headers(&["ts", "Memory"]));
  assert_eq!(tree.children[0].id, "Memory");
  assert_eq!(tree.children[0].field_index, 1);
}

#[test]
fn vcpu_and_disk_segments_split_on_colons() {
  assert_eq!(
    parse_metric_path("\\host-1\\Vcpu\\1234:sh.12345:12345:sh"),
    vec!["host-1", "Vcpu", "1234:sh.12345", "12345:sh"]
  );
  assert_eq!(
    parse_metric_path("\\h\\Physical Disk(vmhba0:C0:T0:L0)\\Reads/sec"),
    vec!["h", "Physical Disk", "vmhba0", "C0:T0:L0", "Reads/sec"]
  );
  assert_eq!(
    parse_metric_path("\\h\\Vcpu(1:2)\\% Used"),
    vec!["h", "Vcpu", "1:2", "% Used"]
  );
}

#[test]
fn duplicate_header_binds_the_first_column() {
  let tree = build_field_tree(&headers(&["ts", "\\h\\X", "\\h\\X"]));
  assert_eq!(tree.children[0].children.len(), 1);
  assert_eq!(tree.children[0].children[0].field_index, 1);
}

#[test]
fn metadata_column_and_blank_headers_are_skipped() {
  let fields = parse_header_line(r#""\h\First",,"\h\Second""#);
  assert_eq!(fields, vec!["\\h\\First", "", "\\h\\Second"]);
  let tree = build_field_tree(&fields);
  let ids: Vec<&str> = tree.children[0].children.iter().map(|c| c.id.as_str()).collect();
  assert_eq!(ids, vec!["Second"]);
  assert_eq!(tree.children[0].children[0].field_index, 2);
}

#[test]
fn short_keywords_leave_the_tree_unchanged() {
  let tree = sample_tree();
  assert_eq!(*filter_tree(&tree, ""), tree);
  assert_eq!(*filter_tree(&tree, "a"), tree);
}

#[test]
fn lowercase_keyword_matches_any_case_but_mixed_case_is_exact() {
  let tree = sample_tree();
  let loose = filter_tree(&tree, "memory");
  assert_eq!(loose.children[0].children[0].id, "Memory");

  let strict = filter_tree(&tree, "MEMORY");
  assert!(strict.children.is_empty());
}

#[test]
fn matched_subtree_keeps_paths_and_pruned_ancestors_lose_them() {
  let tree = sample_tree();
  let filtered = filter_tree(&tree, "Group");
  let h = &filtered.children[0];
  assert_eq!(h.path, "");
  assert_eq!(h.children.len(), 1);
  let group = &h.children[0];
  assert_eq!(group.path, "\\h\\Group Cpu");
  assert_eq!(group.children.len(), 2);
}

fn loaded_files(names: &[&str]) -> Vec<EsxtopData> {
  names
    .iter()
    .map(|name| EsxtopData {
      file_name: name.to_string(),
      metric_field: Vec::new(),
      metric_field_tree: sample_tree(),
      metric_data: Vec::new(),
    })
    .collect()
}

#[test]
fn collapsed_forest_shows_one_row_per_file() {
  let files = loaded_files(&["a.csv", "b.csv", "c.csv"]);
  let groups = file_groups(&files, "");
  let rows = flatten_forest(&groups, &ExpansionState::new());
  let labels: Vec<&str> = rows.iter().map(|r| r.label).collect();
  assert_eq!(labels, vec!["a.csv", "b.csv", "c.csv"]);
  assert!(rows.iter().all(|r| r.depth == 0 && !r.is_selectable && r.is_expandable));
  assert!(rows.iter().all(|r| r.field_index == FILE_GROUP_INDEX));
}

#[test]
fn unfiltered_groups_borrow_the_loaded_trees() {
  let files = loaded_files(&["a.csv", "b.csv"]);
  let groups = file_groups(&files, "");
  for (group, data) in groups.iter().zip(&files) {
    assert!(matches!(group.tree, Cow::Borrowed(_)));
    assert!(std::ptr::eq(group.children(), data.metric_field_tree.children.as_slice()));
  }

  let state = ExpansionState::new().toggled("1:\\");
  let rows = flatten_forest(&groups, &state);
  let h = &files[1].metric_field_tree.children[0];
  assert_eq!(rows[2].label, "h");
  assert!(std::ptr::eq(rows[2].label, h.id.as_str()));

  let filtered = file_groups(&files, "Group");
  assert!(matches!(filtered[0].tree, Cow::Owned(_)));
  assert_eq!(filtered[0].to_node(), visible_forest(&files, "Group")[0]);
}

#[test]
fn expansion_is_scoped_per_file() {
  let files = loaded_files(&["a.csv", "b.csv"]);
  let groups = file_groups(&files, "");
  let state = ExpansionState::new().toggled("1:\\").toggled("1:\\h").toggled("0:\\h");
  let rows = flatten_forest(&groups, &state);
  let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
  assert_eq!(
    ids,
    vec![
      "0:\\",
      "1:\\",
      "1:\\h",
      "1:\\h\\Memory",
      "1:\\h\\Group Cpu",
      "1:\\h\\Vcpu",
      "1:\\h\\Physical Disk",
    ]
  );

  let collapsed = state.toggled("1:\\h");
  assert_eq!(flatten_forest(&groups, &collapsed).len(), 3);
  assert!(state.is_expanded("1:\\h"));
}

#[test]
fn body_rows_round_trip_with_and_without_header_skip() {
  let eng = CoreEngine::new(CoreOptions::default());
  let body = "\"h1\",\"h2\"\n\"r1\",\"1\"\n\"r2\",\"NaN\"\n";

  let kept = eng.ingest_body(&MemorySource::new("x.csv", body), false, |_| {}).unwrap();
  assert_eq!(kept.len(), 3);
  assert_eq!(kept[0], vec![Cell::Text("h1".into()), Cell::Text("h2".into())]);

  let skipped = eng.ingest_body(&MemorySource::new("x.csv", body), true, |_| {}).unwrap();
  assert_eq!(
    skipped,
    vec![
      vec![Cell::Text("r1".into()), Cell::Number(1.0)],
      vec![Cell::Text("r2".into()), Cell::Missing],
    ]
  );
}

fn keyword() -> impl Strategy<Value = String> {
  prop_oneof![
    "[a-zA-Z% ]{0,6}",
    Just("Group".to_string()),
    Just("mbytes".to_string()),
    Just("sh".to_string()),
  ]
}

fn body_text() -> impl Strategy<Value = String> {
  prop::collection::vec(
    prop::collection::vec("[a-z0-9.é ]{0,5}", 1..4),
    0..8,
  )
  .prop_map(|rows| {
    rows
      .iter()
      .map(|cells| {
        let quoted: Vec<String> = cells.iter().map(|c| format!("\"{c}\"")).collect();
        format!("{}\r\n", quoted.join(","))
      })
      .collect()
  })
}

proptest! {
  #[test]
  fn filtering_is_idempotent(kw in keyword()) {
    let tree = sample_tree();
    let once = filter_tree(&tree, &kw).into_owned();
    let twice = filter_tree(&once, &kw).into_owned();
    prop_assert_eq!(once, twice);
  }

  #[test]
  fn chunk_boundaries_do_not_change_rows(
    body in body_text(),
    max_read in 1usize..16,
    chunk_size in 1usize..32,
    skip in any::<bool>(),
  ) {
    let whole = CoreEngine::new(CoreOptions::default())
      .ingest_body(&MemorySource::new("w.csv", body.clone()), skip, |_| {})
      .unwrap();

    let eng = CoreEngine::new(CoreOptions {
      chunk_size,
      batch_rows: 3,
      queue_capacity: 1,
      ..CoreOptions::default()
    });
    let mut last = 0.0;
    let pieces = eng
      .ingest_body(&MemorySource::new("p.csv", body).with_max_read(max_read), skip, |pct| {
        assert!(pct >= last);
        last = pct;
      })
      .unwrap();
    prop_assert_eq!(whole, pieces);
  }

  #[test]
  fn tokenizer_matches_line_by_line_split(body in body_text(), cut_a in 0usize..64, cut_b in 0usize..64) {
    let bytes = body.as_bytes();
    let mut cuts = vec![cut_a.min(bytes.len()), cut_b.min(bytes.len())];
    cuts.sort_unstable();

    let mut got = Vec::new();
    let mut tokenizer = RowTokenizer::new(false, 2);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
      tokenizer.push(&bytes[start..cut], &mut |batch| got.extend(batch));
      start = cut;
    }
    tokenizer.finish(&mut |batch| got.extend(batch));

    let expected: Vec<Vec<String>> = body.lines().map(tokenize_line).collect();
    prop_assert_eq!(got, expected);
  }
}
