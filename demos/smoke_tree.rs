use std::path::PathBuf;

use esxtop_core::{filter_tree, CoreEngine, CoreOptions, FileSource, TreeNode};

fn print_tree(node: &TreeNode, depth: usize) {
  let bound = node.column().map(|c| format!(" [{c}]")).unwrap_or_default();
  println!("{}{}{}", "  ".repeat(depth), node.id, bound);
  for child in &node.children {
    print_tree(child, depth + 1);
  }
}

fn main() -> Result<(), String> {
  let mut args = std::env::args().skip(1);
  let path = args
    .next()
    .map(PathBuf::from)
    .ok_or_else(|| "usage: cargo run --example smoke_tree -- <capture.csv> [keyword]".to_string())?;
  let keyword = args.next().unwrap_or_default();

  let eng = CoreEngine::new(CoreOptions::default());
  let source = FileSource::new(&path).map_err(|e| e.to_string())?;
  let headers = eng.extract_header(&source, |_| {}).map_err(|e| e.to_string())?;
  let tree = eng.build_tree(&headers);
  println!("headers={} nodes={} leaves={}", headers.len(), tree.node_count(), tree.leaf_count());

  print_tree(&filter_tree(&tree, &keyword), 0);
  Ok(())
}
