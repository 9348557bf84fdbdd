use crate::models::{cell_at, Cell, EsxtopData, Series, SeriesSet, TreeNode};

/// Column holding the sample timestamp of every row.
const TIMESTAMP_COLUMN: usize = 0;

/// Extracts the series to plot for `node`.
///
/// A node bound to a column gives a single series titled with its raw header. A grouping
/// node gives one series per direct leaf child bound to a metric column, titled with the
/// node's label.
pub fn series_for_node(data: &EsxtopData, node: &TreeNode) -> SeriesSet {
  let x: Vec<Cell> = data
    .metric_data
    .iter()
    .map(|row| cell_at(row, TIMESTAMP_COLUMN).clone())
    .collect();

  match node.column() {
    Some(column) => {
      let title = data
        .metric_field
        .get(column)
        .cloned()
        .unwrap_or_else(|| node.id.clone());
      SeriesSet {
        title,
        x,
        series: vec![column_series(data, &node.id, column)],
      }
    }
    None => {
      let series = node
        .children
        .iter()
        .filter(|c| c.is_leaf())
        .filter_map(|c| c.column().filter(|&col| col > TIMESTAMP_COLUMN).map(|col| (c, col)))
        .map(|(c, col)| column_series(data, &c.id, col))
        .collect();
      SeriesSet {
        title: node.id.clone(),
        x,
        series,
      }
    }
  }
}

fn column_series(data: &EsxtopData, name: &str, column: usize) -> Series {
  Series {
    name: name.to_string(),
    column,
    y: data
      .metric_data
      .iter()
      .map(|row| cell_at(row, column).clone())
      .collect(),
  }
}
