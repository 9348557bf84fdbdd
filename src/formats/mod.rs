mod csv;
mod esxtop;
mod header;

pub(crate) use self::csv::{ingest_body, ingest_body_batches};
pub use self::csv::{sanitize_cell, tokenize_line, RawRow, RowTokenizer};
pub(crate) use self::esxtop::load_esxtop;
pub use self::esxtop::{parse_metric_path, parse_metric_paths, MetricPath, FIRST_METRIC_COLUMN};
pub(crate) use self::header::read_header;
pub use self::header::parse_header_line;
