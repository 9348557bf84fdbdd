use percent_encoding::percent_decode_str;

use crate::{
  engine::CoreError,
  source::{read_chunk, ByteSource},
};

/// Reads the first line of `source` and splits it into header names.
///
/// Reads chunk by chunk and stops at the first `\n`; the reader is dropped right after,
/// so no further reads are issued. `on_bytes` receives the cumulative byte count after
/// every read.
///
/// The returned list is aligned with data columns: a field without a quoted name is kept
/// as an empty string instead of being removed.
pub(crate) fn read_header(
  source: &dyn ByteSource,
  chunk_size: usize,
  on_bytes: &mut dyn FnMut(u64),
) -> Result<Vec<String>, CoreError> {
  let line = read_first_line(source, chunk_size, on_bytes)?;
  Ok(parse_header_line(&line))
}

fn read_first_line(
  source: &dyn ByteSource,
  chunk_size: usize,
  on_bytes: &mut dyn FnMut(u64),
) -> Result<String, CoreError> {
  let mut reader = source.open()?;
  let mut chunk = vec![0u8; chunk_size.max(1)];
  let mut line: Vec<u8> = Vec::new();
  let mut loaded: u64 = 0;

  loop {
    let n = read_chunk(reader.as_mut(), &mut chunk).map_err(|e| CoreError::StreamRead(e.to_string()))?;
    if n == 0 {
      break;
    }
    loaded += n as u64;
    on_bytes(loaded);

    if let Some(pos) = chunk[..n].iter().position(|b| *b == b'\n') {
      line.extend_from_slice(&chunk[..pos]);
      break;
    }
    line.extend_from_slice(&chunk[..n]);
  }
  drop(reader);

  if line.ends_with(b"\r") {
    line.pop();
  }
  if line.is_empty() {
    return Err(CoreError::EmptyInput);
  }
  tracing::debug!(source = source.name(), bytes = loaded, "header line read");
  Ok(String::from_utf8_lossy(&line).to_string())
}

/// Splits a header line on `,` and keeps the text between the first and second `"` of
/// each field, URI-decoded.
pub fn parse_header_line(line: &str) -> Vec<String> {
  let line = line.strip_prefix('\u{feff}').unwrap_or(line);
  line
    .split(',')
    .map(|field| {
      let quoted = field.trim().split('"').nth(1).unwrap_or("");
      match decode_uri(quoted) {
        Ok(decoded) => decoded,
        Err(e) => {
          tracing::warn!(field = quoted, error = %e, "header field kept undecoded");
          quoted.to_string()
        }
      }
    })
    .collect()
}

/// Bytes whose escapes are left as written, so a decoded name never gains a delimiter.
const URI_RESERVED: &[u8] = b";/?:@&=+$,#";

/// Percent-decodes `s` the way `decodeURI` does: escapes of reserved characters are kept
/// verbatim. A stray `%` or an escape sequence that is not UTF-8 is a decode error.
pub(crate) fn decode_uri(s: &str) -> Result<String, CoreError> {
  let bytes = s.as_bytes();
  let mut out = String::with_capacity(s.len());
  let mut run_start = 0usize;
  let mut i = 0usize;
  while i < bytes.len() {
    if bytes[i] != b'%' {
      i += 1;
      continue;
    }
    let escaped = s
      .get(i + 1..i + 3)
      .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
      .and_then(|hex| u8::from_str_radix(hex, 16).ok())
      .ok_or_else(|| CoreError::Decode(format!("malformed escape at byte {i}")))?;
    if URI_RESERVED.contains(&escaped) {
      out.push_str(&decode_run(&s[run_start..i])?);
      out.push_str(&s[i..i + 3]);
      run_start = i + 3;
    }
    i += 3;
  }
  out.push_str(&decode_run(&s[run_start..])?);
  Ok(out)
}

fn decode_run(run: &str) -> Result<String, CoreError> {
  percent_decode_str(run)
    .decode_utf8()
    .map(|c| c.into_owned())
    .map_err(|e| CoreError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quoted_text_is_extracted_and_unquoted_fields_are_blank() {
    let fields = parse_header_line(r#""(PDH-CSV 4.0) (UTC)(0)", "\h\Memory\Free MBytes",plain,"a%20b""#);
    assert_eq!(
      fields,
      vec!["(PDH-CSV 4.0) (UTC)(0)", "\\h\\Memory\\Free MBytes", "", "a b"]
    );
  }

  #[test]
  fn malformed_escape_falls_back_to_raw() {
    assert!(decode_uri("100%").is_err());
    assert_eq!(parse_header_line(r#""100%""#), vec!["100%"]);
    assert_eq!(parse_header_line(r#""%E0%A4%A""#), vec!["%E0%A4%A"]);
    assert_eq!(parse_header_line(r#""%+1""#), vec!["%+1"]);
  }

  #[test]
  fn reserved_escapes_stay_encoded() {
    assert_eq!(
      parse_header_line(r#""\h\a%2Fb%23c%2Cd%20e""#),
      vec!["\\h\\a%2Fb%23c%2Cd e"]
    );
    assert_eq!(decode_uri("%3b%3A%40%26%3D%2B%24%3F").unwrap(), "%3b%3A%40%26%3D%2B%24%3F");
    assert_eq!(decode_uri("%E2%82%AC%2F%e2%82%ac").unwrap(), "\u{20ac}%2F\u{20ac}");
  }
}
