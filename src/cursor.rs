use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::engine::CoreError;

/// Position inside a flattened row list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct Cursor {
  pub offset: u64,
}

pub(crate) fn encode_cursor(c: Cursor) -> Result<String, CoreError> {
  let json = serde_json::to_vec(&c).map_err(|e| CoreError::BadCursor(e.to_string()))?;
  Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

pub(crate) fn decode_cursor(token: Option<&str>) -> Result<Cursor, CoreError> {
  match token {
    None => Ok(Cursor { offset: 0 }),
    Some(t) if t.is_empty() => Ok(Cursor { offset: 0 }),
    Some(t) => {
      let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(t)
        .map_err(|e| CoreError::BadCursor(e.to_string()))?;
      let c: Cursor = serde_json::from_slice(&bytes).map_err(|e| CoreError::BadCursor(e.to_string()))?;
      Ok(c)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_round_trips_and_garbage_is_rejected() {
    let c = Cursor { offset: 40 };
    let token = encode_cursor(c).unwrap();
    assert_eq!(decode_cursor(Some(&token)).unwrap(), c);
    assert!(matches!(decode_cursor(Some("%%%")), Err(CoreError::BadCursor(_))));
  }
}
