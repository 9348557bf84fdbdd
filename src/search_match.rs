/// Keywords shorter than this leave the tree untouched.
pub const MIN_FILTER_CHARS: usize = 2;

/// A filter keyword ready for matching against node labels.
///
/// All-lowercase keywords match case-insensitively; a keyword with any uppercase
/// character matches case-sensitively.
#[derive(Debug, Clone)]
pub(crate) struct PreparedKeyword {
  needle: String,
  case_sensitive: bool,
}

impl PreparedKeyword {
  /// `None` when the keyword is too short to filter with.
  pub(crate) fn new(keyword: &str) -> Option<Self> {
    if keyword.chars().count() < MIN_FILTER_CHARS {
      return None;
    }
    let case_sensitive = keyword.to_lowercase() != keyword;
    Some(Self {
      needle: keyword.to_string(),
      case_sensitive,
    })
  }

  pub(crate) fn matches(&self, label: &str) -> bool {
    if self.case_sensitive {
      label.contains(&self.needle)
    } else {
      label.to_lowercase().contains(&self.needle)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn case_policy_follows_keyword() {
    let lower = PreparedKeyword::new("vcpu").unwrap();
    assert!(lower.matches("Vcpu"));
    let mixed = PreparedKeyword::new("VCpu").unwrap();
    assert!(!mixed.matches("Vcpu"));
    assert!(mixed.matches("VCpu 0"));
    assert!(PreparedKeyword::new("v").is_none());
  }
}
