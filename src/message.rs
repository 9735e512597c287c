use std::fmt;

/// Placeholder id given to every message. Nothing downstream reads it.
pub const SENTINEL_ID: i64 = -1;

const BULLET: &str = "- ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
  pub id:      i64,
  pub subject: String,
  pub body:    Vec<String>
}

impl CommitMessage {
  pub fn new(subject: impl Into<String>, body: Vec<String>) -> Self {
    Self { id: SENTINEL_ID, subject: subject.into(), body }
  }

  /// Parses a raw completion candidate.
  ///
  /// The first non-empty line becomes the subject; every other non-empty line
  /// becomes a body entry with any leading `-` or `*` bullet removed.
  pub fn from_candidate(text: &str) -> Self {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let subject = lines.next().unwrap_or_default().to_string();
    let body = lines
      .map(|line| {
        line
          .strip_prefix('-')
          .or_else(|| line.strip_prefix('*'))
          .unwrap_or(line)
          .trim_start()
          .to_string()
      })
      .filter(|line| !line.is_empty())
      .collect();

    Self::new(subject, body)
  }

  /// Text written to the pending-commit-message file: subject, blank line,
  /// one bullet per body entry.
  pub fn render(&self) -> String {
    let mut out = String::with_capacity(self.subject.len() + 2 + self.body.iter().map(|l| l.len() + 3).sum::<usize>());
    out.push_str(&self.subject);
    out.push_str("\n\n");
    for line in &self.body {
      out.push_str(BULLET);
      out.push_str(line);
      out.push('\n');
    }
    out
  }
}

impl fmt::Display for CommitMessage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.render().trim_end())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_render_without_body() {
    let msg = CommitMessage::new("Initial commit", vec![]);
    assert_eq!(msg.render(), "Initial commit\n\n");
    assert_eq!(msg.id, SENTINEL_ID);
  }

  #[test]
  fn test_render_with_body() {
    let msg = CommitMessage::new("🐛 fix: handle empty diff", vec!["reject empty input".into(), "add test".into()]);
    assert_eq!(msg.render(), "🐛 fix: handle empty diff\n\n- reject empty input\n- add test\n");
  }

  #[test]
  fn test_display_trims_trailing_newlines() {
    let msg = CommitMessage::new("Subject", vec!["one".into()]);
    assert_eq!(msg.to_string(), "Subject\n\n- one");
  }

  #[test]
  fn test_from_candidate() {
    let raw = "\n  Add config store\n\n- validate keys\n* rewrite file atomically\nplain line\n-\n";
    let msg = CommitMessage::from_candidate(raw);
    assert_eq!(msg.subject, "Add config store");
    assert_eq!(msg.body, vec!["validate keys", "rewrite file atomically", "plain line"]);
  }

  #[test]
  fn test_from_empty_candidate() {
    let msg = CommitMessage::from_candidate("   \n");
    assert_eq!(msg.subject, "");
    assert!(msg.body.is_empty());
  }
}
