use the_router::LinePatch;

/// Index-aligned line diff.
///
/// Index `i` is kept when both sides hold the same line, replaced when the
/// new side differs or extends past the old one, and deleted when only the
/// old side has it. An insertion in the middle therefore replaces every line
/// after it; no attempt is made at a minimal edit script.
pub fn compute_diff(old: &[String], new: &[String]) -> Vec<LinePatch> {
  let len = old.len().max(new.len());
  (0..len)
    .map(|idx| {
      match new.get(idx) {
        Some(line) if old.get(idx) == Some(line) => LinePatch::Keep,
        Some(line) => LinePatch::Replace(line.clone()),
        None => LinePatch::Delete,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
  }

  #[test]
  fn append_only() {
    assert_eq!(compute_diff(&lines(&["a", "b"]), &lines(&["a", "b", "c"])), vec![
      LinePatch::Keep,
      LinePatch::Keep,
      LinePatch::Replace("c".into()),
    ]);
  }

  #[test]
  fn unchanged() {
    assert_eq!(compute_diff(&lines(&["a", "b"]), &lines(&["a", "b"])), vec![
      LinePatch::Keep,
      LinePatch::Keep,
    ]);
  }

  #[test]
  fn truncation_deletes_tail() {
    assert_eq!(compute_diff(&lines(&["a", "b", "c"]), &lines(&["a"])), vec![
      LinePatch::Keep,
      LinePatch::Delete,
      LinePatch::Delete,
    ]);
  }

  #[test]
  fn middle_insert_cascades_replaces() {
    assert_eq!(compute_diff(&lines(&["a", "c"]), &lines(&["a", "b", "c"])), vec![
      LinePatch::Keep,
      LinePatch::Replace("b".into()),
      LinePatch::Replace("c".into()),
    ]);
  }

  #[test]
  fn empty_sides() {
    assert!(compute_diff(&[], &[]).is_empty());
    assert_eq!(compute_diff(&[], &lines(&["x"])), vec![LinePatch::Replace("x".into())]);
  }
}
