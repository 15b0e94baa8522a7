//! Inserted-text extraction between two revisions of the same page.

use std::collections::HashSet;

use similar::{ChangeTag, DiffTag, TextDiff};

/// Collect the lines the edit inserted, in order, newline-joined.
///
/// Lines that already occur verbatim anywhere in the old text are dropped
/// (pure reordering is not an addition), as are exact repeats within the
/// insertion itself. An empty `old` (page creation) yields the whole new
/// text.
pub fn extract_addition(old: &str, new: &str) -> String {
    if old.is_empty() {
        return new.to_string();
    }

    let diff = TextDiff::from_lines(old, new);
    let mut seen: HashSet<&str> = HashSet::new();
    let mut added: Vec<&str> = Vec::new();
    for change in diff.iter_all_changes() {
        if change.tag() != ChangeTag::Insert {
            continue;
        }
        let line = change.value().trim_end_matches('\n');
        if line.is_empty() || old.contains(line) {
            continue;
        }
        if seen.insert(line) {
            added.push(line);
        }
    }
    added.join("\n")
}

/// Length in chars of the longest contiguous run shared by `a` and `b`,
/// taken from the Equal blocks of a char-level alignment. Used as the
/// longest-common-substring estimate for revert detection.
pub fn longest_common_run(a: &str, b: &str) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    TextDiff::from_chars(a, b)
        .ops()
        .iter()
        .filter(|op| op.tag() == DiffTag::Equal)
        .map(|op| op.new_range().len())
        .max()
        .unwrap_or(0)
}
