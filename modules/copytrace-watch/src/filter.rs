//! Pre-load change filtering: decides from feed metadata alone whether a
//! change is worth loading revision text for.

use std::collections::HashSet;

use regex::Regex;

use copytrace_common::{ChangeEvent, ChangeType, Locale, Tuning};

/// Content namespaces inspected by default: articles and drafts.
pub const DEFAULT_NAMESPACES: [i64; 2] = [0, 118];

pub struct ChangeFilter {
    namespaces: Vec<i64>,
    /// Pages tracked regardless of namespace (course/program page sets).
    tracked_titles: HashSet<String>,
    min_byte_delta: i64,
    ignore_re: Regex,
}

impl ChangeFilter {
    pub fn new(locale: &Locale, tuning: &Tuning, tracked_titles: HashSet<String>) -> Self {
        Self {
            namespaces: DEFAULT_NAMESPACES.to_vec(),
            tracked_titles,
            min_byte_delta: tuning.min_addition_chars as i64,
            ignore_re: locale.ignore_regex(),
        }
    }

    /// Pure predicate over change metadata. Never fails.
    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if !matches!(event.change_type, ChangeType::Edit | ChangeType::New) {
            return false;
        }
        if event.is_bot {
            return false;
        }
        if !self.namespaces.contains(&event.namespace)
            && !self.tracked_titles.contains(&event.title)
        {
            return false;
        }
        if event.byte_delta < self.min_byte_delta {
            return false;
        }
        if self.ignore_re.is_match(&event.comment) {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn filter() -> ChangeFilter {
        ChangeFilter::new(
            Locale::for_code("en"),
            &Tuning::default(),
            HashSet::new(),
        )
    }

    fn event() -> ChangeEvent {
        ChangeEvent {
            title: "Sample Article".to_string(),
            namespace: 0,
            change_type: ChangeType::Edit,
            is_bot: false,
            editor: "Example".to_string(),
            comment: "added history section".to_string(),
            old_rev: 100,
            new_rev: 101,
            byte_delta: 640,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn accepts_plain_article_edit() {
        assert!(filter().accepts(&event()));
    }

    #[test]
    fn rejects_bots_regardless_of_other_fields() {
        let mut e = event();
        e.is_bot = true;
        assert!(!filter().accepts(&e));

        e.byte_delta = 100_000;
        e.comment = "huge good-faith expansion".to_string();
        assert!(!filter().accepts(&e));
    }

    #[test]
    fn rejects_log_events() {
        let mut e = event();
        e.change_type = ChangeType::Log;
        assert!(!filter().accepts(&e));
    }

    #[test]
    fn rejects_foreign_namespaces_unless_tracked() {
        let mut e = event();
        e.namespace = 4;
        assert!(!filter().accepts(&e));

        let tracked = HashSet::from([e.title.clone()]);
        let f = ChangeFilter::new(Locale::for_code("en"), &Tuning::default(), tracked);
        assert!(f.accepts(&e));
    }

    #[test]
    fn rejects_small_deltas() {
        let mut e = event();
        e.byte_delta = 120;
        assert!(!filter().accepts(&e));
    }

    #[test]
    fn rejects_revert_summaries() {
        let mut e = event();
        e.comment = "Reverted edits by Vandal (talk) to last version".to_string();
        assert!(!filter().accepts(&e));

        e.comment = "Undid revision 991 by Example".to_string();
        assert!(!filter().accepts(&e));
    }
}
