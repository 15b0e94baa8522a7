//! Per-language report strings and edit-summary patterns.
//!
//! Revert detection is driven by what human editors and rollback tools write
//! in edit summaries, so every supported wiki language carries its own
//! patterns. Unknown languages fall back to English.

use regex::{Regex, RegexBuilder};

#[derive(Debug)]
pub struct Locale {
    pub code: &'static str,
    pub table_title: &'static str,
    pub table_editor: &'static str,
    pub table_diff: &'static str,
    pub table_status: &'static str,
    pub table_source: &'static str,
    pub update_summary: &'static str,
    /// Edit summaries matching this are reverts/undos and never inspected.
    ignore_summary: &'static str,
    /// Template matching "this undoes revision {rev} by {editor}".
    rollback_of_summary: &'static str,
}

static EN: Locale = Locale {
    code: "en",
    table_title: "Title",
    table_editor: "Editor",
    table_diff: "Diff",
    table_status: "Status",
    table_source: "Source",
    update_summary: "Update",
    ignore_summary: r"\[*(Reverted|Undid revision|rv$)",
    rollback_of_summary: r"Reverted .*?edits? by (\[\[User:)?{editor}|Undid revision {rev}|Reverting possible vandalism by (\[\[User:)?{editor}",
};

static HE: Locale = Locale {
    code: "he",
    table_title: "כותרת",
    table_editor: "עורך/עורכת",
    table_diff: "הבדל",
    table_status: "מצב",
    table_source: "מקורות",
    update_summary: "עדכון",
    ignore_summary: r"(שוחזר מעריכות של|ביטול גרסה|שחזור עריכות|שחזור לגרסה)",
    rollback_of_summary: r"שוחזר מעריכ(ה|ות) של (\[\[User:|\[\[משתמש:)?{editor}|(ביטול|שחזור) גרסה {rev}",
};

static FR: Locale = Locale {
    code: "fr",
    table_title: "Titre",
    table_editor: "Editeur",
    table_diff: "Diff",
    table_status: "Status",
    table_source: "Source",
    update_summary: "Bot: Mise à jour",
    ignore_summary: r"\[*(Annulation|R[ée]vocation|Vandalisme|Retour|revert|rv$)",
    rollback_of_summary: r"(Annulation|R[ée]vocation|Vandalisme|Retour).*?éditions? .*?par (\[\[(User|Utilisateur|Contributions):)?{editor}|Annulation de l'édition {rev}|\[\[WP:FOI\|bonne foi\]\] de (\[\[(User|Utilisateur|Contributions):)?{editor}",
};

static PT: Locale = Locale {
    code: "pt",
    table_title: "Título",
    table_editor: "Editor",
    table_diff: "Diff",
    table_status: "Status",
    table_source: "Fonte",
    update_summary: "Atualização",
    ignore_summary: r"\[*(Revertido|Revisão desfeita|rv$)",
    rollback_of_summary: r"Revertidas .*?edições? de (\[\[Usuário\(a\):)?{editor}|Revisão desfeita {rev}|Revertendo possível vandalismo de (\[\[Usuário\(a\):)?{editor}",
};

impl Locale {
    pub fn for_code(code: &str) -> &'static Locale {
        match code {
            "he" => &HE,
            "fr" => &FR,
            "pt" => &PT,
            _ => &EN,
        }
    }

    /// Compiled revert/undo summary matcher, anchored to the start of the
    /// summary. Callers compile once and keep it.
    pub fn ignore_regex(&self) -> Regex {
        RegexBuilder::new(&format!("^(?:{})", self.ignore_summary))
            .case_insensitive(true)
            .build()
            .expect("locale ignore pattern is valid")
    }

    /// Matcher for a summary undoing `rev` by `editor`. The editor name is
    /// escaped, so the result only fails on a broken locale template.
    pub fn rollback_regex(&self, editor: &str, rev: u64) -> Result<Regex, regex::Error> {
        let pattern = self
            .rollback_of_summary
            .replace("{editor}", &regex::escape(editor))
            .replace("{rev}", &rev.to_string());
        Ok(Regex::new(&pattern)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_locale_compiles() {
        for code in ["en", "he", "fr", "pt"] {
            let locale = Locale::for_code(code);
            let _ = locale.ignore_regex();
            let _ = locale.rollback_regex("Some User (x)", 12345).unwrap();
        }
    }

    #[test]
    fn unknown_code_falls_back_to_english() {
        assert_eq!(Locale::for_code("de").code, "en");
    }

    #[test]
    fn english_ignore_matches_reverts() {
        let re = Locale::for_code("en").ignore_regex();
        assert!(re.is_match("Reverted edits by Example"));
        assert!(re.is_match("Undid revision 1234 by Example"));
        assert!(re.is_match("rv"));
        assert!(!re.is_match("added history section"));
    }

    #[test]
    fn rollback_pattern_names_editor_and_revision() {
        let locale = Locale::for_code("en");
        let re = locale.rollback_regex("Example", 991).unwrap();
        assert!(re.is_match("Reverted 2 edits by [[User:Example"));
        assert!(re.is_match("Undid revision 991 by somebody"));
        assert!(!re.is_match("Undid revision 990 by somebody else"));
    }
}
