//! Bidirectional language code table.
//!
//! Loaded once from a flat code → display-name JSON map; the reverse map is
//! derived by inversion at load time. Read-only afterwards. A lookup miss is
//! a value, never an error: callers decide whether absence matters.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::value::FieldValue;

#[derive(Debug, thiserror::Error)]
pub enum LanguageError {
    #[error("language table unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("language table malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of a code lookup. List input resolves elementwise, so a failed
/// slot stays visible instead of being silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguageLookup {
    Resolved(String),
    ResolvedList(Vec<LanguageLookup>),
    NotFound,
}

#[derive(Debug, Default)]
pub struct LanguageTable {
    code_to_name: HashMap<String, String>,
    name_to_code: HashMap<String, String>,
}

impl LanguageTable {
    /// Load the code table and build the inverted name table. Missing or
    /// unreadable files are fatal at startup.
    pub fn load_json(path: impl AsRef<Path>) -> Result<LanguageTable, LanguageError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let code_to_name: HashMap<String, String> = serde_json::from_str(&contents)?;
        let name_to_code = code_to_name
            .iter()
            .map(|(code, name)| (name.clone(), code.clone()))
            .collect();
        info!(count = code_to_name.len(), path = %path.display(), "Loaded language table");
        Ok(LanguageTable {
            code_to_name,
            name_to_code,
        })
    }

    /// Build a table from pairs. Used by tests.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> LanguageTable {
        let code_to_name: HashMap<String, String> = pairs
            .into_iter()
            .map(|(code, name)| (code.to_string(), name.to_string()))
            .collect();
        let name_to_code = code_to_name
            .iter()
            .map(|(code, name)| (name.clone(), code.clone()))
            .collect();
        LanguageTable {
            code_to_name,
            name_to_code,
        }
    }

    /// Resolve a code (or an ordered list of codes, elementwise) to display
    /// names.
    pub fn by_code(&self, code: &FieldValue) -> LanguageLookup {
        match code {
            FieldValue::Scalar(code) => match self.code_to_name.get(code) {
                Some(name) => LanguageLookup::Resolved(name.clone()),
                None => LanguageLookup::NotFound,
            },
            FieldValue::List(codes) => LanguageLookup::ResolvedList(
                codes
                    .iter()
                    .map(|code| self.by_code(&FieldValue::Scalar(code.clone())))
                    .collect(),
            ),
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.name_to_code.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> LanguageTable {
        LanguageTable::from_pairs([("en", "English"), ("de", "German"), ("es", "Spanish")])
    }

    #[test]
    fn scalar_code_resolves_to_name() {
        assert_eq!(
            table().by_code(&FieldValue::Scalar("en".to_string())),
            LanguageLookup::Resolved("English".to_string())
        );
    }

    #[test]
    fn unregistered_code_is_not_found_not_an_error() {
        assert_eq!(
            table().by_code(&FieldValue::Scalar("xx".to_string())),
            LanguageLookup::NotFound
        );
    }

    #[test]
    fn list_input_resolves_elementwise_keeping_failed_slots() {
        let lookup = table().by_code(&FieldValue::List(vec![
            "en".to_string(),
            "xx".to_string(),
            "de".to_string(),
        ]));
        assert_eq!(
            lookup,
            LanguageLookup::ResolvedList(vec![
                LanguageLookup::Resolved("English".to_string()),
                LanguageLookup::NotFound,
                LanguageLookup::Resolved("German".to_string()),
            ])
        );
    }

    #[test]
    fn name_lookup_uses_the_inverted_table() {
        let table = table();
        assert_eq!(table.by_name("Spanish"), Some("es"));
        assert_eq!(table.by_name("Klingon"), None);
    }

    #[test]
    fn load_json_builds_both_directions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("languages.json");
        std::fs::write(&path, r#"{"en": "English", "fr": "French"}"#).unwrap();

        let table = LanguageTable::load_json(&path).unwrap();
        assert_eq!(
            table.by_code(&FieldValue::Scalar("fr".to_string())),
            LanguageLookup::Resolved("French".to_string())
        );
        assert_eq!(table.by_name("English"), Some("en"));
    }
}
