//! Label catalog: built-in quick-switch targets + labels.json overrides,
//! plus the normalizer/classifier that maps host-displayed text onto them.

use crate::error::Error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

/// Canonical labels the engine offers as quick-switch targets, each with its
/// ordered fallback candidates (selector keys to try before any association
/// has been learned).
const BUILTIN_LABELS: &[(&str, &[&str])] = &[
    ("5 Fast", &["gpt-5-instant"]),
    ("5 Thinking", &["gpt-5-thinking"]),
    (
        "5 Thinking mini",
        &[
            "gpt-5-t-mini",
            "gpt-5-thinking-mini",
            "gpt-5-mini",
            "gpt-5-thinking-fast",
        ],
    ),
    ("GPT-4o", &["gpt-4o"]),
    ("GPT-4.1", &["gpt-4.1", "gpt-4-1", "gpt4.1"]),
    ("o3", &["o3"]),
    ("o4-mini", &["o4-mini"]),
];

/// Lowercase, collapse whitespace runs to one space, trim.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Map host-displayed text to a canonical label.
///
/// Rules are evaluated in priority order; "thinking mini" must be checked
/// before the bare "thinking" rule or it would misclassify. Text matching no
/// rule is returned unchanged, so unknown labels degrade to passthrough.
#[must_use]
pub fn classify(text: &str) -> String {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return text.to_string();
    }
    for (rule, label) in classify_rules() {
        if rule.is_match(&normalized) {
            return (*label).to_string();
        }
    }
    text.to_string()
}

fn classify_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"\bthinking mini\b", "5 Thinking mini"),
            (r"\bthinking\b", "5 Thinking"),
            (r"\bfast\b", "5 Fast"),
            (r"\b4\.?1\b", "GPT-4.1"),
            (r"\b4o\b", "GPT-4o"),
            (r"^o3$", "o3"),
            (r"^o4[- ]?mini$", "o4-mini"),
        ]
        .into_iter()
        .map(|(pattern, label)| (Regex::new(pattern).expect("classifier rule"), label))
        .collect()
    })
}

/// One quick-switch target: a canonical label and its fallback keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelEntry {
    pub label: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct CatalogFile {
    labels: Vec<LabelEntry>,
}

/// The fixed set of quick-switch targets, in configuration order.
#[derive(Debug, Clone)]
pub struct LabelCatalog {
    entries: Vec<LabelEntry>,
    error: Option<String>,
}

impl LabelCatalog {
    /// The built-in targets, no overrides applied.
    #[must_use]
    pub fn builtin() -> Self {
        let entries = BUILTIN_LABELS
            .iter()
            .map(|(label, fallbacks)| LabelEntry {
                label: (*label).to_string(),
                fallbacks: fallbacks.iter().map(|key| (*key).to_string()).collect(),
            })
            .collect();
        Self { entries, error: None }
    }

    /// Built-ins with a labels.json override file merged over them.
    ///
    /// A missing file is not an error; an unreadable or undecodable one
    /// falls back to the built-ins with the failure recorded on
    /// [`Self::error`].
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let mut catalog = Self::builtin();
        let Some(path) = path else {
            return catalog;
        };
        if !path.exists() {
            return catalog;
        }
        match std::fs::read_to_string(path)
            .map_err(Error::from)
            .and_then(|contents| {
                serde_json::from_str::<CatalogFile>(&contents).map_err(Error::from)
            }) {
            Ok(file) => catalog.apply_overrides(file.labels),
            Err(err) => {
                catalog.error = Some(format!("{err}\n\nFile: {}", path.display()));
            }
        }
        catalog
    }

    fn apply_overrides(&mut self, overrides: Vec<LabelEntry>) {
        for entry in overrides {
            let existing = self
                .entries
                .iter()
                .position(|candidate| normalize(&candidate.label) == normalize(&entry.label));
            match existing {
                Some(idx) => self.entries[idx] = entry,
                None => self.entries.push(entry),
            }
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LabelEntry] {
        &self.entries
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn find(&self, label: &str) -> Option<&LabelEntry> {
        self.entries
            .iter()
            .find(|entry| normalize(&entry.label) == normalize(label))
    }

    /// Fallback candidates for a label, empty for unknown labels.
    #[must_use]
    pub fn fallbacks(&self, label: &str) -> &[String] {
        self.find(label).map_or(&[][..], |entry| &entry.fallbacks)
    }
}

impl Default for LabelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
