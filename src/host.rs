//! Host application boundary.
//!
//! The engine never touches the DOM directly; the embedding layer implements
//! these traits over whatever the host actually exposes (a switcher control
//! attribute, the page URL, the injected button bar).

use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Live view of what the host currently displays.
pub trait HostState: Send + Sync {
    /// The currently displayed model label. Read live on every call, never
    /// cached; `None` when the switcher control is absent or its attribute
    /// does not have the expected shape.
    fn current_label(&self) -> Option<String>;
}

/// The navigable URL state and the host's reactive pipeline.
#[async_trait]
pub trait NavState: Send + Sync {
    /// Current value of the model query parameter, if any.
    fn model_param(&self) -> Option<String>;

    /// Rewrite the model query parameter without a full reload. History
    /// replace, not push: back-navigation must not walk through speculative
    /// attempts.
    fn replace_model_param(&self, key: &str);

    /// Emit the synthetic navigation/visibility signals the host listens
    /// for. Replacing history state alone does not run the host's reactive
    /// pipeline, so this nudge is what makes it re-read the parameter.
    async fn emit_refresh_signals(&self);

    /// Whether the host is on its neutral/home view, where the last
    /// selected label should be re-applied.
    fn at_neutral_view(&self) -> bool;
}

/// Hook for keeping the embedding UI's active-state marker in sync.
pub trait SelectionIndicator: Send + Sync {
    /// Called with the classified label the host currently shows, or `None`
    /// when it cannot be read. Must be idempotent.
    fn resync(&self, active_label: Option<&str>);
}

/// Extract the label from the switcher control's descriptive attribute.
///
/// The attribute text ends in `current model is <label>`; anything without
/// that exact prefix phrase is treated as unreadable.
#[must_use]
pub fn parse_switcher_label(attribute: &str) -> Option<String> {
    let captures = switcher_label_regex().captures(attribute)?;
    Some(captures[1].trim().to_string())
}

fn switcher_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)current model is (.+)$").expect("switcher label regex"))
}
