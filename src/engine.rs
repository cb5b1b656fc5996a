//! Speculative switch executor and orchestrator.
//!
//! A speculative switch rewrites the model parameter, nudges the host's
//! reactive pipeline, and then watches the switcher label to find out
//! whether the attempt took. The orchestrator runs the remembered key
//! first, then the configured fallbacks, and persists whatever the host
//! actually confirmed.

use crate::host::{HostState, NavState, SelectionIndicator};
use crate::labels::{classify, normalize, LabelCatalog};
use crate::store::AssociationStore;
use crate::wait::{wait_until, SwitchTiming};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which path confirmed a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmedVia {
    /// The previously learned association worked.
    Remembered,
    /// A configured fallback candidate worked and was recorded.
    Fallback,
}

/// Result of a [`SwitchEngine::switch_to`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Confirmed { key: String, via: ConfirmedVia },
    /// Every candidate failed. State is unchanged; the user teaching the
    /// engine once via the host's native control is the remedy.
    Unresolved,
}

impl SwitchOutcome {
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// Read-only diagnostics snapshot. Not a stability contract.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSnapshot {
    pub host_label: Option<String>,
    pub classified_label: Option<String>,
    pub url_key: Option<String>,
    pub nav_depth: usize,
}

/// Scoped marker for "a speculative switch is in flight". Dropping the
/// guard restores the depth on every exit path, timeouts included.
struct NavGuard<'a> {
    depth: &'a AtomicUsize,
}

impl<'a> NavGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self { depth }
    }
}

impl Drop for NavGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The label-to-key learning and synchronization engine.
pub struct SwitchEngine {
    store: Arc<dyn AssociationStore>,
    host: Arc<dyn HostState>,
    nav: Arc<dyn NavState>,
    indicator: Arc<dyn SelectionIndicator>,
    catalog: LabelCatalog,
    timing: SwitchTiming,
    nav_depth: AtomicUsize,
    switch_slot: tokio::sync::Mutex<()>,
}

impl SwitchEngine {
    pub fn new(
        store: Arc<dyn AssociationStore>,
        host: Arc<dyn HostState>,
        nav: Arc<dyn NavState>,
        indicator: Arc<dyn SelectionIndicator>,
        catalog: LabelCatalog,
    ) -> Self {
        Self {
            store,
            host,
            nav,
            indicator,
            catalog,
            timing: SwitchTiming::default(),
            nav_depth: AtomicUsize::new(0),
            switch_slot: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_timing(mut self, timing: SwitchTiming) -> Self {
        self.timing = timing;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    /// Current reentrancy depth. Nonzero means a label change observed right
    /// now was very likely caused by our own speculative switch.
    #[must_use]
    pub fn nav_depth(&self) -> usize {
        self.nav_depth.load(Ordering::SeqCst)
    }

    /// Attempt one speculative switch: apply `key`, nudge the host, and wait
    /// for the switcher to show `expected_label`.
    ///
    /// The URL mutation persists whether or not the host confirms. Callers
    /// normally go through [`Self::switch_to`], which serializes attempts.
    pub async fn try_switch(&self, key: &str, expected_label: &str) -> bool {
        let _guard = NavGuard::enter(&self.nav_depth);

        self.nav.replace_model_param(key);
        self.nav.emit_refresh_signals().await;

        let expected = normalize(expected_label);
        let confirmed = wait_until(
            || {
                let label = self.host.current_label()?;
                (normalize(&classify(&label)) == expected).then_some(())
            },
            self.timing.confirm_timeout,
            self.timing.poll_interval,
        )
        .await
        .is_some();

        debug!(key, expected_label, confirmed, "speculative switch finished");
        confirmed
    }

    /// Switch the host to `label`: remembered key first, then fallbacks in
    /// configured order, first confirmed success wins.
    ///
    /// Concurrent calls are serialized; a second request runs after the
    /// first fully completes, including its state effects.
    pub async fn switch_to(&self, label: &str) -> SwitchOutcome {
        let _slot = self.switch_slot.lock().await;
        debug!(label, "switch requested");

        if let Some(key) = self.read_associations_soft().get(&normalize(label)).cloned() {
            if self.try_switch(&key, label).await {
                self.persist_last(label);
                self.resync_indicator();
                return SwitchOutcome::Confirmed {
                    key,
                    via: ConfirmedVia::Remembered,
                };
            }
            // Keep the stale entry: the key may work again later, and a
            // confirmed fallback below overwrites it anyway.
            warn!(label, key = %key, "remembered key no longer updates the host, trying fallbacks");
        }

        for key in self.catalog.fallbacks(label) {
            if self.try_switch(key, label).await {
                let mut associations = self.read_associations_soft();
                associations.insert(normalize(label), key.clone());
                self.write_associations_soft(&associations);
                self.persist_last(label);
                self.resync_indicator();
                info!(label, key = %key, "learned key via fallback");
                return SwitchOutcome::Confirmed {
                    key: key.clone(),
                    via: ConfirmedVia::Fallback,
                };
            }
        }

        warn!(label, "could not switch; pick it once from the host's native control to teach the key");
        SwitchOutcome::Unresolved
    }

    /// Re-apply the last selected label on the host's neutral view.
    ///
    /// Returns `None` when nothing needed doing: not on the neutral view,
    /// no stored label, or the host already shows it.
    pub async fn restore_last(&self) -> Option<SwitchOutcome> {
        if !self.nav.at_neutral_view() {
            return None;
        }
        let last = match self.store.read_last_label() {
            Ok(Some(label)) => label,
            Ok(None) => return None,
            Err(err) => {
                debug!(%err, "could not read last selected label");
                return None;
            }
        };
        let visible = self.host.current_label().map(|raw| classify(&raw));
        if visible.map(|label| normalize(&label)) == Some(normalize(&last)) {
            return None;
        }
        Some(self.switch_to(&last).await)
    }

    /// Diagnostics snapshot of the live host/engine state.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        let host_label = self.host.current_label();
        EngineSnapshot {
            classified_label: host_label.as_deref().map(classify),
            host_label,
            url_key: self.nav.model_param(),
            nav_depth: self.nav_depth(),
        }
    }

    /// Dump the learned associations (diagnostics).
    #[must_use]
    pub fn dump_associations(&self) -> BTreeMap<String, String> {
        self.read_associations_soft()
    }

    /// Drop every learned association (diagnostics; explicit external op).
    pub fn clear_associations(&self) -> crate::error::Result<()> {
        self.store.clear_associations()
    }

    pub(crate) fn host_label(&self) -> Option<String> {
        self.host.current_label()
    }

    pub(crate) fn model_param(&self) -> Option<String> {
        self.nav.model_param()
    }

    /// Record a confirmed association. Only called after an observed
    /// transition, never speculatively.
    pub(crate) fn learn_association(&self, label: &str, key: &str) {
        let mut associations = self.read_associations_soft();
        associations.insert(normalize(label), key.to_string());
        self.write_associations_soft(&associations);
        info!(label, key, "learned mapping");
    }

    pub(crate) fn persist_last(&self, label: &str) {
        if let Err(err) = self.store.write_last_label(label) {
            debug!(%err, "failed to persist last selected label");
        }
    }

    pub(crate) fn resync_indicator(&self) {
        let active = self.host.current_label().map(|raw| classify(&raw));
        self.indicator.resync(active.as_deref());
    }

    fn read_associations_soft(&self) -> BTreeMap<String, String> {
        match self.store.read_associations() {
            Ok(associations) => associations,
            Err(err) => {
                debug!(%err, "association store unreadable, using empty mapping");
                BTreeMap::new()
            }
        }
    }

    fn write_associations_soft(&self, associations: &BTreeMap<String, String>) {
        if let Err(err) = self.store.write_associations(associations) {
            debug!(%err, "failed to persist associations");
        }
    }
}
