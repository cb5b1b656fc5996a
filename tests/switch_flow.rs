//! End-to-end switch flow against a simulated host.

use async_trait::async_trait;
use quickswitch::error::{Error, Result};
use quickswitch::host::{parse_switcher_label, HostState, NavState, SelectionIndicator};
use quickswitch::labels::LabelCatalog;
use quickswitch::observer::ChangeObserver;
use quickswitch::store::{AssociationStore, MemoryStore};
use quickswitch::{ConfirmedVia, SwitchEngine, SwitchOutcome};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Simulated host. Applies a replaced model parameter to the switcher
/// control's attribute after `apply_delay`, but only for keys it knows;
/// unknown keys are silently ignored like the real host.
struct LabHost {
    accepted: HashMap<String, String>,
    aria: Mutex<Option<String>>,
    pending: Mutex<Option<(String, tokio::time::Instant)>>,
    param: Mutex<Option<String>>,
    attempts: Mutex<Vec<String>>,
    resyncs: Mutex<Vec<Option<String>>>,
    neutral: Mutex<bool>,
    apply_delay: Duration,
}

impl LabHost {
    fn new(accepted: &[(&str, &str)], apply_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            accepted: accepted
                .iter()
                .map(|(key, label)| ((*key).to_string(), (*label).to_string()))
                .collect(),
            aria: Mutex::new(None),
            pending: Mutex::new(None),
            param: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            resyncs: Mutex::new(Vec::new()),
            neutral: Mutex::new(true),
            apply_delay,
        })
    }

    /// Put the switcher control directly into the given state, as if the
    /// user had selected the model natively.
    fn show(&self, label: &str) {
        *self.aria.lock().unwrap() = Some(format!("Model switcher, current model is {label}"));
    }

    fn set_neutral(&self, neutral: bool) {
        *self.neutral.lock().unwrap() = neutral;
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl HostState for LabHost {
    fn current_label(&self) -> Option<String> {
        {
            let mut pending = self.pending.lock().unwrap();
            if let Some((label, ready_at)) = pending.clone() {
                if tokio::time::Instant::now() >= ready_at {
                    self.show(&label);
                    *pending = None;
                }
            }
        }
        let aria = self.aria.lock().unwrap().clone()?;
        parse_switcher_label(&aria)
    }
}

#[async_trait]
impl NavState for LabHost {
    fn model_param(&self) -> Option<String> {
        self.param.lock().unwrap().clone()
    }

    fn replace_model_param(&self, key: &str) {
        *self.param.lock().unwrap() = Some(key.to_string());
        self.attempts.lock().unwrap().push(key.to_string());
    }

    async fn emit_refresh_signals(&self) {
        let param = self.param.lock().unwrap().clone();
        if let Some(label) = param.and_then(|key| self.accepted.get(&key).cloned()) {
            if self.apply_delay.is_zero() {
                self.show(&label);
            } else {
                let ready_at = tokio::time::Instant::now() + self.apply_delay;
                *self.pending.lock().unwrap() = Some((label, ready_at));
            }
        }
    }

    fn at_neutral_view(&self) -> bool {
        *self.neutral.lock().unwrap()
    }
}

impl SelectionIndicator for LabHost {
    fn resync(&self, active_label: Option<&str>) {
        self.resyncs
            .lock()
            .unwrap()
            .push(active_label.map(str::to_string));
    }
}

/// Store whose writes always fail, like a browser profile over quota.
struct FailingStore;

impl AssociationStore for FailingStore {
    fn read_associations(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }

    fn write_associations(&self, _associations: &BTreeMap<String, String>) -> Result<()> {
        Err(Error::storage("quota exceeded"))
    }

    fn read_last_label(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn write_last_label(&self, _label: &str) -> Result<()> {
        Err(Error::storage("quota exceeded"))
    }

    fn clear_associations(&self) -> Result<()> {
        Err(Error::storage("quota exceeded"))
    }
}

fn engine_for(hub: &Arc<LabHost>, store: Arc<dyn AssociationStore>) -> Arc<SwitchEngine> {
    Arc::new(SwitchEngine::new(
        store,
        hub.clone(),
        hub.clone(),
        hub.clone(),
        LabelCatalog::builtin(),
    ))
}

fn seed_associations(store: &MemoryStore, pairs: &[(&str, &str)]) {
    let map = pairs
        .iter()
        .map(|(label, key)| ((*label).to_string(), (*key).to_string()))
        .collect();
    store.write_associations(&map).expect("seed associations");
}

#[tokio::test(start_paused = true)]
async fn learns_key_via_fallback_into_empty_store() {
    // Host confirms o3 1200ms after the parameter change, inside the 3s
    // confirmation window.
    let hub = LabHost::new(&[("o3", "o3")], Duration::from_millis(1200));
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&hub, store.clone());

    let outcome = engine.switch_to("o3").await;

    assert_eq!(
        outcome,
        SwitchOutcome::Confirmed {
            key: "o3".to_string(),
            via: ConfirmedVia::Fallback,
        }
    );
    let associations = store.read_associations().unwrap();
    assert_eq!(associations.get("o3").map(String::as_str), Some("o3"));
    assert_eq!(store.read_last_label().unwrap().as_deref(), Some("o3"));
}

#[tokio::test(start_paused = true)]
async fn stale_remembered_key_falls_back_to_second_working_candidate() {
    // Only the second configured fallback still works; the remembered key
    // and the first fallback time out.
    let hub = LabHost::new(
        &[("gpt-5-thinking-mini", "5 Thinking mini")],
        Duration::ZERO,
    );
    let store = Arc::new(MemoryStore::new());
    seed_associations(&store, &[("5 thinking mini", "stale-key")]);
    let engine = engine_for(&hub, store.clone());

    let outcome = engine.switch_to("5 Thinking mini").await;

    assert_eq!(
        outcome,
        SwitchOutcome::Confirmed {
            key: "gpt-5-thinking-mini".to_string(),
            via: ConfirmedVia::Fallback,
        }
    );
    // Remembered key first, then candidates in configured order.
    assert_eq!(
        hub.attempts(),
        ["stale-key", "gpt-5-t-mini", "gpt-5-thinking-mini"]
    );
    let associations = store.read_associations().unwrap();
    assert_eq!(
        associations.get("5 thinking mini").map(String::as_str),
        Some("gpt-5-thinking-mini")
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_candidates_leave_state_unchanged() {
    let hub = LabHost::new(&[], Duration::ZERO);
    let store = Arc::new(MemoryStore::new());
    seed_associations(&store, &[("o3", "old-key")]);
    store.write_last_label("5 Fast").expect("seed last");
    let engine = engine_for(&hub, store.clone());

    let outcome = engine.switch_to("o3").await;

    assert_eq!(outcome, SwitchOutcome::Unresolved);
    assert_eq!(hub.attempts(), ["old-key", "o3"]);
    let associations = store.read_associations().unwrap();
    assert_eq!(associations.get("o3").map(String::as_str), Some("old-key"));
    assert_eq!(store.read_last_label().unwrap().as_deref(), Some("5 Fast"));
}

#[tokio::test(start_paused = true)]
async fn switch_is_idempotent_when_label_already_active() {
    let hub = LabHost::new(&[("o3", "o3")], Duration::ZERO);
    hub.show("o3");
    hub.replace_model_param("o3");
    hub.attempts.lock().unwrap().clear();
    let store = Arc::new(MemoryStore::new());
    seed_associations(&store, &[("o3", "o3")]);
    store.write_last_label("o3").expect("seed last");
    let engine = engine_for(&hub, store.clone());

    let outcome = engine.switch_to("o3").await;

    assert_eq!(
        outcome,
        SwitchOutcome::Confirmed {
            key: "o3".to_string(),
            via: ConfirmedVia::Remembered,
        }
    );
    let associations = store.read_associations().unwrap();
    assert_eq!(associations.get("o3").map(String::as_str), Some("o3"));
    assert_eq!(store.read_last_label().unwrap().as_deref(), Some("o3"));
}

#[tokio::test(start_paused = true)]
async fn storage_write_failure_does_not_change_outcome() {
    let hub = LabHost::new(&[("o3", "o3")], Duration::from_millis(100));
    let engine = engine_for(&hub, Arc::new(FailingStore));

    let outcome = engine.switch_to("o3").await;

    // Success is decided purely by the host confirmation.
    assert_eq!(
        outcome,
        SwitchOutcome::Confirmed {
            key: "o3".to_string(),
            via: ConfirmedVia::Fallback,
        }
    );
    assert_eq!(engine.nav_depth(), 0);
}

#[tokio::test(start_paused = true)]
async fn organic_learning_is_gated_on_nav_depth() {
    let hub = LabHost::new(&[], Duration::ZERO);
    let store = Arc::new(MemoryStore::new());
    let engine = engine_for(&hub, store.clone());
    let observer = ChangeObserver::new(engine.clone());

    // Start a speculative switch that will never confirm, so it holds the
    // reentrancy marker for its whole 3s window.
    let in_flight = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.try_switch("slow-key", "o3").await })
    };
    while engine.nav_depth() == 0 {
        tokio::task::yield_now().await;
    }

    // A label change observed now must not be treated as organic.
    observer.handle("GPT-4o");
    assert!(store.read_associations().unwrap().is_empty());
    // The indicator and last label still track the host.
    assert_eq!(store.read_last_label().unwrap().as_deref(), Some("GPT-4o"));

    assert!(!in_flight.await.expect("join"));
    assert_eq!(engine.nav_depth(), 0);

    // The same kind of change at depth zero teaches the engine.
    hub.replace_model_param("gpt-4o");
    observer.handle("GPT-4o (latest)");
    let associations = store.read_associations().unwrap();
    assert_eq!(
        associations.get("gpt-4o").map(String::as_str),
        Some("gpt-4o")
    );
}

#[tokio::test(start_paused = true)]
async fn restore_last_reapplies_only_on_neutral_view() {
    let hub = LabHost::new(&[("o3", "o3")], Duration::ZERO);
    let store = Arc::new(MemoryStore::new());
    store.write_last_label("o3").expect("seed last");
    let engine = engine_for(&hub, store.clone());

    hub.set_neutral(false);
    assert_eq!(engine.restore_last().await, None);
    assert!(hub.attempts().is_empty());

    hub.set_neutral(true);
    let outcome = engine.restore_last().await;
    assert_eq!(
        outcome,
        Some(SwitchOutcome::Confirmed {
            key: "o3".to_string(),
            via: ConfirmedVia::Fallback,
        })
    );

    // Already showing the stored label: nothing to do.
    assert_eq!(engine.restore_last().await, None);
}

#[tokio::test(start_paused = true)]
async fn restore_last_without_stored_label_is_a_noop() {
    let hub = LabHost::new(&[("o3", "o3")], Duration::ZERO);
    let engine = engine_for(&hub, Arc::new(MemoryStore::new()));
    assert_eq!(engine.restore_last().await, None);
    assert!(hub.attempts().is_empty());
}
