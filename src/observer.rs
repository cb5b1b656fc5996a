//! Change observer: learns from label transitions the engine did not cause.
//!
//! The embedding layer watches the switcher control's mutation stream and
//! forwards each label it reads. Organic transitions (the user picking a
//! model via the host's own control) are the sole path by which the engine
//! learns mappings it could not confirm itself.

use crate::engine::SwitchEngine;
use crate::labels::classify;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

pub struct ChangeObserver {
    engine: Arc<SwitchEngine>,
    last_seen: Mutex<Option<String>>,
}

impl ChangeObserver {
    /// Seeds the last-seen label from the host's current state so the first
    /// event fires only on a real transition.
    #[must_use]
    pub fn new(engine: Arc<SwitchEngine>) -> Self {
        let last_seen = Mutex::new(engine.host_label());
        Self { engine, last_seen }
    }

    /// Handle one observed switcher label. Called on every mutation event;
    /// repeats of the last-seen raw label are ignored.
    pub fn handle(&self, raw_label: &str) {
        {
            let mut last = self.last_seen.lock().unwrap();
            if last.as_deref() == Some(raw_label) {
                return;
            }
            *last = Some(raw_label.to_string());
        }

        let classified = classify(raw_label);
        if self.engine.nav_depth() == 0 {
            // Organic change: the active URL key is what produced this
            // label, so the pair is a confirmed association.
            if let Some(key) = self.engine.model_param() {
                self.engine.learn_association(&classified, &key);
            }
        } else {
            debug!(label = %classified, "label change during speculative switch, not learning");
        }

        // The indicator and last-label slot track what the host shows even
        // when the change came from our own switch.
        self.engine.persist_last(&classified);
        self.engine.resync_indicator();
    }

    /// Consume a stream of switcher labels until the sender closes.
    pub async fn drive(&self, mut events: mpsc::UnboundedReceiver<String>) {
        while let Some(label) = events.recv().await {
            self.handle(&label);
        }
    }
}
