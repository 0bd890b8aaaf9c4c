use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// One independently reconciled piece of desired device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    /// Studio mode preview slot
    PreviewScene,
    /// Program output, switched through a studio mode transition
    ProgramTransition,
    /// Mixer faders and mute flags
    VolumeSet,
}

impl Intent {
    /// Message used when this intent runs out of attempts
    pub fn failure_message(&self) -> &'static str {
        match self {
            Intent::PreviewScene => "failed to set the preview scene",
            Intent::ProgramTransition => "failed to change scene",
            Intent::VolumeSet => "failed to set the volumes",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Intent::PreviewScene => "preview scene",
            Intent::ProgramTransition => "program transition",
            Intent::VolumeSet => "volume set",
        };
        f.write_str(name)
    }
}

/// A desired value stamped with the generation it was submitted under
#[derive(Debug, Clone, PartialEq)]
pub struct Desired<T> {
    pub generation: u64,
    pub value: T,
}

/// Desired-state slot for one intent
///
/// Callers [`set`](IntentSlot::set) a value and later observe the slot going
/// back to empty once the reconciler is done with it. Every `set` gets a new
/// generation, so submitting the same content twice still runs twice.
pub struct IntentSlot<T> {
    intent: Intent,
    tx: Arc<watch::Sender<Option<Desired<T>>>>,
    next_generation: Arc<AtomicU64>,
}

impl<T> Clone for IntentSlot<T> {
    fn clone(&self) -> Self {
        Self {
            intent: self.intent,
            tx: self.tx.clone(),
            next_generation: self.next_generation.clone(),
        }
    }
}

impl<T: Clone> IntentSlot<T> {
    pub fn new(intent: Intent) -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            intent,
            tx: Arc::new(tx),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Submit a desired value, replacing any pending one
    ///
    /// Returns the generation assigned to the value.
    pub fn set(&self, value: T) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(Some(Desired { generation, value }));
        generation
    }

    /// Withdraw the pending value; a running reconciliation stops at its next suspension point
    ///
    /// Returns whether anything was pending.
    pub fn clear(&self) -> bool {
        self.tx.send_replace(None).is_some()
    }

    /// Pending value, if any
    pub fn get(&self) -> Option<T> {
        self.tx.borrow().as_ref().map(|desired| desired.value.clone())
    }

    /// Pending value with its generation
    pub fn pending(&self) -> Option<Desired<T>> {
        self.tx.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the slot is empty
    pub async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|desired| desired.is_none()).await;
    }

    /// Watch the slot
    pub fn subscribe(&self) -> watch::Receiver<Option<Desired<T>>> {
        self.tx.subscribe()
    }

    /// Empty the slot only if it still holds `generation`
    pub(crate) fn clear_generation(&self, generation: u64) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(desired) if desired.generation == generation => {
                *current = None;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_get_distinct_generations() {
        let slot = IntentSlot::new(Intent::PreviewScene);
        let first = slot.set("Intro".to_string());
        let second = slot.set("Intro".to_string());
        assert_ne!(first, second);
        assert_eq!(slot.pending().unwrap().generation, second);
        assert_eq!(slot.get().as_deref(), Some("Intro"));
    }

    #[test]
    fn stale_generation_does_not_clear_newer_value() {
        let slot = IntentSlot::new(Intent::VolumeSet);
        let old = slot.set(vec![1]);
        let new = slot.set(vec![2]);

        assert!(!slot.clear_generation(old));
        assert!(slot.is_pending());

        assert!(slot.clear_generation(new));
        assert!(!slot.is_pending());
    }

    #[test]
    fn clear_reports_whether_something_was_pending() {
        let slot: IntentSlot<String> = IntentSlot::new(Intent::ProgramTransition);
        assert!(!slot.clear());
        slot.set("Gameplay".to_string());
        assert!(slot.clear());
        assert_eq!(slot.get(), None);
    }

    #[tokio::test]
    async fn wait_idle_returns_once_cleared() {
        let slot = IntentSlot::new(Intent::PreviewScene);
        slot.set("Intro".to_string());

        let waiter = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        slot.clear();
        waiter.await.unwrap();
    }

    #[test]
    fn failure_messages_name_the_intent() {
        assert_eq!(Intent::PreviewScene.failure_message(), "failed to set the preview scene");
        assert_eq!(Intent::ProgramTransition.failure_message(), "failed to change scene");
        assert_eq!(Intent::VolumeSet.failure_message(), "failed to set the volumes");
    }
}
