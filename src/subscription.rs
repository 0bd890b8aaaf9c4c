use crate::error::{ObsError, ReconcileError, Result};
use crate::intent::Intent;
use crate::reconcile::Completion;
use tokio::sync::broadcast;

/// Report of one finished reconciliation
///
/// Sent before the intent's slot is cleared, so a caller that sees the slot
/// go empty can always find out how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileEvent {
    pub intent: Intent,
    /// Generation of the desired value this reconciliation ran for
    pub generation: u64,
    pub result: std::result::Result<Completion, ReconcileError>,
}

impl ReconcileEvent {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Receiver for reconciliation outcomes
pub struct OutcomeReceiver {
    rx: broadcast::Receiver<ReconcileEvent>,
}

impl OutcomeReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<ReconcileEvent>) -> Self {
        Self { rx }
    }

    /// Receive the next outcome
    ///
    /// Fails with `ControllerStopped` once the controller is gone.
    pub async fn recv(&mut self) -> Result<ReconcileEvent> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => ObsError::ControllerStopped,
            broadcast::error::RecvError::Lagged(n) => {
                ObsError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Receive the next outcome for one intent, skipping the others
    pub async fn recv_for(&mut self, intent: Intent) -> Result<ReconcileEvent> {
        loop {
            let event = self.recv().await?;
            if event.intent == intent {
                return Ok(event);
            }
        }
    }

    /// Try to receive an outcome without blocking
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<ReconcileEvent>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(ObsError::ControllerStopped),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(ObsError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
