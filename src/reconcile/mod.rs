mod preview;
mod transition;
mod volume;

pub(crate) use preview::reconcile_preview;
pub(crate) use transition::reconcile_transition;
pub(crate) use volume::reconcile_volumes;

use crate::config::RetryPolicy;
use crate::error::{ReconcileError, Result};
use crate::protocol::BatchResult;
use crate::requests::DeviceRequest;
use crate::session::{pause, SessionHandle, SessionWatch};
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// How a reconciliation that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The device matched after this many apply attempts
    Converged { attempts: u32 },
    /// The device already matched; nothing was applied
    AlreadySatisfied,
}

/// Result of one reconciliation; `None` means it was cancelled
pub(crate) type Reconciled = Option<std::result::Result<Completion, ReconcileError>>;

/// Everything a reconciliation task closes over
///
/// A mismatch, a failed request or a request on a session that went away
/// all spend one attempt; waiting for a session does not. Every suspension
/// point checks `cancel`, and a cancelled task returns `None` without
/// touching its slot.
pub(crate) struct ReconcileContext {
    pub(crate) session: SessionWatch,
    pub(crate) cancel: CancellationToken,
    pub(crate) policy: RetryPolicy,
    pub(crate) debug: bool,
}

impl ReconcileContext {
    /// Wait for a live session; `None` once cancelled
    async fn live_session(&mut self, purpose: &str) -> Option<SessionHandle> {
        self.session.wait_live(&self.cancel, purpose).await
    }

    /// Give the device time to apply what was sent; `false` once cancelled
    async fn settle(&self) -> bool {
        pause(&self.cancel, self.policy.settle_delay()).await
    }

    /// Progress messages, only emitted in debug mode
    fn narrate(&self, args: fmt::Arguments<'_>) {
        if self.debug {
            tracing::debug!("{}", args);
        }
    }

    /// Send a batch unless cancelled before or while it is in flight
    async fn batch(
        &self,
        handle: &SessionHandle,
        requests: Vec<DeviceRequest>,
    ) -> Option<Result<Vec<BatchResult>>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            results = handle.session().call_batch(requests) => Some(results),
        }
    }

    /// Send one request unless cancelled before or while it is in flight
    async fn call(&self, handle: &SessionHandle, request: DeviceRequest) -> Option<Result<Value>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            data = handle.session().call(request) => Some(data),
        }
    }
}

/// Read a string field of a response
fn read_string<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

/// Describe the first failed entry of an apply batch, if any
fn first_failure(results: &[BatchResult]) -> Option<String> {
    results.iter().find(|result| !result.succeeded()).map(|result| {
        format!(
            "{} failed with code {}",
            result.request_type, result.request_status.code
        )
    })
}

/// Read back a scene name and compare it with the target.
///
/// Returns `Ok(())` on a match, otherwise a description of what was seen.
async fn verify_scene(
    ctx: &ReconcileContext,
    handle: &SessionHandle,
    request: DeviceRequest,
    target: &str,
) -> Option<std::result::Result<(), String>> {
    let field = request.read_field().unwrap_or_default();
    let observed = match ctx.call(handle, request).await? {
        Ok(data) => data,
        Err(e) => return Some(Err(e.to_string())),
    };
    Some(match read_string(&observed, field) {
        Some(scene) if scene == target => Ok(()),
        Some(scene) => Err(format!("{} is '{}'", field, scene)),
        None => Err(format!("response has no {}", field)),
    })
}
