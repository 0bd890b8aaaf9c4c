use super::{first_failure, Completion, ReconcileContext, Reconciled};
use crate::error::ReconcileError;
use crate::gain::{clamp_fraction, gain};
use crate::intent::Intent;
use crate::protocol::BatchResult;
use crate::requests::DeviceRequest;
use crate::types::VolumeTarget;
use serde_json::Value;

/// Value a read-back is expected to return
#[derive(Debug, Clone, PartialEq)]
enum Expected {
    Muted(bool),
    VolumeDb(f64),
}

/// A set request, the getter mirroring it and the value the getter should see
#[derive(Debug, Clone, PartialEq)]
struct Step {
    set: DeviceRequest,
    get: DeviceRequest,
    expected: Expected,
}

/// Turn targets into steps: an optional mute followed by the volume, per input
fn plan(targets: &[VolumeTarget]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(targets.len() * 2);

    for target in targets {
        if let Some(muted) = target.mute {
            steps.push(Step {
                set: DeviceRequest::SetInputMute {
                    input: target.input.clone(),
                    muted,
                },
                get: DeviceRequest::GetInputMute {
                    input: target.input.clone(),
                },
                expected: Expected::Muted(muted),
            });
        }

        let db = gain(clamp_fraction(target.volume));
        steps.push(Step {
            set: DeviceRequest::SetInputVolumeDb {
                input: target.input.clone(),
                db,
            },
            get: DeviceRequest::GetInputVolumeDb {
                input: target.input.clone(),
            },
            expected: Expected::VolumeDb(db),
        });
    }

    steps
}

/// Whole decibels, so float noise in the read-back does not count as a mismatch
fn whole_db(db: f64) -> i64 {
    db.trunc() as i64
}

/// Check one read-back against its expectation
fn check(result: &BatchResult, expected: &Expected) -> Result<(), String> {
    if !result.succeeded() {
        return Err(format!(
            "{} failed with code {}",
            result.request_type, result.request_status.code
        ));
    }

    match expected {
        Expected::Muted(muted) => match result.field("inputMuted").and_then(Value::as_bool) {
            Some(actual) if actual == *muted => Ok(()),
            Some(actual) => Err(format!("inputMuted is {} instead of {}", actual, muted)),
            None => Err("response has no inputMuted".to_string()),
        },
        Expected::VolumeDb(db) => match result.field("inputVolumeDb").and_then(Value::as_f64) {
            Some(actual) if whole_db(actual) == whole_db(*db) => Ok(()),
            Some(actual) => Err(format!("inputVolumeDb is {} instead of {}", actual, db)),
            None => Err("response has no inputVolumeDb".to_string()),
        },
    }
}

/// Compare a read-back batch with the plan
fn compare(steps: &[Step], results: &[BatchResult]) -> Result<(), String> {
    if results.len() != steps.len() {
        return Err(format!(
            "expected {} read-backs, got {}",
            steps.len(),
            results.len()
        ));
    }
    steps
        .iter()
        .zip(results)
        .try_for_each(|(step, result)| check(result, &step.expected))
}

/// Set mute flags and faders of the listed inputs
pub(crate) async fn reconcile_volumes(mut ctx: ReconcileContext, targets: Vec<VolumeTarget>) -> Reconciled {
    if targets.is_empty() {
        return Some(Ok(Completion::AlreadySatisfied));
    }

    let steps = plan(&targets);
    let attempts = ctx.policy.volume_attempts;
    let mut last_observation = String::from("no attempt made");

    for attempt in 1..=attempts {
        let handle = ctx.live_session("setting the volumes").await?;

        let apply = steps.iter().map(|step| step.set.clone()).collect();
        match ctx.batch(&handle, apply).await? {
            Ok(results) => {
                if let Some(failure) = first_failure(&results) {
                    ctx.narrate(format_args!("volume batch: {}", failure));
                }
            }
            Err(e) => ctx.narrate(format_args!("volume batch failed: {}", e)),
        }

        if !ctx.settle().await {
            return None;
        }

        let read = steps.iter().map(|step| step.get.clone()).collect();
        let outcome = match ctx.batch(&handle, read).await? {
            Ok(results) => compare(&steps, &results),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(()) => {
                ctx.narrate(format_args!("volumes set successfully!"));
                return Some(Ok(Completion::Converged { attempts: attempt }));
            }
            Err(observation) => {
                ctx.narrate(format_args!("failed to set the volumes ({}), retrying...", observation));
                last_observation = observation;
            }
        }
    }

    Some(Err(ReconcileError::exhausted(
        Intent::VolumeSet,
        attempts,
        last_observation,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestStatus;
    use serde_json::json;

    fn result(request_type: &str, data: Value) -> BatchResult {
        BatchResult {
            request_type: request_type.to_string(),
            request_status: RequestStatus {
                result: true,
                code: 100,
                comment: None,
            },
            response_data: Some(data),
        }
    }

    #[test]
    fn plan_puts_mute_before_volume() {
        let steps = plan(&[VolumeTarget::new("Mic", 0.5).with_mute(false)]);
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps[0].set,
            DeviceRequest::SetInputMute {
                input: "Mic".to_string(),
                muted: false
            }
        );
        assert_eq!(
            steps[1].set,
            DeviceRequest::SetInputVolumeDb {
                input: "Mic".to_string(),
                db: -20.25
            }
        );
        assert_eq!(steps[1].expected, Expected::VolumeDb(-20.25));
    }

    #[test]
    fn plan_skips_unspecified_mute_and_clamps() {
        let steps = plan(&[VolumeTarget::new("Music", 3.0), VolumeTarget::new("Game", -1.0)]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].expected, Expected::VolumeDb(0.0));
        assert_eq!(steps[1].expected, Expected::VolumeDb(-100.0));
    }

    #[test]
    fn volume_compares_whole_decibels() {
        let expected = Expected::VolumeDb(-20.25);
        assert!(check(&result("GetInputVolume", json!({ "inputVolumeDb": -20.2499 })), &expected).is_ok());
        assert!(check(&result("GetInputVolume", json!({ "inputVolumeDb": -20.9 })), &expected).is_ok());
        assert!(check(&result("GetInputVolume", json!({ "inputVolumeDb": -21.0 })), &expected).is_err());
    }

    #[test]
    fn mute_compares_booleans() {
        let expected = Expected::Muted(true);
        assert!(check(&result("GetInputMute", json!({ "inputMuted": true })), &expected).is_ok());
        assert!(check(&result("GetInputMute", json!({ "inputMuted": false })), &expected).is_err());
        assert!(check(&result("GetInputMute", json!({})), &expected).is_err());
    }

    #[test]
    fn count_mismatch_is_a_mismatch() {
        let steps = plan(&[VolumeTarget::new("Mic", 1.0)]);
        assert!(compare(&steps, &[]).is_err());
        assert!(compare(&steps, &[result("GetInputVolume", json!({ "inputVolumeDb": 0.0 }))]).is_ok());
    }

    #[test]
    fn failed_read_back_is_a_mismatch() {
        let mut failed = result("GetInputMute", json!({ "inputMuted": true }));
        failed.request_status.result = false;
        failed.request_status.code = 600;
        assert_eq!(
            check(&failed, &Expected::Muted(true)),
            Err("GetInputMute failed with code 600".to_string())
        );
    }
}
