use super::{first_failure, read_string, verify_scene, Completion, ReconcileContext, Reconciled};
use crate::error::ReconcileError;
use crate::intent::Intent;
use crate::requests::DeviceRequest;
use crate::types::SceneTransition;

/// Requests that stage `transition` in studio mode and fire it
fn transition_batch(transition: &SceneTransition, pause_ms: u64) -> Vec<DeviceRequest> {
    vec![
        DeviceRequest::SetStudioModeEnabled(true),
        DeviceRequest::SetCurrentPreviewScene(transition.scene.clone()),
        DeviceRequest::SetCurrentSceneTransition(transition.effect_name().to_string()),
        DeviceRequest::SetCurrentSceneTransitionDuration(transition.duration()),
        // OBS does not reliably honor a trigger sent right after configuring the transition
        DeviceRequest::Sleep(pause_ms),
        DeviceRequest::TriggerStudioModeTransition,
    ]
}

/// Switch the program output to the transition's scene
pub(crate) async fn reconcile_transition(mut ctx: ReconcileContext, transition: SceneTransition) -> Reconciled {
    let handle = ctx.live_session("changing scenes").await?;

    match ctx.call(&handle, DeviceRequest::GetCurrentProgramScene).await? {
        Ok(data) if read_string(&data, "currentProgramSceneName") == Some(transition.scene.as_str()) => {
            ctx.narrate(format_args!("'{}' is already on program", transition.scene));
            return Some(Ok(Completion::AlreadySatisfied));
        }
        Ok(_) => {}
        Err(e) => ctx.narrate(format_args!("could not read the program scene: {}", e)),
    }

    let attempts = ctx.policy.transition_attempts;
    let mut last_observation = String::from("no attempt made");

    for attempt in 1..=attempts {
        let handle = ctx.live_session("changing scenes").await?;

        let apply = transition_batch(&transition, ctx.policy.transition_pause_ms);
        match ctx.batch(&handle, apply).await? {
            Ok(results) => {
                if let Some(failure) = first_failure(&results) {
                    ctx.narrate(format_args!("transition batch: {}", failure));
                }
            }
            Err(e) => ctx.narrate(format_args!("transition batch failed: {}", e)),
        }

        if !ctx.settle().await {
            return None;
        }

        match verify_scene(&ctx, &handle, DeviceRequest::GetCurrentProgramScene, &transition.scene).await? {
            Ok(()) => {
                ctx.narrate(format_args!("scene changed successfully!"));
                return Some(Ok(Completion::Converged { attempts: attempt }));
            }
            Err(observation) => {
                ctx.narrate(format_args!("failed to change the scene ({}), retrying...", observation));
                last_observation = observation;
            }
        }
    }

    Some(Err(ReconcileError::exhausted(
        Intent::ProgramTransition,
        attempts,
        last_observation,
    )))
}
