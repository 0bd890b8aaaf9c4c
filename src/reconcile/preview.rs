use super::{first_failure, verify_scene, Completion, ReconcileContext, Reconciled};
use crate::error::ReconcileError;
use crate::intent::Intent;
use crate::requests::DeviceRequest;
use crate::types::SceneName;

/// Put `scene` into the studio mode preview slot
pub(crate) async fn reconcile_preview(mut ctx: ReconcileContext, scene: SceneName) -> Reconciled {
    let attempts = ctx.policy.preview_attempts;
    let mut last_observation = String::from("no attempt made");

    for attempt in 1..=attempts {
        let handle = ctx.live_session("changing the preview scene").await?;

        let apply = vec![
            DeviceRequest::SetStudioModeEnabled(true),
            DeviceRequest::SetCurrentPreviewScene(scene.clone()),
        ];
        match ctx.batch(&handle, apply).await? {
            Ok(results) => {
                if let Some(failure) = first_failure(&results) {
                    ctx.narrate(format_args!("preview batch: {}", failure));
                }
            }
            Err(e) => ctx.narrate(format_args!("preview batch failed: {}", e)),
        }

        if !ctx.settle().await {
            return None;
        }

        match verify_scene(&ctx, &handle, DeviceRequest::GetCurrentPreviewScene, &scene).await? {
            Ok(()) => {
                ctx.narrate(format_args!("preview scene set successfully!"));
                return Some(Ok(Completion::Converged { attempts: attempt }));
            }
            Err(observation) => {
                ctx.narrate(format_args!(
                    "failed to set the preview scene ({}), retrying...",
                    observation
                ));
                last_observation = observation;
            }
        }
    }

    Some(Err(ReconcileError::exhausted(
        Intent::PreviewScene,
        attempts,
        last_observation,
    )))
}
