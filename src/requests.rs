use crate::protocol::BatchEntry;
use serde_json::{json, Value};

/// Device operations used by the reconcilers
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRequest {
    SetStudioModeEnabled(bool),
    SetCurrentPreviewScene(String),
    GetCurrentPreviewScene,
    GetCurrentProgramScene,
    SetCurrentSceneTransition(String),
    SetCurrentSceneTransitionDuration(u32),
    /// Server-side pause inside a batch
    Sleep(u64),
    TriggerStudioModeTransition,
    SetInputMute { input: String, muted: bool },
    GetInputMute { input: String },
    SetInputVolumeDb { input: String, db: f64 },
    GetInputVolumeDb { input: String },
}

impl DeviceRequest {
    /// obs-websocket `requestType`
    pub fn request_type(&self) -> &'static str {
        match self {
            Self::SetStudioModeEnabled(_) => "SetStudioModeEnabled",
            Self::SetCurrentPreviewScene(_) => "SetCurrentPreviewScene",
            Self::GetCurrentPreviewScene => "GetCurrentPreviewScene",
            Self::GetCurrentProgramScene => "GetCurrentProgramScene",
            Self::SetCurrentSceneTransition(_) => "SetCurrentSceneTransition",
            Self::SetCurrentSceneTransitionDuration(_) => "SetCurrentSceneTransitionDuration",
            Self::Sleep(_) => "Sleep",
            Self::TriggerStudioModeTransition => "TriggerStudioModeTransition",
            Self::SetInputMute { .. } => "SetInputMute",
            Self::GetInputMute { .. } => "GetInputMute",
            Self::SetInputVolumeDb { .. } => "SetInputVolume",
            Self::GetInputVolumeDb { .. } => "GetInputVolume",
        }
    }

    /// obs-websocket `requestData`, if the request takes any
    pub fn request_data(&self) -> Option<Value> {
        match self {
            Self::SetStudioModeEnabled(enabled) => Some(json!({ "studioModeEnabled": enabled })),
            Self::SetCurrentPreviewScene(scene) => Some(json!({ "sceneName": scene })),
            Self::SetCurrentSceneTransition(name) => Some(json!({ "transitionName": name })),
            Self::SetCurrentSceneTransitionDuration(ms) => {
                Some(json!({ "transitionDuration": ms }))
            }
            Self::Sleep(ms) => Some(json!({ "sleepMillis": ms })),
            Self::SetInputMute { input, muted } => {
                Some(json!({ "inputName": input, "inputMuted": muted }))
            }
            Self::GetInputMute { input } | Self::GetInputVolumeDb { input } => {
                Some(json!({ "inputName": input }))
            }
            Self::SetInputVolumeDb { input, db } => {
                Some(json!({ "inputName": input, "inputVolumeDb": db }))
            }
            Self::GetCurrentPreviewScene
            | Self::GetCurrentProgramScene
            | Self::TriggerStudioModeTransition => None,
        }
    }

    /// Response field carrying the value a getter reads back
    pub fn read_field(&self) -> Option<&'static str> {
        match self {
            Self::GetCurrentPreviewScene => Some("currentPreviewSceneName"),
            Self::GetCurrentProgramScene => Some("currentProgramSceneName"),
            Self::GetInputMute { .. } => Some("inputMuted"),
            Self::GetInputVolumeDb { .. } => Some("inputVolumeDb"),
            _ => None,
        }
    }

    pub(crate) fn to_batch_entry(&self) -> BatchEntry {
        BatchEntry {
            request_type: self.request_type().to_string(),
            request_data: self.request_data(),
        }
    }
}
