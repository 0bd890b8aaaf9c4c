//! In-memory stand-ins for OBS used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use obs_local_controller::{
    BatchResult, ControllerConfig, DeviceRequest, DeviceSession, ObsController, ObsError,
    OutcomeReceiver, ReconcileEvent, RequestStatus, SessionConfig, SessionConnector,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Observable state of the fake OBS
#[derive(Debug, Clone, Default)]
pub struct ObsState {
    pub studio_mode: bool,
    pub preview: String,
    pub program: String,
    pub transition: String,
    pub transition_duration: u32,
    /// input name -> (muted, volume dB)
    pub inputs: HashMap<String, (bool, f64)>,
}

/// Ways the fake can misbehave
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Ignore SetCurrentPreviewScene
    pub preview_sticks: bool,
    /// Ignore TriggerStudioModeTransition
    pub transition_sticks: bool,
    /// Added to every volume that gets set
    pub volume_offset_db: f64,
    /// Drop the connection right after this many batches
    pub drop_after_batches: Option<usize>,
}

/// Fake obs-websocket session
#[derive(Default)]
pub struct FakeObs {
    state: Mutex<ObsState>,
    behavior: Mutex<Behavior>,
    batches: Mutex<Vec<Vec<DeviceRequest>>>,
    calls: Mutex<Vec<DeviceRequest>>,
    closed: CancellationToken,
}

impl FakeObs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fake with a program scene and some audio inputs
    pub fn with_scenes(program: &str, inputs: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock().unwrap();
            state.program = program.to_string();
            for input in inputs {
                state.inputs.insert(input.to_string(), (false, 0.0));
            }
        }
        Arc::new(fake)
    }

    pub fn behave(&self, change: impl FnOnce(&mut Behavior)) {
        change(&mut self.behavior.lock().unwrap());
    }

    pub fn state(&self) -> ObsState {
        self.state.lock().unwrap().clone()
    }

    pub fn batches(&self) -> Vec<Vec<DeviceRequest>> {
        self.batches.lock().unwrap().clone()
    }

    /// Batches whose first request is a setter
    pub fn apply_batches(&self) -> Vec<Vec<DeviceRequest>> {
        self.batches()
            .into_iter()
            .filter(|batch| {
                batch
                    .first()
                    .map(|request| request.read_field().is_none())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<DeviceRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Simulate the server going away
    pub fn drop_connection(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn execute(&self, request: &DeviceRequest) -> BatchResult {
        let behavior = self.behavior.lock().unwrap().clone();
        let mut state = self.state.lock().unwrap();

        let outcome: Result<Option<Value>, (i64, &str)> = match request {
            DeviceRequest::SetStudioModeEnabled(enabled) => {
                state.studio_mode = *enabled;
                Ok(None)
            }
            DeviceRequest::SetCurrentPreviewScene(scene) => {
                if !state.studio_mode {
                    Err((506, "studio mode is not active"))
                } else {
                    if !behavior.preview_sticks {
                        state.preview = scene.clone();
                    }
                    Ok(None)
                }
            }
            DeviceRequest::GetCurrentPreviewScene => {
                if !state.studio_mode {
                    Err((506, "studio mode is not active"))
                } else {
                    Ok(Some(json!({ "currentPreviewSceneName": state.preview })))
                }
            }
            DeviceRequest::GetCurrentProgramScene => {
                Ok(Some(json!({ "currentProgramSceneName": state.program })))
            }
            DeviceRequest::SetCurrentSceneTransition(name) => {
                state.transition = name.clone();
                Ok(None)
            }
            DeviceRequest::SetCurrentSceneTransitionDuration(ms) => {
                state.transition_duration = *ms;
                Ok(None)
            }
            DeviceRequest::Sleep(_) => Ok(None),
            DeviceRequest::TriggerStudioModeTransition => {
                if !state.studio_mode {
                    Err((506, "studio mode is not active"))
                } else {
                    if !behavior.transition_sticks {
                        state.program = state.preview.clone();
                    }
                    Ok(None)
                }
            }
            DeviceRequest::SetInputMute { input, muted } => match state.inputs.get_mut(input) {
                Some(entry) => {
                    entry.0 = *muted;
                    Ok(None)
                }
                None => Err((600, "no such input")),
            },
            DeviceRequest::GetInputMute { input } => match state.inputs.get(input) {
                Some(entry) => Ok(Some(json!({ "inputMuted": entry.0 }))),
                None => Err((600, "no such input")),
            },
            DeviceRequest::SetInputVolumeDb { input, db } => match state.inputs.get_mut(input) {
                Some(entry) => {
                    entry.1 = db + behavior.volume_offset_db;
                    Ok(None)
                }
                None => Err((600, "no such input")),
            },
            DeviceRequest::GetInputVolumeDb { input } => match state.inputs.get(input) {
                Some(entry) => Ok(Some(json!({
                    "inputVolumeDb": entry.1,
                    "inputVolumeMul": 10f64.powf(entry.1 / 20.0),
                }))),
                None => Err((600, "no such input")),
            },
        };

        let (request_status, response_data) = match outcome {
            Ok(data) => (
                RequestStatus {
                    result: true,
                    code: 100,
                    comment: None,
                },
                data,
            ),
            Err((code, comment)) => (
                RequestStatus {
                    result: false,
                    code,
                    comment: Some(comment.to_string()),
                },
                None,
            ),
        };

        BatchResult {
            request_type: request.request_type().to_string(),
            request_status,
            response_data,
        }
    }
}

#[async_trait]
impl DeviceSession for FakeObs {
    async fn call(&self, request: DeviceRequest) -> obs_local_controller::Result<Value> {
        if self.is_closed() {
            return Err(ObsError::ConnectionClosed);
        }
        self.calls.lock().unwrap().push(request.clone());

        let result = self.execute(&request);
        if !result.succeeded() {
            return Err(ObsError::RequestFailed {
                request_type: result.request_type,
                code: result.request_status.code,
                comment: result.request_status.comment,
            });
        }
        Ok(result.response_data.unwrap_or(Value::Null))
    }

    async fn call_batch(&self, requests: Vec<DeviceRequest>) -> obs_local_controller::Result<Vec<BatchResult>> {
        if self.is_closed() {
            return Err(ObsError::ConnectionClosed);
        }

        let results = requests.iter().map(|request| self.execute(request)).collect();
        let sent = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(requests);
            batches.len()
        };

        let drop_after = self.behavior.lock().unwrap().drop_after_batches;
        if drop_after == Some(sent) {
            self.drop_connection();
        }

        Ok(results)
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

/// Connector that fails a number of times, then hands out queued fakes
#[derive(Default)]
pub struct ScriptedConnector {
    failures_left: Mutex<u32>,
    attempts: AtomicU32,
    sessions: Mutex<VecDeque<Arc<FakeObs>>>,
    configs: Mutex<Vec<SessionConfig>>,
    open_delay: Duration,
    handed_out: AtomicU32,
}

impl ScriptedConnector {
    /// Fail `failures` times, then serve `sessions` in order
    pub fn new(failures: u32, sessions: Vec<Arc<FakeObs>>) -> Arc<Self> {
        Arc::new(Self {
            failures_left: Mutex::new(failures),
            sessions: Mutex::new(sessions.into()),
            ..Default::default()
        })
    }

    /// Serve `sessions` in order, each open taking `delay`
    pub fn slow(delay: Duration, sessions: Vec<Arc<FakeObs>>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            open_delay: delay,
            ..Default::default()
        })
    }

    /// Sessions that were actually returned from `open`
    pub fn handed_out(&self) -> u32 {
        self.handed_out.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        self.configs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn open(&self, config: &SessionConfig) -> obs_local_controller::Result<Arc<dyn DeviceSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().unwrap().push(config.clone());

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }

        {
            let mut failures = self.failures_left.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ObsError::Timeout);
            }
        }

        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(session) => {
                self.handed_out.fetch_add(1, Ordering::SeqCst);
                Ok(session)
            }
            None => Err(ObsError::ConnectionClosed),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Controller in debug mode on top of `connector`
pub fn controller(connector: Arc<ScriptedConnector>) -> ObsController {
    init_tracing();
    let config = ControllerConfig {
        debug: true,
        ..Default::default()
    };
    ObsController::with_connector(config, connector)
}

/// Next outcome, failing the test if none arrives within two virtual minutes
pub async fn next_outcome(outcomes: &mut OutcomeReceiver) -> ReconcileEvent {
    tokio::time::timeout(Duration::from_secs(120), outcomes.recv())
        .await
        .expect("no outcome within the deadline")
        .expect("outcome channel closed")
}
