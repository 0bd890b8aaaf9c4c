use crate::config::{ControllerConfig, RetryPolicy, SessionConfig};
use crate::device::{SessionConnector, WebSocketConnector};
use crate::intent::{Desired, Intent, IntentSlot};
use crate::reconcile::{
    reconcile_preview, reconcile_transition, reconcile_volumes, Completion, ReconcileContext,
    Reconciled,
};
use crate::session::{SessionCell, SessionHandle, SessionManager};
use crate::subscription::{OutcomeReceiver, ReconcileEvent};
use crate::types::{SceneName, SceneTransition, VolumeTarget};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 100;

/// Drives a local OBS instance towards the requested preview scene, program
/// scene and mixer state
///
/// The controller owns one [`SessionManager`] and three intent slots. Setting
/// a slot starts a converge-and-verify task for it; the slot is cleared when
/// the task finishes, successfully or not, and the outcome is reported on
/// [`subscribe_outcomes`](ObsController::subscribe_outcomes). The three
/// intents never wait on each other.
///
/// Must be created inside a tokio runtime.
///
/// # Example
///
/// ```no_run
/// use obs_local_controller::{ControllerConfig, ObsController, SceneTransition, VolumeTarget};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut controller = ObsController::new(ControllerConfig::default());
///     let mut outcomes = controller.subscribe_outcomes();
///
///     controller.set_transition(SceneTransition::new("Gameplay", "Fade", 300));
///     controller.set_volumes(vec![VolumeTarget::new("Mic", 0.5).with_mute(false)]);
///
///     for _ in 0..2 {
///         let event = outcomes.recv().await?;
///         println!("{}: {:?}", event.intent, event.result);
///     }
///
///     controller.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct ObsController {
    config: ControllerConfig,
    connector: Arc<dyn SessionConnector>,
    cell: SessionCell,
    session: SessionManager,
    preview: IntentSlot<SceneName>,
    transition: IntentSlot<SceneTransition>,
    volumes: IntentSlot<Vec<VolumeTarget>>,
    events: broadcast::Sender<ReconcileEvent>,
    running: CancellationToken,
    dispatchers: Vec<JoinHandle<()>>,
}

impl ObsController {
    /// Controller talking to a real obs-websocket server
    pub fn new(config: ControllerConfig) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.timing.request_timeout()));
        Self::with_connector(config, connector)
    }

    /// Controller opening its sessions through `connector`
    pub fn with_connector(config: ControllerConfig, connector: Arc<dyn SessionConnector>) -> Self {
        let running = CancellationToken::new();
        let cell = SessionCell::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let session = SessionManager::start(
            config.session.clone(),
            connector.clone(),
            cell.clone(),
            config.timing.clone(),
            &running,
            config.debug,
        );

        let preview = IntentSlot::new(Intent::PreviewScene);
        let transition = IntentSlot::new(Intent::ProgramTransition);
        let volumes = IntentSlot::new(Intent::VolumeSet);

        let dispatch = Dispatch {
            cell: cell.clone(),
            events: events.clone(),
            running: running.clone(),
            policy: config.timing.clone(),
            debug: config.debug,
        };
        let dispatchers = vec![
            spawn_dispatcher(preview.clone(), dispatch.clone(), reconcile_preview),
            spawn_dispatcher(transition.clone(), dispatch.clone(), reconcile_transition),
            spawn_dispatcher(volumes.clone(), dispatch, reconcile_volumes),
        ];

        Self {
            config,
            connector,
            cell,
            session,
            preview,
            transition,
            volumes,
            events,
            running,
            dispatchers,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Live session, if connected
    pub fn session(&self) -> Option<SessionHandle> {
        self.cell.current()
    }

    pub fn is_connected(&self) -> bool {
        self.session().is_some()
    }

    /// Desired studio mode preview scene
    pub fn preview_scene(&self) -> &IntentSlot<SceneName> {
        &self.preview
    }

    /// Desired program transition
    pub fn transition(&self) -> &IntentSlot<SceneTransition> {
        &self.transition
    }

    /// Desired mixer state
    pub fn volumes(&self) -> &IntentSlot<Vec<VolumeTarget>> {
        &self.volumes
    }

    /// Request a preview scene; returns the request's generation
    pub fn set_preview_scene(&self, scene: impl Into<SceneName>) -> u64 {
        self.preview.set(scene.into())
    }

    /// Request a program transition; returns the request's generation
    pub fn set_transition(&self, transition: SceneTransition) -> u64 {
        self.transition.set(transition)
    }

    /// Request fader and mute values; returns the request's generation
    pub fn set_volumes(&self, targets: Vec<VolumeTarget>) -> u64 {
        self.volumes.set(targets)
    }

    /// Subscribe to reconciliation outcomes
    pub fn subscribe_outcomes(&self) -> OutcomeReceiver {
        OutcomeReceiver::new(self.events.subscribe())
    }

    /// Point the controller at a different server
    ///
    /// An identical config keeps the current session. Otherwise the session
    /// is torn down and a new connect loop starts; pending intents keep
    /// waiting and run against the new session.
    pub async fn reconfigure(&mut self, session: SessionConfig) {
        if session == self.config.session {
            return;
        }

        self.session.shutdown().await;
        self.config.session = session;
        self.session = SessionManager::start(
            self.config.session.clone(),
            self.connector.clone(),
            self.cell.clone(),
            self.config.timing.clone(),
            &self.running,
            self.config.debug,
        );
    }

    /// Cancel every in-flight intent and close the session
    ///
    /// Pending desired values are left in their slots.
    pub async fn shutdown(&mut self) {
        self.running.cancel();
        self.session.shutdown().await;
        for dispatcher in self.dispatchers.drain(..) {
            let _ = dispatcher.await;
        }
    }
}

impl Drop for ObsController {
    fn drop(&mut self) {
        self.running.cancel();
    }
}

/// What each dispatcher needs to build reconciliation tasks
#[derive(Clone)]
struct Dispatch {
    cell: SessionCell,
    events: broadcast::Sender<ReconcileEvent>,
    running: CancellationToken,
    policy: RetryPolicy,
    debug: bool,
}

impl Dispatch {
    fn context(&self, cancel: CancellationToken) -> ReconcileContext {
        ReconcileContext {
            session: self
                .cell
                .watch(self.running.clone(), self.policy.session_poll(), self.debug),
            cancel,
            policy: self.policy.clone(),
            debug: self.debug,
        }
    }
}

/// Supervise one intent slot
///
/// A new generation in the slot cancels the running task, if any, and spawns
/// a fresh one. The slot going empty cancels the running task.
fn spawn_dispatcher<T, F, Fut>(slot: IntentSlot<T>, dispatch: Dispatch, reconcile: F) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
    F: Fn(ReconcileContext, T) -> Fut + Send + 'static,
    Fut: Future<Output = Reconciled> + Send + 'static,
{
    let mut rx = slot.subscribe();

    tokio::spawn(async move {
        let intent = slot.intent();
        let mut active: Option<(u64, CancellationToken)> = None;

        loop {
            let desired = rx.borrow_and_update().clone();
            match desired {
                Some(Desired { generation, value }) => {
                    if active.as_ref().map(|(running, _)| *running) != Some(generation) {
                        if let Some((superseded, token)) = active.take() {
                            tracing::debug!("{} request {} superseded by {}", intent, superseded, generation);
                            token.cancel();
                        }

                        let cancel = dispatch.running.child_token();
                        active = Some((generation, cancel.clone()));

                        let work = reconcile(dispatch.context(cancel), value);
                        tokio::spawn(finish(slot.clone(), generation, dispatch.events.clone(), work));
                    }
                }
                None => {
                    if let Some((withdrawn, token)) = active.take() {
                        tracing::debug!("{} request {} released", intent, withdrawn);
                        token.cancel();
                    }
                }
            }

            tokio::select! {
                _ = dispatch.running.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some((_, token)) = active.take() {
            token.cancel();
        }
    })
}

/// Run one reconciliation, report it and release the slot
async fn finish<T, Fut>(
    slot: IntentSlot<T>,
    generation: u64,
    events: broadcast::Sender<ReconcileEvent>,
    work: Fut,
) where
    T: Clone,
    Fut: Future<Output = Reconciled>,
{
    let intent = slot.intent();
    let Some(result) = work.await else {
        tracing::debug!("{} request {} cancelled", intent, generation);
        return;
    };

    match &result {
        Ok(Completion::Converged { attempts }) => {
            tracing::info!("{} request {} applied after {} attempt(s)", intent, generation, attempts);
        }
        Ok(Completion::AlreadySatisfied) => {
            tracing::info!("{} request {} already satisfied", intent, generation);
        }
        Err(e) => tracing::error!("{} request {}: {}", intent, generation, e),
    }

    let _ = events.send(ReconcileEvent {
        intent,
        generation,
        result,
    });
    slot.clear_generation(generation);
}
