//! Rust library for driving a local OBS Studio instance over obs-websocket
//!
//! Callers describe the state they want (a scene in the studio mode preview,
//! a transition of the program output, fader and mute values for a set of
//! inputs) and the controller drives OBS there. It:
//!
//! - Keeps one obs-websocket session alive, reconnecting forever
//! - Applies each desired state, reads it back and retries on mismatch
//! - Runs the three kinds of request independently of each other
//! - Converts linear volume percentages into OBS fader decibels
//! - Reports every finished request as a typed outcome
//!
//! # Quick Start
//!
//! ```no_run
//! use obs_local_controller::{ControllerConfig, ObsController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut controller = ObsController::new(ControllerConfig::default());
//!
//!     controller.set_preview_scene("Intro");
//!     controller.preview_scene().wait_idle().await;
//!
//!     controller.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Controller**: owns the session manager and the three intent slots
//! - **Session**: connect/reconnect loop publishing the live session
//! - **Reconcile**: converge-and-verify task per intent
//! - **Connection**: low-level WebSocket protocol handling
//! - **Protocol**: obs-websocket v5 message structures
//! - **Gain**: volume fraction to decibel curve

mod config;
mod connection;
mod controller;
mod device;
mod error;
mod gain;
mod intent;
mod protocol;
mod reconcile;
mod requests;
mod session;
mod subscription;
mod types;

// Public exports
pub use config::{ControllerConfig, RetryPolicy, SessionConfig, DEFAULT_ADDRESS, DEFAULT_PORT};
pub use connection::ObsConnection;
pub use controller::ObsController;
pub use device::{DeviceSession, SessionConnector, WebSocketConnector};
pub use error::{ObsError, ReconcileCause, ReconcileError, Result};
pub use gain::{clamp_fraction, gain, GAIN_FLOOR_DB};
pub use intent::{Desired, Intent, IntentSlot};
pub use protocol::{BatchResult, RequestStatus};
pub use reconcile::Completion;
pub use requests::DeviceRequest;
pub use session::{SessionCell, SessionHandle, SessionManager};
pub use subscription::{OutcomeReceiver, ReconcileEvent};
pub use types::{
    InputName, SceneName, SceneTransition, VolumeTarget, DEFAULT_TRANSITION_DURATION_MS,
    DEFAULT_TRANSITION_EFFECT,
};
