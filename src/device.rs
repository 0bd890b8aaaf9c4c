use crate::config::SessionConfig;
use crate::connection::ObsConnection;
use crate::error::Result;
use crate::protocol::BatchResult;
use crate::requests::DeviceRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A live session with the device
///
/// Implemented by [`ObsConnection`]; tests plug in an in-memory fake.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Send one request, returning its response data
    async fn call(&self, request: DeviceRequest) -> Result<Value>;

    /// Send requests as one batch, returning one result per request
    async fn call_batch(&self, requests: Vec<DeviceRequest>) -> Result<Vec<BatchResult>>;

    /// Token cancelled once the session is gone, for whatever reason
    fn closed(&self) -> CancellationToken;

    /// Tear the session down
    async fn close(&self);
}

/// Opens sessions for the [`SessionManager`](crate::session::SessionManager)
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(&self, config: &SessionConfig) -> Result<Arc<dyn DeviceSession>>;
}

#[async_trait]
impl DeviceSession for ObsConnection {
    async fn call(&self, request: DeviceRequest) -> Result<Value> {
        ObsConnection::call(self, &request).await
    }

    async fn call_batch(&self, requests: Vec<DeviceRequest>) -> Result<Vec<BatchResult>> {
        ObsConnection::call_batch(self, &requests).await
    }

    fn closed(&self) -> CancellationToken {
        ObsConnection::closed(self)
    }

    async fn close(&self) {
        ObsConnection::close(self)
    }
}

/// Connector opening real obs-websocket sessions
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    request_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl SessionConnector for WebSocketConnector {
    async fn open(&self, config: &SessionConfig) -> Result<Arc<dyn DeviceSession>> {
        let connection = ObsConnection::connect(
            config.url(),
            config.password.as_deref(),
            self.request_timeout,
        )
        .await?;

        Ok(Arc::new(connection))
    }
}
