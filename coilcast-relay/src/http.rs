//! HTTP relay: the `/` and `/reset` endpoints and the `/ws` upgrade.

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use coilcast_common::SamplePair;
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, warn};

use crate::poller::{ClientSettings, CycleError, PollingClient};
use crate::session_log::SharedSessionLog;
use crate::transport::TcpConnector;
use crate::ws::ws_handler;

/// Body of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DataReply {
    pub x: f64,
    pub y: f32,
}

impl From<SamplePair> for DataReply {
    fn from(sample: SamplePair) -> Self {
        Self {
            x: sample.epoch_time,
            y: sample.sin_value,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    connector: TcpConnector,
    settings: ClientSettings,
    session_log: SharedSessionLog,
    shutdown: Option<watch::Receiver<bool>>,
}

impl AppState {
    pub fn new(
        connector: TcpConnector,
        settings: ClientSettings,
        session_log: SharedSessionLog,
    ) -> Self {
        Self {
            connector,
            settings,
            session_log,
            shutdown: None,
        }
    }

    /// Let long-lived sessions observe the shutdown signal.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn session_log(&self) -> &SharedSessionLog {
        &self.session_log
    }

    /// A new client with its own connection to the Modbus server.
    pub fn client(&self) -> PollingClient<TcpConnector> {
        PollingClient::new(self.connector.clone(), self.settings)
    }

    /// Run one cycle on `client` and record its outcome in the session log.
    pub async fn sample(
        &self,
        client: &mut PollingClient<TcpConnector>,
    ) -> Result<SamplePair, CycleError> {
        let result = client.poll_once().await;

        let logged = match &result {
            Ok(sample) => self.session_log.record(sample),
            Err(e) => self.session_log.record_fault(e),
        };
        if let Err(e) = logged {
            warn!(error = %e, "Session log write failed");
        }

        result
    }

    /// Resolves once shutdown is signalled; never resolves without a signal.
    pub(crate) async fn stopped(&self) {
        match self.shutdown.clone() {
            Some(mut shutdown) => {
                if shutdown.wait_for(|stop| *stop).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// CORS policy admitting only `origins`, for GET requests.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET])
}

/// Create the HTTP router.
pub fn create_router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/", get(data_handler))
        .route("/reset", get(reset_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

/// Handler for `GET /`.
async fn data_handler(State(state): State<AppState>) -> Response {
    let mut client = state.client();
    let result = state.sample(&mut client).await;
    client.stop();

    match result {
        Ok(sample) => {
            debug!(epoch_time = sample.epoch_time, "Served sample");
            Json(DataReply::from(sample)).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": e.kind() })),
        )
            .into_response(),
    }
}

/// Handler for `GET /reset`.
async fn reset_handler(State(state): State<AppState>) -> Response {
    state.session_log.reset();
    Json(json!({})).into_response()
}

async fn health_handler() -> Response {
    (StatusCode::OK, "healthy\n").into_response()
}

/// A bound HTTP relay server.
pub struct HttpServer {
    listener: TcpListener,
    state: AppState,
    cors_origins: Vec<String>,
}

impl HttpServer {
    /// Bind the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        state: AppState,
        cors_origins: Vec<String>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state,
            cors_origins,
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the HTTP server until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let local_addr = self.listener.local_addr()?;
        let state = self.state.with_shutdown(shutdown.clone());
        let router = create_router(state, cors_layer(&self.cors_origins));

        info!(
            addr = %local_addr,
            origins = ?self.cors_origins,
            "HTTP relay listening"
        );

        let mut shutdown = shutdown;
        axum::serve(self.listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
                info!("HTTP relay shutting down");
            })
            .await
            .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

        info!("HTTP relay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_log::SessionLog;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    /// A port with nothing listening on it.
    fn dead_port() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn make_state(dir: &tempfile::TempDir) -> AppState {
        let settings = ClientSettings {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(1),
        };
        AppState::new(
            TcpConnector::from_addr(dead_port(), 1),
            settings,
            Arc::new(SessionLog::new(dir.path())),
        )
    }

    fn make_router(state: AppState) -> Router {
        create_router(state, cors_layer(&["http://localhost:5006".to_string()]))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_data_reply_shape() {
        let reply = DataReply::from(SamplePair {
            epoch_time: 1_700_000_000.5,
            sin_value: 0.25,
        });

        assert_eq!(
            serde_json::to_value(reply).unwrap(),
            json!({ "x": 1_700_000_000.5, "y": 0.25 })
        );
    }

    #[tokio::test]
    async fn test_data_endpoint_server_down() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "modbus transport unavailable" })
        );
    }

    #[tokio::test]
    async fn test_failed_read_opens_no_session_log() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir);
        let router = make_router(state.clone());

        router
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(state.session_log().current_path().is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_reset_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(&dir);
        state
            .session_log()
            .record(&SamplePair::at(1_700_000_000.5))
            .unwrap();
        let router = make_router(state.clone());

        let response = router
            .oneshot(Request::get("/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({}));
        assert!(state.session_log().current_path().is_none());
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allowed_origin() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(
                Request::get("/reset")
                    .header(ORIGIN, "http://localhost:5006")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5006"
        );
    }

    #[tokio::test]
    async fn test_cors_rejected_origin() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(
                Request::get("/reset")
                    .header(ORIGIN, "http://evil.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(
                Request::options("/")
                    .header(ORIGIN, "http://localhost:5006")
                    .header("access-control-request-method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5006"
        );
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let dir = tempfile::tempdir().unwrap();
        let router = make_router(make_state(&dir));

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
