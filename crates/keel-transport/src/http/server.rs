//! The `web-server` module.
//!
//! Every method and path lands on one fallback handler that decodes the
//! HTTP request, runs it through the [`Pipeline`] and encodes the result.
//! Routing is the pipeline's job; axum only provides the HTTP plumbing.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::Request as HttpRequest;
use axum::response::Response as HttpResponse;
use keel_core::{
    AppError, BoxError, BoxedModule, Module, Priority, Request, Response, ServerModule,
    async_trait,
};
use keel_framework::{
    AppContext, BUILTIN_MODULES, ModuleConfig, ModuleDescriptor, ModuleKind, Pipeline,
};
use linkme::distributed_slice;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::codec;

/// Error code for bind and serve failures.
pub const WEBSERVER_ERROR: &str = "WEBSERVER_ERROR";

#[distributed_slice(BUILTIN_MODULES)]
static WEB_SERVER: ModuleDescriptor = ModuleDescriptor {
    name: WebServerModule::NAME,
    kind: ModuleKind::Server,
    factory: WebServerModule::create,
    default_config: WebServerModule::default_config,
};

// =============================================================================
// Settings
// =============================================================================

/// `web-server` module settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebServerSettings {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
}

impl Default for WebServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 1024 * 1024,
        }
    }
}

impl WebServerSettings {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Module
// =============================================================================

struct ServerState {
    pipeline: Pipeline,
    body_limit: usize,
}

/// A bound listener and its serve task.
struct Running {
    local_addr: SocketAddr,
    shutdown_token: CancellationToken,
    task: JoinHandle<()>,
}

/// HTTP server module driving the request pipeline.
pub struct WebServerModule {
    settings: WebServerSettings,
    state: Arc<ServerState>,
    router: Mutex<Option<Router>>,
    running: Mutex<Option<Running>>,
}

impl WebServerModule {
    pub const NAME: &'static str = "web-server";

    pub fn new(app: Arc<AppContext>, settings: WebServerSettings) -> Self {
        let state = Arc::new(ServerState {
            pipeline: Pipeline::new(app, "http"),
            body_limit: settings.body_limit,
        });
        Self {
            settings,
            state,
            router: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    fn create(app: Arc<AppContext>, config: &ModuleConfig) -> Result<BoxedModule, BoxError> {
        let settings = config.settings::<WebServerSettings>()?;
        Ok(Arc::new(Self::new(app, settings)))
    }

    fn default_config() -> ModuleConfig {
        let defaults = WebServerSettings::default();
        ModuleConfig::inactive(Priority::new(0, 0, -1000))
            .with_setting("host", json!(defaults.host))
            .with_setting("port", json!(defaults.port))
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }

    fn build_router(&self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(Arc::clone(&self.state))
    }
}

#[async_trait]
impl Module for WebServerModule {
    async fn init(&self) -> Result<(), BoxError> {
        *self.router.lock() = Some(self.build_router());
        debug!(addr = %self.settings.addr(), "web server prepared");
        Ok(())
    }

    async fn start(&self) -> Result<(), BoxError> {
        let router = self
            .router
            .lock()
            .take()
            .ok_or_else(|| webserver_error("web server started before init", &self.settings))?;

        let addr = self.settings.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| webserver_error(format!("can not listen on {addr}: {e}"), &self.settings))?;
        let local_addr = listener.local_addr()?;

        let shutdown_token = CancellationToken::new();
        let shutdown = shutdown_token.clone();
        let task = tokio::spawn(async move {
            let server = axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown.cancelled_owned());

            if let Err(e) = server.await {
                error!(error = %e, "web server error");
            }
        });

        info!(addr = %local_addr, "web server listening");
        *self.running.lock() = Some(Running {
            local_addr,
            shutdown_token,
            task,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), BoxError> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        running.shutdown_token.cancel();
        running.task.await?;
        info!(addr = %running.local_addr, "web server stopped");
        Ok(())
    }

    fn as_server(self: Arc<Self>) -> Option<Arc<dyn ServerModule>> {
        Some(self)
    }
}

#[async_trait]
impl ServerModule for WebServerModule {
    fn transport(&self) -> &str {
        self.state.pipeline.transport()
    }

    async fn handle_request(&self, req: Request) -> Result<Response, AppError> {
        self.state.pipeline.handle(req).await
    }
}

fn webserver_error(message: impl Into<String>, settings: &WebServerSettings) -> BoxError {
    Box::new(
        AppError::new(WEBSERVER_ERROR, message)
            .with_details(json!({ "host": settings.host, "port": settings.port })),
    )
}

/// Fallback handler for every method and path.
async fn dispatch(State(state): State<Arc<ServerState>>, req: HttpRequest<Body>) -> HttpResponse {
    let (parts, body) = req.into_parts();

    let body = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "failed to read request body");
            return codec::encode_error(AppError::new(413u16, "request body is too large"));
        }
    };

    match codec::decode(&parts, &body) {
        Ok(req) => codec::encode(state.pipeline.handle(req).await),
        Err(err) => codec::encode_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use keel_core::Method;
    use keel_framework::{Controller, RouteDef, Router as RouteTable, handler_fn};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_test::{assert_err, assert_ok};
    use tower::ServiceExt;

    fn app() -> Arc<AppContext> {
        let app = Arc::new(AppContext::new("test"));
        let routes = vec![
            RouteDef::from((
                Method::Get,
                "/ping",
                Controller::new(
                    "ping",
                    handler_fn(|_, req, _| Ok(json!({ "pong": req.query, "ip": req.ip }))),
                ),
            )),
            RouteDef::from((
                Method::Post,
                "/echo",
                Controller::new(
                    "echo",
                    handler_fn(|_, req, reply| {
                        reply.set_status(201);
                        Ok(req.body.clone())
                    }),
                ),
            )),
        ];
        let router = RouteTable::build(routes, app.auth(), None).unwrap();
        app.install_router(router).unwrap();
        app
    }

    fn settings(port: u16) -> WebServerSettings {
        WebServerSettings {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        }
    }

    async fn body_json(response: HttpResponse) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn default_config_is_inactive_with_bind_settings() {
        let config = WebServerModule::default_config();
        assert!(!config.active);
        assert_eq!(config.priority, Priority::new(0, 0, -1000));
        assert_eq!(
            config.settings::<WebServerSettings>().unwrap(),
            WebServerSettings::default()
        );
    }

    #[tokio::test]
    async fn fallback_drives_the_pipeline() {
        let module = WebServerModule::new(app(), settings(0));

        let response = module
            .build_router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from(r#"{"title":"a"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({ "title": "a" }));

        let response = module
            .build_router()
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri("/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            body_json(response).await,
            json!({ "code": 405, "message": "Method Not Allowed" })
        );
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let module = WebServerModule::new(
            app(),
            WebServerSettings {
                body_limit: 4,
                ..settings(0)
            },
        );
        let response = module
            .build_router()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("0123456789"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn serves_until_stopped() {
        let module = Arc::new(WebServerModule::new(app(), settings(0)));
        assert_ok!(module.init().await);
        assert_ok!(module.start().await);
        let addr = module.local_addr().unwrap();

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping?x=1 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
        assert!(raw.contains(r#""pong":{"x":"1"}"#), "{raw}");
        assert!(raw.contains(r#""ip":"127.0.0.1""#), "{raw}");

        assert_ok!(module.stop().await);
        assert!(module.local_addr().is_none());
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn bind_failure_is_a_webserver_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let module = WebServerModule::new(app(), settings(port));
        assert_ok!(module.init().await);
        let err = assert_err!(module.start().await);

        let err = AppError::from_boxed(err).unwrap();
        assert!(err.is_code(WEBSERVER_ERROR));
        assert_eq!(err.details, Some(json!({ "host": "127.0.0.1", "port": port })));
    }

    #[tokio::test]
    async fn handles_requests_from_other_transports() {
        let module: Arc<dyn Module> = Arc::new(WebServerModule::new(app(), settings(0)));
        let server = module.as_server().unwrap();
        assert_eq!(server.transport(), "http");

        let response = server
            .handle_request(keel_core::Request::new(Method::Get, "/ping"))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
