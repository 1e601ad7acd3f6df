// Application bootstrapper and HTTP server

use crate::logging::{debug, error, info};
use crate::{Component, Error, HttpRequest, HttpResponse, MountRegistry, Mounted, Router};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming as IncomingBody, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;

/// Header consulted for verb tunnelling on POST requests.
pub const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// Server and mounting options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppOptions {
    /// API version; everything is mounted under `{prefix}/v{version}`.
    pub version: u32,
    pub prefix: String,
    pub host: String,
    pub port: u16,
    /// Maximum request body size in bytes.
    pub body_limit: usize,
    /// Honor `X-HTTP-Method-Override` on POST requests.
    pub method_override: bool,
}

impl AppOptions {
    /// `{prefix}/v{version}`, where a `/` prefix contributes nothing.
    pub fn mount_path(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("/v{}", self.version)
        } else {
            format!("/{}/v{}", prefix, self.version)
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Internal(format!("invalid listen address: {}", e)))
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            version: 1,
            prefix: "/".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: 10 * 1024 * 1024,
            method_override: true,
        }
    }
}

type MountFn = Box<dyn FnOnce(&MountRegistry) -> Result<Mounted, Error> + Send>;

struct Registration {
    name: &'static str,
    mount: MountFn,
}

/// What to mount and how: options plus ordered component lists.
#[derive(Default)]
pub struct AppConfig {
    pub options: AppOptions,
    middlewares: Vec<Registration>,
    controllers: Vec<Registration>,
    exceptions: Vec<Registration>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: AppOptions) -> Self {
        self.options = options;
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.options.version = version;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.prefix = prefix.into();
        self
    }

    pub fn middleware<T: Component>(mut self, instance: T) -> Self {
        let instance = Arc::new(instance);
        self.middlewares.push(Registration {
            name: std::any::type_name::<T>(),
            mount: Box::new(move |registry| registry.mount_middleware(instance)),
        });
        self
    }

    pub fn controller<T: Component>(mut self, instance: T) -> Self {
        let instance = Arc::new(instance);
        self.controllers.push(Registration {
            name: std::any::type_name::<T>(),
            mount: Box::new(move |registry| registry.mount_controller(instance)),
        });
        self
    }

    pub fn exception<T: Component>(mut self, instance: T) -> Self {
        let instance = Arc::new(instance);
        self.exceptions.push(Registration {
            name: std::any::type_name::<T>(),
            mount: Box::new(move |registry| registry.mount_exception(instance)),
        });
        self
    }
}

/// A mounted application.
pub struct Application {
    options: AppOptions,
    registry: Arc<MountRegistry>,
    router: Arc<Router>,
}

impl Application {
    /// Mount everything in `config` with a fresh registry.
    pub fn bootstrap(config: AppConfig) -> Result<Self, Error> {
        Self::bootstrap_with(config, Arc::new(MountRegistry::new()))
    }

    /// Mount middlewares, then controllers, then exceptions, using `registry`.
    ///
    /// Any mount failure aborts the bootstrap.
    pub fn bootstrap_with(config: AppConfig, registry: Arc<MountRegistry>) -> Result<Self, Error> {
        let AppConfig {
            options,
            middlewares,
            controllers,
            exceptions,
        } = config;

        let app_router = Arc::new(Router::new());
        for (kind, group) in [
            ("middleware", middlewares),
            ("controller", controllers),
            ("exception", exceptions),
        ] {
            for Registration { name, mount } in group {
                let mounted = mount(&registry).inspect_err(|e| {
                    error!(kind, component = name, error = %e, "Failed to mount");
                })?;
                debug!(kind, component = name, path = mounted.path(), "Attached");
                mounted.attach(&app_router);
            }
        }

        let mount_path = options.mount_path();
        let router = Arc::new(Router::new());
        router.mount(&mount_path, app_router);
        info!(path = %mount_path, "Application bootstrap complete");

        Ok(Self {
            options,
            registry,
            router,
        })
    }

    pub fn options(&self) -> &AppOptions {
        &self.options
    }

    pub fn registry(&self) -> &Arc<MountRegistry> {
        &self.registry
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Run one request through the mounted application.
    ///
    /// ```
    /// use truss_core::{AppConfig, Application, ClassMetadata, Component, HttpRequest};
    /// use serde_json::json;
    ///
    /// struct Health;
    ///
    /// impl Component for Health {
    ///     fn metadata() -> ClassMetadata<Self> {
    ///         ClassMetadata::builder()
    ///             .path("/health")
    ///             .get("check", "/", |_this, _args| json!({ "status": "ok" }))
    ///             .build()
    ///     }
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// let app = Application::bootstrap(AppConfig::new().controller(Health)).unwrap();
    /// let response = app.handle(HttpRequest::new("GET", "/v1/health")).await;
    /// assert_eq!(response.status, 200);
    /// assert_eq!(response.json_body().unwrap(), json!({ "status": "ok" }));
    /// # });
    /// ```
    pub async fn handle(&self, request: HttpRequest) -> HttpResponse {
        self.router.handle(request).await
    }

    /// Serve HTTP/1.1 on the configured host and port until an accept fails.
    pub async fn listen(self) -> Result<(), Error> {
        let addr = self.options.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        info!(address = %addr, "Server listening");

        let router = self.router.clone();
        let options = Arc::new(self.options);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let router = router.clone();
            let options = options.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<IncomingBody>| {
                    let router = router.clone();
                    let options = options.clone();
                    async move { Ok::<_, Infallible>(handle_request(req, &router, &options).await) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer, error = %err, "Error serving connection");
                }
            });
        }
    }
}

async fn handle_request(
    req: Request<IncomingBody>,
    router: &Router,
    options: &AppOptions,
) -> Response<Full<Bytes>> {
    let started = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let response = match convert_request(req, options).await {
        Ok(request) => router.handle(request).await,
        Err(err) => error_response(&err),
    };

    info!(
        method = %method,
        path = %path,
        status = response.status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );

    to_hyper(response)
}

async fn convert_request(
    req: Request<IncomingBody>,
    options: &AppOptions,
) -> Result<HttpRequest, Error> {
    let (parts, body) = req.into_parts();

    let target = match parts.uri.query() {
        Some(query) => format!("{}?{}", parts.uri.path(), query),
        None => parts.uri.path().to_string(),
    };

    let mut headers = HashMap::new();
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }

    let method = effective_method(parts.method.as_str(), &headers, options.method_override);

    let body = Limited::new(body, options.body_limit)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                Error::PayloadTooLarge(format!("body exceeds {} bytes", options.body_limit))
            } else {
                Error::BadRequest(format!("failed to read body: {}", e))
            }
        })?
        .to_bytes();

    let mut request = HttpRequest::new(method, target);
    request.headers = headers;
    request.body = body.to_vec();
    Ok(request)
}

/// The verb to route by: the override header on POST when enabled.
pub fn effective_method(method: &str, headers: &HashMap<String, String>, enabled: bool) -> String {
    if enabled && method.eq_ignore_ascii_case("POST") {
        if let Some(verb) = headers.get(METHOD_OVERRIDE_HEADER) {
            let verb = verb.trim();
            if !verb.is_empty() {
                return verb.to_ascii_uppercase();
            }
        }
    }
    method.to_string()
}

fn error_response(err: &Error) -> HttpResponse {
    let status = err.status_code();
    let body = serde_json::json!({
        "error": err.to_string(),
        "status": status,
    });
    HttpResponse::new(status)
        .with_json(&body)
        .unwrap_or_else(|_| HttpResponse::internal_server_error())
}

fn to_hyper(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|e| {
            error!(error = %e, "Invalid response");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
