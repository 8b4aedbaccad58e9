//! HTTP surface of the dev server.
//!
//! [`DevRouter`] is a shared, growable route table. The dev server mounts
//! its own routes, builders add theirs while they start, and requests are
//! dispatched against the routes present at request time.

mod address;
mod browser;
mod routes;
mod statics;

pub use address::{ServerAddresses, local_ip, server_addresses};
pub use browser::open_in_browser;
pub use routes::{mount_index_routes, mount_project_route, to_stories_v3};
pub use statics::{StaticDirError, StaticMount, mount_static_dirs, parse_static_dir};

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::Response;
use axum::routing::MethodRouter;
use parking_lot::RwLock;
use tower::ServiceExt;
use tower_http::CompressionLevel;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

/// Headers cross-origin callers may send.
pub const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

/// Route table shared between the dev server and its builders.
#[derive(Clone)]
pub struct DevRouter {
    routes: Arc<RwLock<Router>>,
    static_roots: Arc<RwLock<Vec<PathBuf>>>,
}

impl Default for DevRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DevRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevRouter")
            .field("static_roots", &*self.static_roots.read())
            .finish_non_exhaustive()
    }
}

impl DevRouter {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(RwLock::new(Router::new())),
            static_roots: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn update(&self, f: impl FnOnce(Router) -> Router) {
        let mut routes = self.routes.write();
        let current = std::mem::replace(&mut *routes, Router::new());
        *routes = f(current);
    }

    /// Add a route. Panics on overlap, like [`Router::route`].
    pub fn route(&self, path: &str, method_router: MethodRouter) {
        self.update(|router| router.route(path, method_router));
    }

    pub fn merge(&self, other: Router) {
        self.update(|router| router.merge(other));
    }

    /// Serve `service` below `path`.
    pub fn nest_service<T>(&self, path: &str, service: T)
    where
        T: tower::Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: axum::response::IntoResponse,
        T::Future: Send + 'static,
    {
        self.update(|router| router.nest_service(path, service));
    }

    /// Serve files from `dir` at the site root, after every route.
    ///
    /// Roots are tried in the order they were added.
    pub fn serve_root(&self, dir: PathBuf) {
        self.static_roots.write().push(dir);
    }

    /// Routes as they are right now.
    pub fn snapshot(&self) -> Router {
        self.routes.read().clone()
    }

    /// The application to hand to `axum::serve`.
    ///
    /// Every response carries permissive CORS headers and is gzip
    /// compressed when the client accepts it.
    pub fn into_app(self) -> Router {
        Router::new()
            .fallback(dispatch)
            .with_state(self)
            .layer(CompressionLayer::new().quality(CompressionLevel::Fastest))
            .layer(SetResponseHeaderLayer::overriding(
                ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            ))
    }
}

async fn dispatch(State(dev): State<DevRouter>, request: Request) -> Response {
    let router = dev.snapshot();
    let roots = dev.static_roots.read().clone();

    let is_read = matches!(*request.method(), Method::GET | Method::HEAD);
    if roots.is_empty() || !is_read {
        return router
            .oneshot(request)
            .await
            .unwrap_or_else(|never| match never {});
    }

    let (method, uri, headers) = (
        request.method().clone(),
        request.uri().clone(),
        request.headers().clone(),
    );
    let response = router
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    if response.status() != StatusCode::NOT_FOUND {
        return response;
    }

    for root in roots {
        let mut static_request = Request::new(Body::empty());
        *static_request.method_mut() = method.clone();
        *static_request.uri_mut() = uri.clone();
        *static_request.headers_mut() = headers.clone();

        let found = ServeDir::new(&root)
            .oneshot(static_request)
            .await
            .unwrap_or_else(|never| match never {});
        if found.status() != StatusCode::NOT_FOUND {
            return found.map(Body::new);
        }
    }

    response
}
