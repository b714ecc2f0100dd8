//! Request dispatcher.
//!
//! The dispatcher owns everything compiled at startup (static index, route
//! table, composed middleware chains) and turns each request into exactly
//! one response:
//!
//! ```text
//! Start ─► StaticCandidate ─hit─► Responding
//!                │ miss
//!                ▼
//!          path matcher ─none─► 404 page ─► Responding
//!                │        ─redirect─► 307 ─► Responding
//!                │        ─method absent─► 405 ─► Responding
//!                ▼
//!          RouteMatched ─► Rendering ─► Responding
//!                              │ failure or panic
//!                              ▼
//!                        ErrorHandling (500 / error page)
//! ```
//!
//! The reserved hydration script path is answered before any of this.

use crate::fingerprint::{AssetRewriter, BuildFingerprint, FINGERPRINT_PARAM};
use crate::http::HttpMethod;
use crate::islands::HYDRATION_BOOTSTRAP;
use crate::logging::{debug, error, info, trace, warn};
use crate::middleware::{handler_fn, HandlerFn, MiddlewareTree};
use crate::options::ServerOptions;
use crate::render::{html_escape, PageProps, Render, RenderContext, RenderPipeline};
use crate::route::{Manifest, PageContext, RouteDescriptor};
use crate::routing::{Params, PathMatch, PathMatcher};
use crate::static_assets::{CacheStrategy, StaticAssetServer, StaticIndex};
use crate::error::{install_panic_hook, take_panic_stack};
use crate::{Error, HandlerError, HttpRequest, HttpResponse};
use futures_util::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// States a request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Start,
    StaticCandidate,
    RouteMatched,
    Rendering,
    Responding,
    ErrorHandling,
}

/// A route after startup compilation.
struct CompiledRoute {
    pattern: String,
    allowed: Vec<HttpMethod>,
    /// Middleware chain folded around the method endpoint.
    handler: HandlerFn,
}

/// Top-level request entry point.
pub struct Dispatcher {
    matcher: PathMatcher<CompiledRoute>,
    static_server: StaticAssetServer,
    pipeline: Arc<RenderPipeline>,
    not_found_page: Option<Arc<dyn Render>>,
    error_page: Option<Arc<dyn Render>>,
    hydration_path: String,
    fingerprint: BuildFingerprint,
}

impl Dispatcher {
    /// Index the static root and compile the route table.
    pub async fn build(manifest: Manifest, options: ServerOptions) -> Result<Self, Error> {
        if !options.hydration_script_path.starts_with('/') {
            return Err(Error::InvalidPattern(format!(
                "hydration script path must be absolute: {}",
                options.hydration_script_path
            )));
        }

        install_panic_hook();
        let fingerprint = options.build_id.clone();
        let static_server =
            StaticAssetServer::build(&options.static_assets_config(), fingerprint.clone()).await?;
        let rewriter = AssetRewriter::new(static_server.index().clone(), fingerprint.clone());
        let pipeline = Arc::new(RenderPipeline::new(
            rewriter,
            options.hydration_script_path.clone(),
        ));

        let mut tree = MiddlewareTree::new();
        for (directory, middleware) in &manifest.middleware {
            tree.insert(directory, middleware.clone())?;
        }

        let entries = manifest
            .routes
            .iter()
            .map(|route| {
                let chain = tree.chain_for(&route.directory());
                debug!(
                    route = %route.pattern,
                    middleware = chain.len(),
                    "Composing route handler"
                );
                let compiled = CompiledRoute {
                    pattern: route.pattern.to_string(),
                    allowed: route.allowed_methods(),
                    handler: chain.compose(endpoint(route.clone(), pipeline.clone())),
                };
                (route.pattern.clone(), compiled)
            })
            .collect();
        let matcher = PathMatcher::new(entries)?;

        info!(
            routes = matcher.len(),
            middleware = manifest.middleware.len(),
            build_id = %fingerprint,
            "Route table compiled"
        );
        warn_collisions(static_server.index(), &matcher);

        Ok(Self {
            matcher,
            static_server,
            pipeline,
            not_found_page: manifest.not_found_page,
            error_page: manifest.error_page,
            hydration_path: options.hydration_script_path,
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> &BuildFingerprint {
        &self.fingerprint
    }

    pub fn static_index(&self) -> &Arc<StaticIndex> {
        self.static_server.index()
    }

    pub fn hydration_script_path(&self) -> &str {
        &self.hydration_path
    }

    pub fn route_count(&self) -> usize {
        self.matcher.len()
    }

    /// Handle one request. Never fails: every error becomes a response.
    pub async fn handle(&self, mut req: HttpRequest) -> HttpResponse {
        let path = req.path_only().to_string();
        let mut state = DispatchState::Start;

        if path == self.hydration_path {
            transition(&mut state, DispatchState::Responding, &path);
            return self.hydration_script(&req);
        }

        transition(&mut state, DispatchState::StaticCandidate, &path);
        match self.static_server.serve(&req).await {
            Ok(Some(resp)) => {
                transition(&mut state, DispatchState::Responding, &path);
                return resp;
            }
            Ok(None) => {}
            Err(err) => {
                transition(&mut state, DispatchState::ErrorHandling, &path);
                error!(path = %path, error = %err, "Static asset read failed");
                return self.error_response(&req, None, err).await;
            }
        }

        let (route, params) = match self.matcher.find(&path) {
            PathMatch::Found { route, params } => (route, params),
            PathMatch::Redirect(location) => {
                transition(&mut state, DispatchState::Responding, &path);
                let location = match req.query_string() {
                    Some(query) => format!("{}?{}", location, query),
                    None => location,
                };
                return HttpResponse::temporary_redirect(location);
            }
            PathMatch::NotFound => {
                transition(&mut state, DispatchState::Responding, &path);
                return self.not_found_response(&req).await;
            }
        };

        let allowed = HttpMethod::from_str(&req.method).is_some_and(|m| route.allowed.contains(&m));
        if !allowed {
            transition(&mut state, DispatchState::Responding, &path);
            debug!(method = %req.method, route = %route.pattern, "Method not allowed");
            return method_not_allowed(&route.allowed);
        }

        transition(&mut state, DispatchState::RouteMatched, &path);
        req.path_params = params.clone().into_iter().collect();
        let err_req = req.clone();

        transition(&mut state, DispatchState::Rendering, &path);
        match guarded((route.handler)(req)).await {
            Ok(resp) => {
                transition(&mut state, DispatchState::Responding, &path);
                resp
            }
            Err(err) => {
                transition(&mut state, DispatchState::ErrorHandling, &path);
                self.error_response(&err_req, Some((route, &params)), err).await
            }
        }
    }

    fn hydration_script(&self, req: &HttpRequest) -> HttpResponse {
        let head = match HttpMethod::from_str(&req.method) {
            Some(HttpMethod::GET) => false,
            Some(HttpMethod::HEAD) => true,
            _ => return method_not_allowed(&[HttpMethod::GET, HttpMethod::HEAD]),
        };

        let mut resp = HttpResponse::ok()
            .with_header("content-type", "application/javascript; charset=utf-8");
        if req
            .query(FINGERPRINT_PARAM)
            .is_some_and(|value| value == self.fingerprint.as_str())
        {
            if let Some(cache_control) = CacheStrategy::Immutable.to_header_value() {
                resp.set_header("cache-control", cache_control);
            }
        }
        if !head {
            resp.body = HYDRATION_BOOTSTRAP.as_bytes().to_vec();
        }
        resp
    }

    async fn not_found_response(&self, req: &HttpRequest) -> HttpResponse {
        let path = req.path_only();
        debug!(path = %path, "No route matched");

        if let Some(page) = &self.not_found_page {
            let ctx = RenderContext {
                props: page_props(req, "", Params::new(), Value::Null),
                state: req.state.clone(),
                error: None,
            };
            match guarded(self.pipeline.render_page(page, &ctx, 404)).await {
                Ok(resp) => return resp,
                Err(err) => error!(path = %path, error = %err, "Not found page failed to render"),
            }
        }

        HttpResponse::html(default_not_found_page(path)).with_status(404)
    }

    /// Map a failure to a response: 404/405 keep their meaning, everything
    /// else renders the error page.
    async fn error_response(
        &self,
        req: &HttpRequest,
        route: Option<(&CompiledRoute, &Params)>,
        err: Error,
    ) -> HttpResponse {
        match err.status_code() {
            404 => return self.not_found_response(req).await,
            405 => {
                let allowed = route.map(|(r, _)| r.allowed.as_slice()).unwrap_or_default();
                return method_not_allowed(allowed);
            }
            _ => {}
        }

        let diagnostic = err.diagnostic();
        error!(
            path = %req.path_only(),
            method = %req.method,
            error = %diagnostic.message,
            "Request handling failed"
        );

        if let Some(page) = &self.error_page {
            let (pattern, params) = route
                .map(|(r, p)| (r.pattern.as_str(), p.clone()))
                .unwrap_or(("", Params::new()));
            let data = json!({ "message": diagnostic.message, "stack": diagnostic.stack });
            let ctx = RenderContext {
                props: page_props(req, pattern, params, data),
                state: req.state.clone(),
                error: Some(diagnostic.clone()),
            };
            match guarded(self.pipeline.render_page(page, &ctx, 500)).await {
                Ok(resp) => return resp,
                Err(page_err) => {
                    error!(error = %page_err, "Error page failed to render, using default")
                }
            }
        }

        HttpResponse::html(default_error_page(&diagnostic)).with_status(500)
    }
}

/// Method endpoint for one route, run inside its middleware chain.
fn endpoint(route: RouteDescriptor, pipeline: Arc<RenderPipeline>) -> HandlerFn {
    let route = Arc::new(route);
    handler_fn(move |req: HttpRequest| {
        let route = route.clone();
        let pipeline = pipeline.clone();
        async move {
            let handler = HttpMethod::from_str(&req.method)
                .and_then(|method| route.handler_for(method))
                .ok_or_else(|| {
                    Error::MethodNotAllowed(format!("{} {}", req.method, route.pattern))
                })?;
            let ctx = PageContext::new(&req, &route, pipeline);
            handler(req, ctx).await
        }
    })
}

fn transition(state: &mut DispatchState, next: DispatchState, path: &str) {
    trace!(from = ?*state, to = ?next, path = %path, "Dispatch transition");
    *state = next;
}

/// Run user code, turning a panic into a handler error that carries the
/// panic location.
async fn guarded<F>(fut: F) -> Result<HttpResponse, Error>
where
    F: Future<Output = Result<HttpResponse, Error>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let mut err = HandlerError::new(panic_message(payload.as_ref()));
            err.stack = take_panic_stack();
            Err(Error::Handler(err))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

fn page_props(req: &HttpRequest, route: &str, params: Params, data: Value) -> PageProps {
    PageProps {
        url: req.path.clone(),
        route: route.to_string(),
        params,
        data,
    }
}

fn method_not_allowed(allowed: &[HttpMethod]) -> HttpResponse {
    let allow = allowed
        .iter()
        .map(HttpMethod::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    HttpResponse::method_not_allowed().with_header("allow", allow)
}

fn default_not_found_page(path: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><title>404 not found</title></head>\
         <body><h1>404 not found: {}</h1></body></html>",
        html_escape(path)
    )
}

fn default_error_page(diagnostic: &HandlerError) -> String {
    let mut details = html_escape(&diagnostic.message);
    if let Some(stack) = &diagnostic.stack {
        details.push('\n');
        details.push_str(&html_escape(stack));
    }
    format!(
        "<!DOCTYPE html><html><head><title>500 internal error</title></head>\
         <body><h1>500 internal error</h1>\
         <p>An error occurred during route handling or page rendering.</p>\
         <pre>{}</pre></body></html>",
        details
    )
}

/// Static files shadow routes matching the same path; make that visible.
fn warn_collisions(index: &StaticIndex, matcher: &PathMatcher<CompiledRoute>) {
    for path in index.paths() {
        if let PathMatch::Found { route, .. } = matcher.find(path) {
            warn!(
                path = %path,
                route = %route.pattern,
                "Static file shadows route"
            );
        }
    }
}
