//! Route descriptors and the manifest consumed by the dispatcher.
//!
//! The manifest is the already-discovered route tree: one
//! [`RouteDescriptor`] per route file, middleware keyed by directory, and
//! the optional not-found and error pages.

use crate::http::{ConnectionInfo, HttpMethod, RequestState};
use crate::middleware::{BoxFuture, Middleware};
use crate::render::{PageProps, Render, RenderContext, RenderPipeline};
use crate::routing::{Params, RoutePattern};
use crate::{Error, HttpRequest, HttpResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// Page handler: receives the request and a [`PageContext`].
pub type PageHandlerFn =
    Arc<dyn Fn(HttpRequest, PageContext) -> BoxFuture<Result<HttpResponse, Error>> + Send + Sync>;

/// Box an async closure as a [`PageHandlerFn`].
pub fn handler<F, Fut>(f: F) -> PageHandlerFn
where
    F: Fn(HttpRequest, PageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req, ctx| -> BoxFuture<Result<HttpResponse, Error>> { Box::pin(f(req, ctx)) })
}

/// Handler context: route data plus the render instruction.
#[derive(Clone)]
pub struct PageContext {
    pub params: Params,
    pub state: RequestState,
    pub conn: ConnectionInfo,
    pub url: String,
    pub route: String,
    page: Option<Arc<dyn Render>>,
    pipeline: Arc<RenderPipeline>,
}

impl PageContext {
    pub(crate) fn new(
        req: &HttpRequest,
        route: &RouteDescriptor,
        pipeline: Arc<RenderPipeline>,
    ) -> Self {
        Self {
            params: req
                .path_params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            state: req.state.clone(),
            conn: req.conn,
            url: req.path.clone(),
            route: route.pattern.to_string(),
            page: route.page.clone(),
            pipeline,
        }
    }

    /// Render the route's page with `data`.
    pub async fn render<T: Serialize>(&self, data: T) -> Result<HttpResponse, Error> {
        self.render_with_status(data, 200).await
    }

    pub async fn render_with_status<T: Serialize>(
        &self,
        data: T,
        status: u16,
    ) -> Result<HttpResponse, Error> {
        let page = self.page.as_ref().ok_or_else(|| {
            Error::Internal(format!("route {} has no page to render", self.route))
        })?;

        let ctx = RenderContext {
            props: PageProps {
                url: self.url.clone(),
                route: self.route.clone(),
                params: self.params.clone(),
                data: serde_json::to_value(data)?,
            },
            state: self.state.clone(),
            error: None,
        };
        self.pipeline.render_page(page, &ctx, status).await
    }
}

/// One route: pattern, method handlers and optional page component.
#[derive(Clone)]
pub struct RouteDescriptor {
    pub pattern: RoutePattern,
    pub handlers: BTreeMap<HttpMethod, PageHandlerFn>,
    pub page: Option<Arc<dyn Render>>,
    /// Whether the route is its directory's index (`about/index`).
    pub is_index: bool,
}

impl RouteDescriptor {
    pub fn new(pattern: RoutePattern) -> Self {
        Self {
            pattern,
            handlers: BTreeMap::new(),
            page: None,
            is_index: false,
        }
    }

    /// Descriptor for a pattern such as `/books/:id`.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        Ok(Self::new(RoutePattern::parse(pattern)?))
    }

    /// Descriptor for a route file such as `props/[id].tsx`.
    ///
    /// Returns `Ok(None)` for files that are not routes (`_middleware`, `_500`).
    pub fn from_file(path: &str) -> Result<Option<Self>, Error> {
        Ok(RoutePattern::from_file_path(path)?.map(|file| Self {
            is_index: file.is_index,
            ..Self::new(file.pattern)
        }))
    }

    pub fn method(mut self, method: HttpMethod, handler: PageHandlerFn) -> Self {
        self.handlers.insert(method, handler);
        self
    }

    pub fn get(self, handler: PageHandlerFn) -> Self {
        self.method(HttpMethod::GET, handler)
    }

    pub fn post(self, handler: PageHandlerFn) -> Self {
        self.method(HttpMethod::POST, handler)
    }

    pub fn page(mut self, page: impl Render + 'static) -> Self {
        self.page = Some(Arc::new(page));
        self
    }

    pub fn index(mut self, is_index: bool) -> Self {
        self.is_index = is_index;
        self
    }

    /// Handler for `method`; a page without a GET handler renders `null` data.
    pub(crate) fn handler_for(&self, method: HttpMethod) -> Option<PageHandlerFn> {
        if let Some(handler) = self.handlers.get(&method) {
            return Some(handler.clone());
        }
        (method == HttpMethod::GET && self.page.is_some())
            .then(|| handler(|_req, ctx: PageContext| async move { ctx.render(()).await }))
    }

    /// Methods answered by this route, in `Allow` header order.
    pub fn allowed_methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<HttpMethod> = self.handlers.keys().copied().collect();
        if self.page.is_some() && !methods.contains(&HttpMethod::GET) {
            methods.push(HttpMethod::GET);
            methods.sort();
        }
        methods
    }

    pub fn directory(&self) -> Vec<String> {
        self.pattern.directory(self.is_index)
    }
}

/// The discovered route tree.
#[derive(Clone, Default)]
pub struct Manifest {
    pub routes: Vec<RouteDescriptor>,
    /// `(directory, middleware)`; the empty directory is the root.
    pub middleware: Vec<(String, Arc<dyn Middleware>)>,
    pub not_found_page: Option<Arc<dyn Render>>,
    pub error_page: Option<Arc<dyn Render>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(route);
        self
    }

    pub fn middleware(mut self, directory: impl Into<String>, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push((directory.into(), Arc::new(middleware)));
        self
    }

    pub fn not_found_page(mut self, page: impl Render + 'static) -> Self {
        self.not_found_page = Some(Arc::new(page));
        self
    }

    /// Error boundary page; receives the failure in [`RenderContext::error`].
    pub fn error_page(mut self, page: impl Render + 'static) -> Self {
        self.error_page = Some(Arc::new(page));
        self
    }
}
