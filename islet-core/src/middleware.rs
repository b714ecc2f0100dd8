//! Layered middleware.
//!
//! Middleware is attached to directories of the route tree. At startup the
//! [`MiddlewareTree`] flattens, for every route, the layers on the path from
//! the root directory down to the route's directory into one
//! [`MiddlewareChain`], which is then composed with the route endpoint into a
//! single handler.
//!
//! Execution follows the onion model: the root layer runs first on the way
//! in and last on the way out, so its response edits win over inner layers.

use crate::logging::trace;
use crate::routing::directory_segments;
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers and continuations
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Continuation: runs every inner layer and the endpoint
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture<Result<HttpResponse, Error>> + Send>;

/// Type alias for composed handler functions
pub type HandlerFn = Arc<dyn Fn(HttpRequest) -> BoxFuture<Result<HttpResponse, Error>> + Send + Sync>;

/// Middleware trait for processing requests around the page handler.
///
/// Per-request state shared with the other layers lives in `req.state`.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Middleware backed by a closure
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap an async closure as middleware.
///
/// ```
/// use islet_core::middleware::middleware_fn;
///
/// let mw = middleware_fn(|req, next| async move {
///     req.state.insert("root", "root_mw")?;
///     let mut resp = next(req).await?;
///     resp.set_header("server", "islet");
///     Ok(resp)
/// });
/// # let _ = mw;
/// ```
pub fn middleware_fn<F, Fut>(f: F) -> FnMiddleware<F>
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    FnMiddleware { f }
}

/// Box an async closure as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(move |req| -> BoxFuture<Result<HttpResponse, Error>> { Box::pin(f(req)) })
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        (self.f)(req, next).await
    }
}

/// Several middleware registered for one directory, run in order as one layer.
pub struct MultiMiddleware {
    middleware: Arc<[Arc<dyn Middleware>]>,
}

impl MultiMiddleware {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middleware: middleware.into(),
        }
    }
}

#[async_trait]
impl Middleware for MultiMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        execute_from(self.middleware.clone(), 0, req, next).await
    }
}

fn execute_from(
    middleware: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    req: HttpRequest,
    terminal: Next,
) -> BoxFuture<Result<HttpResponse, Error>> {
    if index >= middleware.len() {
        trace!("Middleware chain complete, calling endpoint");
        return terminal(req);
    }

    let current = middleware[index].clone();
    trace!(middleware_index = index, "Executing middleware");
    Box::pin(async move {
        current
            .handle(
                req,
                Box::new(move |req| execute_from(middleware, index + 1, req, terminal)),
            )
            .await
    })
}

/// Ordered middleware, outermost first
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Arc<[Arc<dyn Middleware>]>,
}

impl MiddlewareChain {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middleware: middleware.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Fold the chain around `endpoint` once, yielding a single handler.
    pub fn compose(self, endpoint: HandlerFn) -> HandlerFn {
        if self.middleware.is_empty() {
            return endpoint;
        }
        let middleware = self.middleware;
        Arc::new(move |req| {
            let endpoint = endpoint.clone();
            execute_from(
                middleware.clone(),
                0,
                req,
                Box::new(move |req| endpoint(req)),
            )
        })
    }
}

/// A directory node of the route tree.
pub struct MiddlewareLayer {
    pub directory: Vec<String>,
    pub middleware: Option<Arc<dyn Middleware>>,
    /// Nearest ancestor layer, `None` for the root.
    pub parent: Option<usize>,
}

/// Directory-scoped middleware, built once at startup.
///
/// Layer `0` is always the root directory.
pub struct MiddlewareTree {
    layers: Vec<MiddlewareLayer>,
}

impl MiddlewareTree {
    pub fn new() -> Self {
        Self {
            layers: vec![MiddlewareLayer {
                directory: Vec::new(),
                middleware: None,
                parent: None,
            }],
        }
    }

    /// Attach middleware to a directory such as `layeredMdw/layer2` (empty for the root).
    ///
    /// A directory holds at most one middleware; wrap several in a
    /// [`MultiMiddleware`] to run them as one layer.
    pub fn insert(&mut self, directory: &str, middleware: Arc<dyn Middleware>) -> Result<(), Error> {
        let directory = directory_segments(directory);
        let index = self.ensure_layer(&directory);
        let layer = &mut self.layers[index];
        if layer.middleware.is_some() {
            return Err(Error::InvalidPattern(format!(
                "middleware already defined for /{}",
                directory.join("/")
            )));
        }
        layer.middleware = Some(middleware);
        Ok(())
    }

    fn ensure_layer(&mut self, directory: &[String]) -> usize {
        if let Some(index) = self.layers.iter().position(|l| l.directory == directory) {
            return index;
        }

        let parent = self.deepest_ancestor(directory);
        let index = self.layers.len();
        self.layers.push(MiddlewareLayer {
            directory: directory.to_vec(),
            middleware: None,
            parent: Some(parent),
        });

        // Existing descendants now hang below the new layer.
        for i in 0..index {
            let layer = &self.layers[i];
            if layer.directory.len() > directory.len()
                && layer.directory.starts_with(directory)
                && layer
                    .parent
                    .is_some_and(|p| self.layers[p].directory.len() < directory.len())
            {
                self.layers[i].parent = Some(index);
            }
        }

        index
    }

    /// Deepest layer whose directory is a prefix of (or equal to) `directory`.
    fn deepest_ancestor(&self, directory: &[String]) -> usize {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| directory.starts_with(&l.directory))
            .max_by_key(|(_, l)| l.directory.len())
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    pub fn layers(&self) -> &[MiddlewareLayer] {
        &self.layers
    }

    /// Middleware applying to a route in `directory`, root first.
    pub fn chain_for(&self, directory: &[String]) -> MiddlewareChain {
        let mut chain = Vec::new();
        let mut current = Some(self.deepest_ancestor(directory));

        while let Some(index) = current {
            let layer = &self.layers[index];
            if let Some(mw) = &layer.middleware {
                chain.push(mw.clone());
            }
            current = layer.parent;
        }

        chain.reverse();
        MiddlewareChain::new(chain)
    }
}

impl Default for MiddlewareTree {
    fn default() -> Self {
        Self::new()
    }
}
