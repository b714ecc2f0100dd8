// Islet - a file-layout web framework core
//
// Routes, layered middleware, fingerprinted static assets and island
// hydration over a single dispatcher.

// Re-export core functionality
pub use islet_core::*;

pub use async_trait::async_trait;
pub use serde;
pub use serde_json;
pub use tokio;

// Re-export optional crates
#[cfg(feature = "config")]
pub use islet_config;

#[cfg(feature = "testing")]
pub use islet_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        async_trait,
        handler,
        middleware_fn,
        render_fn,
        Dispatcher,
        Error,
        HandlerError,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        IslandRecorder,
        Manifest,
        Middleware,
        Next,
        PageContext,
        Render,
        RenderContext,
        Rendered,
        RouteDescriptor,
        Server,
        ServerOptions,
    };
}
