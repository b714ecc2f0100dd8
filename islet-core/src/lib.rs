// Core library for the Islet web framework
// Route table, layered middleware, static assets and island hydration

pub mod conditional;
pub mod dispatcher;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod islands;
pub mod logging;
pub mod middleware;
pub mod options;
pub mod render;
pub mod route;
pub mod routing;
pub mod server;
pub mod static_assets;
pub mod status;

// Re-export commonly used types
pub use conditional::{ConditionalRequest, ETag};
pub use dispatcher::{DispatchState, Dispatcher};
pub use error::*;
pub use fingerprint::{AssetRewriter, BuildFingerprint};
pub use http::*;
pub use islands::{HydrationEntry, IslandRecorder};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use middleware::{Middleware, MiddlewareChain, Next, handler_fn, middleware_fn};
pub use options::ServerOptions;
pub use render::{PageProps, Render, RenderContext, Rendered, render_fn};
pub use route::{Manifest, PageContext, RouteDescriptor, handler};
pub use routing::{PathMatch, PathMatcher, RoutePattern};
pub use server::Server;
pub use static_assets::{StaticAssetEntry, StaticAssetServer, StaticIndex};
pub use status::*;
