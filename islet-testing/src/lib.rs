//! Testing utilities for Islet applications.
//!
//! ```no_run
//! use islet_core::{Dispatcher, Manifest, RouteDescriptor, ServerOptions, render_fn, Rendered};
//! use islet_testing::*;
//!
//! # tokio_test::block_on(async {
//! let assets = StaticDir::new().unwrap().file("/foo.txt", "bar").unwrap();
//! let manifest = Manifest::new().route(
//!     RouteDescriptor::parse("/hello")
//!         .unwrap()
//!         .page(render_fn(|_ctx| Ok(Rendered::html("<body>Hello!</body>")))),
//! );
//! let options = ServerOptions::new().with_static_dir(assets.path());
//! let client = TestClient::new(Dispatcher::build(manifest, options).await.unwrap());
//!
//! let response = client.get("/hello").await;
//! assert_status(&response, 200);
//! assert_body_contains(&response, "Hello!");
//! assert_eq!(client.get("/foo.txt").await.body_string(), "bar");
//! # });
//! ```

pub mod assertions;
pub mod fixture;
pub mod test_client;

pub use assertions::*;
pub use fixture::StaticDir;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};
