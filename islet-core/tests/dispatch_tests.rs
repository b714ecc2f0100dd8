use islet_core::{
    handler, render_fn, Dispatcher, Error, HandlerError, HttpRequest, HttpResponse, Manifest,
    RouteDescriptor, Rendered, ServerOptions,
};
use std::sync::Arc;
use tempfile::TempDir;

fn params_page(pattern: &str) -> RouteDescriptor {
    RouteDescriptor::parse(pattern)
        .unwrap()
        .page(render_fn(|ctx| {
            Ok(Rendered::html(format!(
                "<html><body><pre>{}</pre></body></html>",
                serde_json::to_string(&ctx.props.params)?
            )))
        }))
}

fn manifest() -> Manifest {
    let books = RouteDescriptor::parse("/books/:id")
        .unwrap()
        .get(handler(|req, _ctx| async move {
            let id = req.param("id").cloned().unwrap_or_default();
            if !id.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::RouteNotFound(req.path.clone()));
            }
            Ok(HttpResponse::text(format!("book {}", id)))
        }));

    let book_index = RouteDescriptor::parse("/books")
        .unwrap()
        .post(handler(|_req, _ctx| async { Ok(HttpResponse::new(201)) }));

    let failure = RouteDescriptor::parse("/failure")
        .unwrap()
        .get(handler(|_req, _ctx| async {
            Err(Error::Handler(HandlerError::new("Error: boom!").with_stack(
                "Error: boom!\n    at render (file:///routes/failure.tsx:3:9)",
            )))
        }));

    let data_page = RouteDescriptor::parse("/greet/:name")
        .unwrap()
        .get(handler(|req, ctx| async move {
            let name = req.param("name").cloned().unwrap_or_default();
            ctx.render(serde_json::json!({ "greeting": format!("hello {}", name) }))
                .await
        }))
        .page(render_fn(|ctx| {
            Ok(Rendered::html(format!(
                "<p>{}</p>",
                ctx.props.data["greeting"].as_str().unwrap_or_default()
            )))
        }));

    Manifest::new()
        .route(params_page("/props/:id"))
        .route(params_page("/foo/:path*"))
        .route(params_page("/pages/fresh"))
        .route(books)
        .route(book_index)
        .route(failure)
        .route(data_page)
}

async fn dispatcher(manifest: Manifest) -> (TempDir, Dispatcher) {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("foo.txt"), "bar\n").unwrap();
    let options = ServerOptions::new()
        .with_static_dir(dir.path())
        .with_build_id("build-test");
    let dispatcher = Dispatcher::build(manifest, options).await.unwrap();
    (dir, dispatcher)
}

#[tokio::test]
async fn test_param_route_renders_params() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/props/123")).await;

    assert_eq!(resp.status, 200);
    assert!(resp.body_string().contains(r#"{"id":"123"}"#));
}

#[tokio::test]
async fn test_wildcard_captures_rest() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/foo/bar/baz")).await;

    assert_eq!(resp.status, 200);
    assert!(resp.body_string().contains("bar/baz"));
}

#[tokio::test]
async fn test_trailing_slash_redirects() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/pages/fresh/")).await;

    assert_eq!(resp.status, 307);
    assert_eq!(resp.header("location"), Some("/pages/fresh"));
    assert!(resp.body.is_empty());
}

#[tokio::test]
async fn test_handler_failure_renders_diagnostic() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/failure")).await;

    assert_eq!(resp.status, 500);
    let body = resp.body_string();
    assert!(body.contains("Error: boom!"));
    assert!(body.contains("at render"));
    assert!(body.contains("An error occurred during route handling or page rendering."));
}

#[tokio::test]
async fn test_unmatched_path_is_404_naming_path() {
    let (_dir, d) = dispatcher(manifest()).await;
    for path in ["/nope", "/props", "/props/1/2", "/pages/fresh/more"] {
        let resp = d.handle(HttpRequest::new("GET", path)).await;
        assert_eq!(resp.status, 404, "{}", path);
        assert!(resp.body_string().contains(path));
    }
}

#[tokio::test]
async fn test_method_absent_is_405_regardless_of_siblings() {
    let (_dir, d) = dispatcher(manifest()).await;

    // `/books` accepts POST, `/books/:id` does not.
    let resp = d.handle(HttpRequest::new("POST", "/books/1")).await;
    assert_eq!(resp.status, 405);
    assert_eq!(resp.header("allow"), Some("GET"));

    let resp = d.handle(HttpRequest::new("POST", "/books")).await;
    assert_eq!(resp.status, 201);

    let resp = d.handle(HttpRequest::new("NOTAMETHOD", "/props/1")).await;
    assert_eq!(resp.status, 405);
}

#[tokio::test]
async fn test_handler_not_found_is_404() {
    let (_dir, d) = dispatcher(manifest()).await;

    let resp = d.handle(HttpRequest::new("GET", "/books/123")).await;
    assert_eq!(resp.body_string(), "book 123");

    let resp = d.handle(HttpRequest::new("GET", "/books/abc")).await;
    assert_eq!(resp.status, 404);
    assert!(resp.body_string().contains("/books/abc"));
}

#[tokio::test]
async fn test_handler_renders_page_with_data() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/greet/islet")).await;

    assert_eq!(resp.status, 200);
    assert!(resp.body_string().starts_with("<p>hello islet</p>"));
}

#[tokio::test]
async fn test_custom_not_found_page() {
    let manifest = manifest().not_found_page(render_fn(|ctx| {
        Ok(Rendered::html(format!(
            "<h1>Lost at {}</h1>",
            islet_core::render::html_escape(&ctx.props.url)
        )))
    }));
    let (_dir, d) = dispatcher(manifest).await;

    let resp = d.handle(HttpRequest::new("GET", "/somewhere")).await;
    assert_eq!(resp.status, 404);
    assert!(resp.body_string().starts_with("<h1>Lost at /somewhere</h1>"));
}

#[tokio::test]
async fn test_static_file_shadows_route_at_same_path() {
    let route = RouteDescriptor::parse("/foo.txt")
        .unwrap()
        .get(handler(|_req, _ctx| async { Ok(HttpResponse::text("from route")) }));
    let (_dir, d) = dispatcher(manifest().route(route)).await;

    let resp = d.handle(HttpRequest::new("GET", "/foo.txt")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body_string(), "bar\n");
    assert!(resp.header("etag").is_some());
}

#[tokio::test]
async fn test_reserved_hydration_script() {
    let (_dir, d) = dispatcher(manifest()).await;
    let resp = d.handle(HttpRequest::new("GET", "/_islet/hydrate.js")).await;

    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.header("content-type"),
        Some("application/javascript; charset=utf-8")
    );
    assert!(resp.body_string().contains("__ISLET_STATE__"));
}

#[tokio::test]
async fn test_concurrent_requests_are_isolated() {
    let route = RouteDescriptor::parse("/echo/:n")
        .unwrap()
        .get(handler(|req, ctx| async move {
            let n = req.param("n").cloned().unwrap_or_default();
            ctx.state.insert("n", &n)?;
            tokio::task::yield_now().await;
            let seen: String = ctx.state.get_as("n").unwrap_or_default();
            Ok(HttpResponse::text(seen))
        }));
    let (_dir, d) = dispatcher(manifest().route(route)).await;
    let d = Arc::new(d);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let d = d.clone();
            tokio::spawn(async move {
                let resp = d.handle(HttpRequest::new("GET", format!("/echo/{}", i))).await;
                (i, resp.body_string())
            })
        })
        .collect();

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body, i.to_string());
    }
}
