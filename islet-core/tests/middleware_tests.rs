use islet_core::middleware::MultiMiddleware;
use islet_core::{
    handler, middleware_fn, Dispatcher, HttpRequest, HttpResponse, Manifest, Middleware,
    RouteDescriptor, ServerOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

/// Middleware that records entry/exit and stamps `server` on the way out.
fn layer(name: &'static str, log: Log) -> impl Middleware {
    middleware_fn(move |req, next| {
        let log = log.clone();
        async move {
            log.lock().push(format!("{} in", name));
            req.state.insert(name, format!("{}_mw", name))?;
            let mut resp = next(req).await?;
            log.lock().push(format!("{} out", name));
            resp.set_header("server", name);
            Ok(resp)
        }
    })
}

fn state_route(path: &str) -> RouteDescriptor {
    RouteDescriptor::from_file(path)
        .unwrap()
        .unwrap()
        .get(handler(|_req, ctx| async move {
            HttpResponse::ok().with_json(&ctx.state.to_value())
        }))
}

async fn dispatcher(log: Log) -> (TempDir, Dispatcher) {
    let manifest = Manifest::new()
        .route(state_route("index.tsx"))
        .route(state_route("layeredMdw/layer2/abc.tsx"))
        .route(state_route("layeredMdw/layer3/[id].tsx"))
        .route(state_route("layeredMdw/layer3/index.tsx"))
        .route(state_route("a/b/x.tsx"))
        .route(state_route("a/c/x.tsx"))
        .middleware("", layer("root", log.clone()))
        .middleware("layeredMdw", layer("layer1", log.clone()))
        .middleware("layeredMdw/layer2", layer("layer2", log.clone()))
        .middleware("layeredMdw/layer3", layer("layer3", log.clone()))
        .middleware("a/b", layer("b", log.clone()));

    let dir = TempDir::new().unwrap();
    let options = ServerOptions::new().with_static_dir(dir.path());
    (dir, Dispatcher::build(manifest, options).await.unwrap())
}

fn state(resp: &HttpResponse) -> serde_json::Value {
    serde_json::from_slice(&resp.body).unwrap()
}

#[tokio::test]
async fn test_onion_order() {
    let log: Log = Arc::default();
    let (_dir, d) = dispatcher(log.clone()).await;

    let resp = d.handle(HttpRequest::new("GET", "/layeredMdw/layer2/abc")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(
        *log.lock(),
        vec!["root in", "layer1 in", "layer2 in", "layer2 out", "layer1 out", "root out"]
    );
}

#[tokio::test]
async fn test_root_post_processing_wins() {
    let (_dir, d) = dispatcher(Arc::default()).await;

    let resp = d.handle(HttpRequest::new("GET", "/layeredMdw/layer3/1")).await;
    assert_eq!(resp.header("server"), Some("root"));

    let body = state(&resp);
    assert_eq!(body["root"], "root_mw");
    assert_eq!(body["layer1"], "layer1_mw");
    assert_eq!(body["layer3"], "layer3_mw");
    assert!(body.get("layer2").is_none());
}

#[tokio::test]
async fn test_index_route_runs_its_directory_middleware() {
    let (_dir, d) = dispatcher(Arc::default()).await;

    let resp = d.handle(HttpRequest::new("GET", "/layeredMdw/layer3")).await;
    assert_eq!(resp.status, 200);
    assert_eq!(state(&resp)["layer3"], "layer3_mw");
}

#[tokio::test]
async fn test_sibling_subtrees_do_not_share_middleware() {
    let log: Log = Arc::default();
    let (_dir, d) = dispatcher(log.clone()).await;

    let resp = d.handle(HttpRequest::new("GET", "/a/c/x")).await;
    let body = state(&resp);
    assert!(body.get("b").is_none());
    assert_eq!(*log.lock(), vec!["root in", "root out"]);

    let resp = d.handle(HttpRequest::new("GET", "/a/b/x")).await;
    assert_eq!(state(&resp)["b"], "b_mw");
}

#[tokio::test]
async fn test_root_middleware_applies_to_root_route() {
    let (_dir, d) = dispatcher(Arc::default()).await;

    let resp = d.handle(HttpRequest::new("GET", "/")).await;
    assert_eq!(resp.header("server"), Some("root"));
    assert_eq!(state(&resp), serde_json::json!({ "root": "root_mw" }));
}

#[tokio::test]
async fn test_short_circuit_skips_inner_layers_and_handler() {
    let log: Log = Arc::default();
    let guard = middleware_fn(|req, next| async move {
        if req.header("authorization").is_none() {
            return Ok(HttpResponse::new(401).with_header("www-authenticate", "Bearer"));
        }
        next(req).await
    });
    let manifest = Manifest::new()
        .route(state_route("admin/panel.tsx"))
        .middleware(
            "admin",
            MultiMiddleware::new(vec![
                Arc::new(guard) as Arc<dyn Middleware>,
                Arc::new(layer("audit", log.clone())),
            ]),
        );
    let dir = TempDir::new().unwrap();
    let d = Dispatcher::build(manifest, ServerOptions::new().with_static_dir(dir.path()))
        .await
        .unwrap();

    let resp = d.handle(HttpRequest::new("GET", "/admin/panel")).await;
    assert_eq!(resp.status, 401);
    assert!(log.lock().is_empty());

    let resp = d
        .handle(HttpRequest::new("GET", "/admin/panel").with_header("Authorization", "Bearer t"))
        .await;
    assert_eq!(resp.status, 200);
    assert_eq!(*log.lock(), vec!["audit in", "audit out"]);
}

#[tokio::test]
async fn test_middleware_error_renders_500() {
    let failing = middleware_fn(|_req, _next| async {
        Err(islet_core::Error::handler("middleware exploded"))
    });
    let manifest = Manifest::new()
        .route(state_route("index.tsx"))
        .middleware("", failing);
    let dir = TempDir::new().unwrap();
    let d = Dispatcher::build(manifest, ServerOptions::new().with_static_dir(dir.path()))
        .await
        .unwrap();

    let resp = d.handle(HttpRequest::new("GET", "/")).await;
    assert_eq!(resp.status, 500);
    assert!(resp.body_string().contains("middleware exploded"));
}

#[tokio::test]
async fn test_duplicate_directory_middleware_rejected() {
    let manifest = Manifest::new()
        .middleware("x", layer("one", Arc::default()))
        .middleware("/x/", layer("two", Arc::default()));
    let dir = TempDir::new().unwrap();
    let result = Dispatcher::build(manifest, ServerOptions::new().with_static_dir(dir.path())).await;
    assert!(result.is_err());
}
