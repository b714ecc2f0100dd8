//! End-to-end workflows across the islet crates.
//!
//! A small site is assembled from file-layout routes, configured from a
//! TOML file and exercised in-process through the test client.

use islet::prelude::*;
use islet::{LogFormat, LogLevel};
use islet_config::{ConfigManager, IsletConfig};
use islet_testing::*;
use serde_json::json;
use std::fs;

fn route(file: &str) -> RouteDescriptor {
    RouteDescriptor::from_file(file).unwrap().unwrap()
}

fn layout(body: String) -> String {
    format!(
        r#"<html><head><link rel="stylesheet" href="/styles.css"></head><body><img src="/logo.svg">{}</body></html>"#,
        body
    )
}

fn site() -> Manifest {
    let home = route("index.tsx").page(render_fn(|_ctx| {
        Ok(Rendered::html(layout("<h1>home</h1>".to_string())))
    }));

    let counter = route("counter/[start].tsx").page(render_fn(|ctx| {
        let start: i64 = ctx.props.params["start"].parse().unwrap_or(0);
        let mut islands = IslandRecorder::new();
        let a = islands.island("Counter", &json!({ "start": start }), "<button>a</button>")?;
        let b = islands.island("Counter", &json!({ "start": start + 1 }), "<button>b</button>")?;
        Ok(Rendered::new(layout(format!("{}{}", a, b)), islands.into_entries()))
    }));

    let docs = route("docs/[...slug].tsx").page(render_fn(|ctx| {
        Ok(Rendered::html(format!("<p>{}</p>", ctx.props.params["slug"])))
    }));

    let admin = route("admin/index.tsx").get(handler(|req, _ctx| async move {
        let user = req.state.get("user").unwrap_or_default();
        Ok(HttpResponse::text(format!("admin for {}", user)))
    }));

    Manifest::new()
        .route(home)
        .route(counter)
        .route(docs)
        .route(admin)
        .middleware(
            "",
            middleware_fn(|req, next| async move {
                let mut resp = next(req).await?;
                resp.set_header("x-powered-by", "islet");
                Ok(resp)
            }),
        )
        .middleware(
            "admin",
            middleware_fn(|req, next| async move {
                let token = req.header("authorization").map(str::to_string);
                match token {
                    Some(token) => {
                        req.state.insert("user", token)?;
                        next(req).await
                    }
                    None => Ok(HttpResponse::new(401)),
                }
            }),
        )
        .not_found_page(render_fn(|ctx| {
            Ok(Rendered::html(format!("<h1>missing {}</h1>", ctx.props.url)))
        }))
}

fn site_config(assets: &StaticDir) -> IsletConfig {
    let conf_dir = tempfile::TempDir::new().unwrap();
    let conf = conf_dir.path().join("islet.toml");
    fs::write(
        &conf,
        format!(
            "static_dir = {:?}\nbuild_id = \"site-1\"\nlog_format = \"compact\"\n",
            assets.path().display().to_string()
        ),
    )
    .unwrap();

    let mut manager = ConfigManager::with_env(islet_config::EnvLoader::from_vars(
        Some("ISLET".to_string()),
        Vec::<(String, String)>::new(),
    ));
    manager.load_file(&conf).unwrap().load_env().build().unwrap()
}

async fn client() -> (StaticDir, TestClient) {
    let assets = StaticDir::new()
        .unwrap()
        .file("/styles.css", "h1 { color: teal }")
        .unwrap()
        .file("/logo.svg", "<svg></svg>")
        .unwrap();

    let config = site_config(&assets);
    let dispatcher = Dispatcher::build(site(), config.server_options()).await.unwrap();
    (assets, TestClient::new(dispatcher))
}

#[tokio::test]
async fn test_home_page_through_root_middleware() {
    let (_assets, client) = client().await;
    let resp = client.get("/").await;

    assert_status(&resp, 200);
    assert_header(&resp, "x-powered-by", "islet");
    assert_body_contains(&resp, r#"<img src="/logo.svg?__islet_c=site-1">"#);
    // Only image sources are fingerprinted.
    assert_body_contains(&resp, r#"href="/styles.css""#);
    assert_hydration_state(&resp, &json!([]));
}

#[tokio::test]
async fn test_island_page_orders_entries() {
    let (_assets, client) = client().await;
    let resp = client.get("/counter/7").await;

    assert_hydration_state(
        &resp,
        &json!([["Counter", { "start": 7 }], ["Counter", { "start": 8 }]]),
    );
    assert_body_contains(&resp, "<!--islet:0:Counter--><button>a</button><!--/islet:0-->");
    assert_body_contains(&resp, "<!--islet:1:Counter--><button>b</button><!--/islet:1-->");
    assert_body_contains(&resp, r#"src="/_islet/hydrate.js?__islet_c=site-1""#);
}

#[tokio::test]
async fn test_catch_all_route() {
    let (_assets, client) = client().await;
    let resp = client.get("/docs/guide/install").await;
    assert_status(&resp, 200);
    assert_body_contains(&resp, "<p>guide/install</p>");
}

#[tokio::test]
async fn test_scoped_middleware_guards_admin() {
    let (_assets, client) = client().await;

    let denied = client.get("/admin").await;
    assert_status(&denied, 401);
    // Root layer still wraps the short-circuited response.
    assert_header(&denied, "x-powered-by", "islet");

    let req = TestRequestBuilder::new("GET", "/admin")
        .header("Authorization", "alice")
        .build();
    let allowed = client.send(req).await;
    assert_status(&allowed, 200);
    assert_eq!(allowed.body_string(), "admin for \"alice\"");
}

#[tokio::test]
async fn test_custom_not_found_page() {
    let (_assets, client) = client().await;
    let resp = client.get("/nowhere").await;
    assert_status(&resp, 404);
    assert_body_contains(&resp, "<h1>missing /nowhere</h1>");
}

#[tokio::test]
async fn test_static_asset_revalidation() {
    let (_assets, client) = client().await;
    let first = client.get("/styles.css").await;
    let etag = first.header("etag").unwrap().to_string();

    let req = TestRequestBuilder::new("GET", "/styles.css")
        .header("If-None-Match", &etag)
        .build();
    let revalidated = client.send(req).await;
    assert_status(&revalidated, 304);

    let pinned = client.get("/styles.css?__islet_c=site-1").await;
    assert_immutable(&pinned);
}

#[tokio::test]
async fn test_config_build_id_pins_fingerprint() {
    let (_assets, client) = client().await;
    assert_eq!(client.dispatcher().fingerprint().as_str(), "site-1");
    assert!(client.dispatcher().route_count() >= 4);
}

#[test]
fn test_config_file_selects_log_format() {
    let assets = StaticDir::new().unwrap();
    let log = site_config(&assets).log_config().unwrap();
    assert_eq!(log.format, LogFormat::Compact);
    assert_eq!(log.level, LogLevel::Info);
}
