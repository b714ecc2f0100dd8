//! Page rendering.
//!
//! The templating engine itself lives outside the framework: a page is any
//! [`Render`] implementation that turns a [`RenderContext`] into HTML plus
//! the islands it instantiated. The [`RenderPipeline`] post-processes that
//! output (asset fingerprinting, hydration state) into a response.

use crate::fingerprint::{AssetRewriter, BuildFingerprint};
use crate::http::RequestState;
use crate::islands::{HydrationEntry, HydrationPayload};
use crate::logging::trace;
use crate::routing::Params;
use crate::{Error, HandlerError, HttpResponse};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Props handed to every page component.
#[derive(Debug, Clone, Serialize)]
pub struct PageProps {
    /// Request target, query included.
    pub url: String,
    /// Matched pattern text (`/props/:id`), empty for framework pages.
    pub route: String,
    pub params: Params,
    pub data: Value,
}

/// Everything a page component may read while rendering.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub props: PageProps,
    pub state: RequestState,
    /// Set when rendering an error page.
    pub error: Option<HandlerError>,
}

/// Output of a page component.
#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub html: String,
    pub islands: Vec<HydrationEntry>,
}

impl Rendered {
    pub fn new(html: impl Into<String>, islands: Vec<HydrationEntry>) -> Self {
        Self {
            html: html.into(),
            islands,
        }
    }

    /// Markup without interactive components.
    pub fn html(html: impl Into<String>) -> Self {
        Self::new(html, Vec::new())
    }
}

/// A page component.
#[async_trait]
pub trait Render: Send + Sync {
    async fn render(&self, ctx: &RenderContext) -> Result<Rendered, Error>;
}

/// Page component backed by a synchronous closure
pub struct FnRender<F> {
    f: F,
}

/// Wrap a closure as a page component.
///
/// ```
/// use islet_core::render::{render_fn, Rendered};
///
/// let page = render_fn(|ctx| Ok(Rendered::html(format!("<h1>{}</h1>", ctx.props.url))));
/// # let _ = page;
/// ```
pub fn render_fn<F>(f: F) -> FnRender<F>
where
    F: Fn(&RenderContext) -> Result<Rendered, Error> + Send + Sync + 'static,
{
    FnRender { f }
}

#[async_trait]
impl<F> Render for FnRender<F>
where
    F: Fn(&RenderContext) -> Result<Rendered, Error> + Send + Sync + 'static,
{
    async fn render(&self, ctx: &RenderContext) -> Result<Rendered, Error> {
        (self.f)(ctx)
    }
}

/// Turns component output into an HTML response.
pub struct RenderPipeline {
    rewriter: AssetRewriter,
    hydration_path: String,
}

impl RenderPipeline {
    pub fn new(rewriter: AssetRewriter, hydration_path: impl Into<String>) -> Self {
        Self {
            rewriter,
            hydration_path: hydration_path.into(),
        }
    }

    pub fn fingerprint(&self) -> &BuildFingerprint {
        self.rewriter.fingerprint()
    }

    pub fn rewriter(&self) -> &AssetRewriter {
        &self.rewriter
    }

    /// Render `page` and finish the document.
    pub async fn render_page(
        &self,
        page: &Arc<dyn Render>,
        ctx: &RenderContext,
        status: u16,
    ) -> Result<HttpResponse, Error> {
        let rendered = page.render(ctx).await?;
        self.finish(rendered, status)
    }

    /// Fingerprint assets, then inject the hydration state before `</body>`.
    pub fn finish(&self, rendered: Rendered, status: u16) -> Result<HttpResponse, Error> {
        trace!(islands = rendered.islands.len(), "Finishing rendered page");

        let html = self.rewriter.rewrite(&rendered.html);
        let tags = HydrationPayload::new(&rendered.islands)
            .script_tags(&self.hydration_path, self.rewriter.fingerprint())?;

        let body = match rfind_ascii_ci(&html, "</body>") {
            Some(pos) => format!("{}{}{}", &html[..pos], tags, &html[pos..]),
            None => format!("{}{}", html, tags),
        };

        Ok(HttpResponse::html(body).with_status(status))
    }
}

fn rfind_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .rposition(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}

/// HTML-escape a string
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::islands::IslandRecorder;
    use crate::static_assets::StaticIndex;
    use serde_json::json;

    fn pipeline() -> RenderPipeline {
        let rewriter = AssetRewriter::new(
            Arc::new(StaticIndex::default()),
            BuildFingerprint::new("fp"),
        );
        RenderPipeline::new(rewriter, "/_islet/hydrate.js")
    }

    fn ctx(data: Value) -> RenderContext {
        RenderContext {
            props: PageProps {
                url: "/props/123".into(),
                route: "/props/:id".into(),
                params: Params::from([("id".to_string(), "123".to_string())]),
                data,
            },
            state: RequestState::new(),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_static_page_gets_empty_state_only() {
        let page: Arc<dyn Render> = Arc::new(render_fn(|ctx| {
            Ok(Rendered::html(format!(
                "<html><body>{}</body></html>",
                serde_json::to_string(&ctx.props.params)?
            )))
        }));

        let resp = pipeline().render_page(&page, &ctx(Value::Null), 200).await.unwrap();
        let body = resp.body_string();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("text/html; charset=utf-8"));
        assert!(body.contains(r#"{"id":"123"}"#));
        assert!(body.contains(r#"<script id="__ISLET_STATE__" type="application/json">[]</script></body>"#));
        assert!(!body.contains("hydrate.js"));
    }

    #[tokio::test]
    async fn test_island_page_loads_bootstrap() {
        let page: Arc<dyn Render> = Arc::new(render_fn(|ctx| {
            let mut islands = IslandRecorder::new();
            let counter = islands.island("Counter", &ctx.props.data, "<button>0</button>")?;
            Ok(Rendered::new(format!("<main>{}</main>", counter), islands.into_entries()))
        }));

        let resp = pipeline()
            .render_page(&page, &ctx(json!({"start": 0})), 200)
            .await
            .unwrap();
        let body = resp.body_string();

        assert!(body.starts_with("<main><!--islet:0:Counter-->"));
        assert!(body.contains(r#"[["Counter",{"start":0}]]"#));
        assert!(body.contains(r#"<script type="module" src="/_islet/hydrate.js?__islet_c=fp"></script>"#));
    }

    #[tokio::test]
    async fn test_render_error_propagates() {
        let page: Arc<dyn Render> =
            Arc::new(render_fn(|_| Err(Error::handler("Error: boom!"))));
        let err = pipeline()
            .render_page(&page, &ctx(Value::Null), 200)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Error: boom!");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }
}
