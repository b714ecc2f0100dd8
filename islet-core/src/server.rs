// HTTP/1 transport adapter around a Dispatcher

use crate::logging::{debug, error, info};
use crate::{ConnectionInfo, Dispatcher, Error, HttpRequest, HttpResponse};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, body::Incoming as IncomingBody};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Serves a [`Dispatcher`] over HTTP/1.1.
///
/// When a client disconnects, hyper drops the per-request future, which
/// abandons the handler mid-flight.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
        }
    }

    pub fn from_arc(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Start the HTTP server on the specified port, until the process exits.
    pub async fn listen(self, port: u16) -> Result<(), Error> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Start the HTTP server, stopping gracefully once `shutdown` resolves.
    pub async fn listen_with_shutdown<S>(self, addr: SocketAddr, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections from `listener` until `shutdown` resolves, then
    /// wait for open connections to finish.
    pub async fn serve<S>(self, listener: TcpListener, shutdown: S) -> Result<(), Error>
    where
        S: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Server listening");

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => {
                    info!("Shutdown signal received, draining connections");
                    break;
                }
            };

            let conn_info = ConnectionInfo {
                local_addr: Some(local_addr),
                remote_addr: Some(remote_addr),
            };
            let dispatcher = self.dispatcher.clone();
            let service = service_fn(move |req: Request<IncomingBody>| {
                let dispatcher = dispatcher.clone();
                async move { handle_request(req, dispatcher, conn_info).await }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            let conn = graceful.watch(conn);
            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    debug!(remote = %remote_addr, error = ?err, "Error serving connection");
                }
            });
        }

        graceful.shutdown().await;
        info!("Server stopped");
        Ok(())
    }
}

/// Convert a hyper request, dispatch it, and convert the response back.
async fn handle_request(
    req: Request<IncomingBody>,
    dispatcher: Arc<Dispatcher>,
    conn: ConnectionInfo,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().to_string();
    let target = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut islet_req = HttpRequest::new(method, target).with_connection(conn);
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            islet_req = islet_req.with_header(name.as_str(), value);
        }
    }

    islet_req.body = req.collect().await?.to_bytes().to_vec();

    let response = dispatcher.handle(islet_req).await;
    Ok(into_hyper_response(response))
}

fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in &response.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }

    match builder.body(Full::new(Bytes::from(response.body))) {
        Ok(resp) => resp,
        Err(err) => {
            error!(error = %err, "Invalid response, replying 500");
            let mut resp = Response::new(Full::new(Bytes::new()));
            *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            resp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{handler, Manifest, RouteDescriptor};
    use crate::ServerOptions;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_into_hyper_response() {
        let resp = into_hyper_response(
            HttpResponse::text("hi").with_header("Server", "islet"),
        );
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["server"], "islet");
    }

    #[test]
    fn test_invalid_status_becomes_500() {
        let resp = into_hyper_response(HttpResponse::new(1000));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_serves_over_tcp_and_shuts_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let route = RouteDescriptor::parse("/whoami")
            .unwrap()
            .get(handler(|_req, ctx| async move {
                let remote = ctx.conn.remote_addr.map(|a| a.ip().to_string());
                Ok(HttpResponse::text(remote.unwrap_or_default()))
            }));
        let dispatcher = Dispatcher::build(
            Manifest::new().route(route),
            ServerOptions::new().with_static_dir(dir.path()),
        )
        .await
        .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(Server::new(dispatcher).serve(listener, async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /whoami HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();

        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("127.0.0.1"));

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
