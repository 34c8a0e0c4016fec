use std::{convert::Infallible, future::Future, net::SocketAddr};

use anyhow::Context;
use hyper::{
    Body, Request, Response, Server, StatusCode,
    header::{CONTENT_TYPE, HeaderValue},
    service::{make_service_fn, service_fn},
};

use crate::sink::MetricState;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// HTTP server that exposes the metrics on `/metrics`.
pub struct MetricsServer {
    listener: std::net::TcpListener,
    state: MetricState,
}

impl MetricsServer {
    /// Binds the listening socket. The server does not accept connections
    /// until [`run`](Self::run) is called.
    pub fn bind(addr: SocketAddr, state: MetricState) -> anyhow::Result<Self> {
        let listener =
            std::net::TcpListener::bind(addr).with_context(|| format!("failed to listen on {addr}"))?;
        listener.set_nonblocking(true)?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves the requests until `shutdown` completes.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let addr = self.local_addr()?;
        let state = self.state;
        let make_svc = make_service_fn(move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let state = state.clone();
                    async move { Ok::<_, Infallible>(handle(&req, &state)) }
                }))
            }
        });

        let server = Server::from_tcp(self.listener)
            .context("failed to start the HTTP server")?
            .serve(make_svc);
        log::info!("Prometheus metrics available on http://{addr}/metrics");

        server
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;
        log::info!("Prometheus server stopped.");
        Ok(())
    }
}

fn handle(req: &Request<Body>, state: &MetricState) -> Response<Body> {
    if req.uri().path() != "/metrics" {
        return status(StatusCode::NOT_FOUND, "Not Found");
    }
    match state.encode() {
        Ok(buf) => {
            let mut response = Response::new(Body::from(buf));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(OPENMETRICS_CONTENT_TYPE));
            response
        }
        Err(e) => {
            log::error!("Failed to encode metrics: {e}");
            status(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn status(code: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = code;
    response
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use ec2_cost::{labels::TagSchema, metrics::Ec2Metrics, sink::MetricSink};
    use hyper::{Client, StatusCode, body::to_bytes, header::CONTENT_TYPE};
    use tokio::sync::oneshot;

    use super::MetricsServer;
    use crate::PrometheusSink;

    #[tokio::test]
    async fn serves_metrics_and_404() {
        let sink = PrometheusSink::new();
        let metrics = Ec2Metrics::new(&TagSchema::default());
        metrics.register(&sink).unwrap();
        let family = &metrics.spots.market_price;
        let labels = family
            .labels()
            .with("az", "eu-west-1a")
            .with("product", "Linux/UNIX")
            .with("instance_type", "c5.large");
        sink.set(family, &labels, 0.031);

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::bind(addr, sink.state()).unwrap();
        let addr = server.local_addr().unwrap();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            stop_rx.await.ok();
        }));

        let client = Client::new();
        let response = client
            .get(format!("http://{addr}/metrics").parse().unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()[CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("application/openmetrics-text")
        );
        let body = String::from_utf8(to_bytes(response.into_body()).await.unwrap().to_vec()).unwrap();
        assert!(
            body.contains(r#"aws_ec2_spot_price_dollars{az="eu-west-1a",product="Linux/UNIX",instance_type="c5.large"} 0.031"#),
            "unexpected body:\n{body}"
        );

        let response = client
            .get(format!("http://{addr}/other").parse().unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        drop(client);
        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn address_in_use() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let first = MetricsServer::bind(addr, PrometheusSink::new().state()).unwrap();
        let err = MetricsServer::bind(first.local_addr().unwrap(), PrometheusSink::new().state())
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("failed to listen on"));
    }
}
