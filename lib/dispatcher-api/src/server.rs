//! HTTP/1 server for the membership query service

use crate::check::check_status;
use dispatcher_core::SetRegistry;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::{server::conn::http1, service::service_fn, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Serve membership checks on `listener` until `cancel` fires.
///
/// On cancellation the listener stops accepting and open connections finish
/// their in-flight request before closing.
pub async fn serve(listener: TcpListener, registry: Arc<SetRegistry>, cancel: CancellationToken) {
    if let Ok(addr) = listener.local_addr() {
        info!("Membership API listening on {}", addr);
    }

    loop {
        let (stream, peer_addr) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Error accepting HTTP connection: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let registry = registry.clone();
        let cancel = cancel.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let registry = registry.clone();
                async move { Ok::<_, Infallible>(handle_request(&registry, req)) }
            });

            let conn = http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = cancel.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!("Error serving HTTP connection from {}: {}", peer_addr, e);
            }
        });
    }

    info!("Membership API stopped");
}

fn handle_request<B>(registry: &SetRegistry, req: Request<B>) -> Response<Full<Bytes>> {
    let status = check_status(registry, req.uri().path());
    debug!("{} {} -> {}", req.method(), req.uri().path(), status.as_u16());

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
