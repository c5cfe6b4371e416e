//! Resolves the caller's IP for audit rows and MFA delivery logging.
//! Prefers a proxy-supplied header so deployments behind a load balancer
//! still see the real client, falling back to the socket peer address.

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

pub async fn resolve_client_ip(mut request: Request, next: Next) -> Response {
    let from_header = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());

    let ip = from_header.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    if let Some(ip) = ip {
        request.extensions_mut().insert(ClientIp(ip));
    }

    next.run(request).await
}
