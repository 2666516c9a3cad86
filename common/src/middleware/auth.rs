//! Actor identity extraction.
//!
//! Token verification happens upstream; the authenticator forwards the
//! verified identity as `x-user-id` / `x-username` headers. This module turns
//! those headers plus the client address into an [`Actor`].

use std::net::{IpAddr, SocketAddr};

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::errors::AppError;
use crate::models::audit::Actor;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the authenticated user name.
pub const USERNAME_HEADER: &str = "x-username";

/// Longest user name kept on an [`Actor`], in characters.
pub const MAX_USERNAME_CHARS: usize = 50;

impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(actor.clone());
        }

        let user_id = header_str(&parts.headers, USER_ID_HEADER)
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| AppError::Unauthorized("missing or invalid user identity".into()))?;

        let username = header_str(&parts.headers, USERNAME_HEADER)
            .unwrap_or_default()
            .trim()
            .chars()
            .take(MAX_USERNAME_CHARS)
            .collect();

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Actor {
            user_id,
            username,
            client_ip: client_ip(&parts.headers, peer),
        })
    }
}

/// Rejects requests without an authenticated identity and stores the
/// resolved [`Actor`] in the request extensions.
pub async fn auth_middleware(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let actor = Actor::from_request_parts(&mut parts, &()).await?;
    tracing::debug!(user_id = actor.user_id, client_ip = %actor.client_ip, "Actor resolved");
    parts.extensions.insert(actor);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Resolves the client IP: first `x-forwarded-for` hop, then `x-real-ip`,
/// then the socket peer address. Header values that are not IP addresses are
/// skipped.
pub fn client_ip(headers: &HeaderMap, peer: Option<String>) -> String {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(parse_ip)
        .or_else(|| header_str(headers, "x-real-ip").and_then(parse_ip))
        .map(|ip| ip.to_string())
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

fn parse_ip(value: &str) -> Option<IpAddr> {
    value.trim().parse().ok()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
