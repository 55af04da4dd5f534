//! Header manipulation toward backends.
//!
//! # Responsibilities
//! - Copy inbound headers to the outbound request
//! - Strip hop-by-hop headers and the inbound `Host`
//! - Set X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Own the trust boundary: `X-User-ID` / `X-User-Email` only ever come from
//!   a verified identity, never from the client
//!
//! # Design Decisions
//! - Client-supplied identity headers are dropped on every route, public ones included
//! - X-Forwarded-* are overwritten with what this hop saw

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::http::request::{RequestContext, X_REQUEST_ID};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");

/// Headers that describe a single connection and must not cross the hop.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// What this hop observed about the client-facing request.
#[derive(Debug, Clone)]
pub struct ForwardedFor {
    pub client_ip: IpAddr,
    pub host: Option<HeaderValue>,
    pub proto: &'static str,
}

/// Build the header map sent to a backend.
pub fn upstream_headers(inbound: &HeaderMap, forwarded: &ForwardedFor, ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 6);

    for (name, value) in inbound {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == X_USER_ID
            || name == X_USER_EMAIL
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    // Header names listed in `Connection` are hop-by-hop too.
    for listed in inbound
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
    {
        if let Ok(name) = HeaderName::from_bytes(listed.trim().as_bytes()) {
            headers.remove(name);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&forwarded.client_ip.to_string()) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    if let Some(host) = &forwarded.host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(forwarded.proto));

    if let Some(value) = ctx.request_id().and_then(|id| id.header_value()) {
        headers.insert(X_REQUEST_ID, value);
    }

    if let Some(identity) = ctx.identity() {
        if let Ok(value) = HeaderValue::from_str(&identity.subject_id().to_string()) {
            headers.insert(X_USER_ID, value);
        }
        if let Ok(value) = HeaderValue::from_str(identity.email()) {
            headers.insert(X_USER_EMAIL, value);
        }
    }

    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| h == name)
}
