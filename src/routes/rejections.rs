//! Framework-generated client errors (unknown route, wrong method, oversized body) re-rendered
//! in the `errors` envelope.

use crate::error::AppError;
use crate::extractors::{Format, ACCEPT_HEADER};
use crate::response::reply;
use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

fn requested_format(headers: &HeaderMap) -> Format {
    Format::from_accept(headers.get(ACCEPT_HEADER).and_then(|v| v.to_str().ok()))
}

/// Responses built by `reply` always carry one of the negotiated content types.
fn is_enveloped(res: &Response) -> bool {
    res.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| {
            [Format::Json, Format::Yaml, Format::Xml]
                .iter()
                .any(|f| ct.starts_with(f.content_type()))
        })
}

/// Middleware: replace a bare 4xx from the router or a body-limit layer with an enveloped one.
/// The `Allow` header of a 405 is kept.
pub async fn envelope_rejections(request: Request, next: Next) -> Response {
    let format = requested_format(request.headers());
    let res = next.run(request).await;
    if !res.status().is_client_error() || is_enveloped(&res) {
        return res;
    }
    let err = match res.status() {
        StatusCode::NOT_FOUND => AppError::RouteNotFound,
        StatusCode::METHOD_NOT_ALLOWED => AppError::MethodNotAllowed,
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
        status => AppError::BadRequest(status.canonical_reason().unwrap_or("invalid request").to_lowercase()),
    };
    let mut enveloped = reply(format, Err(err));
    if let Some(allow) = res.headers().get(header::ALLOW) {
        enveloped.headers_mut().insert(header::ALLOW, allow.clone());
    }
    enveloped
}

/// Router fallback for paths no resource claims.
pub async fn unknown_route(request: Request) -> Response {
    tracing::debug!(path = %request.uri().path(), "no route");
    reply(requested_format(request.headers()), Err(AppError::RouteNotFound))
}
