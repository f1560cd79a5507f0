//! Path parameters whose rejections answer in the `errors` envelope.

use crate::error::AppError;
use crate::extractors::{Format, ACCEPT_HEADER};
use crate::response::reply;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    response::Response,
};
use serde::de::DeserializeOwned;

/// Like [`Path`], but a malformed segment (bad percent-encoding, invalid UTF-8) is a 400 in
/// the negotiated format.
#[derive(Debug)]
pub struct PathParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParams<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParams(value)),
            Err(rejection) => {
                let format = Format::from_accept(parts.headers.get(ACCEPT_HEADER).and_then(|v| v.to_str().ok()));
                Err(reply(format, Err(AppError::BadRequest(rejection.body_text()))))
            }
        }
    }
}
