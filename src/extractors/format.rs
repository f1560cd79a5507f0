//! Pick the response encoding from the request's `Accept` header.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const ACCEPT_HEADER: &str = "Accept";

/// Response encoding. Anything that does not ask for YAML or XML gets JSON.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Yaml,
    Xml,
}

impl Format {
    pub fn from_accept(accept: Option<&str>) -> Self {
        let accept = accept.unwrap_or("").to_ascii_lowercase();
        if accept.contains("yaml") {
            Format::Yaml
        } else if accept.contains("xml") {
            Format::Xml
        } else {
            Format::Json
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Yaml => "application/yaml",
            Format::Xml => "application/xml",
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Format
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let accept = parts
            .headers
            .get(ACCEPT_HEADER)
            .and_then(|v: &axum::http::HeaderValue| v.to_str().ok());
        Ok(Format::from_accept(accept))
    }
}
