//! Encode response payloads and error envelopes as JSON, YAML or XML.

use crate::error::{AppError, GENERIC_ERROR};
use crate::extractors::Format;
use crate::xml::to_xml;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

/// Encode `body` with `status`. An encoding failure answers 500 with the JSON error envelope.
pub fn render(format: Format, status: StatusCode, body: &Value) -> Response {
    let encoded = match format {
        Format::Json => serde_json::to_vec(body).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::to_string(body)
            .map(String::into_bytes)
            .map_err(|e| e.to_string()),
        Format::Xml => Ok(to_xml(body).into_bytes()),
    };
    match encoded {
        Ok(bytes) => {
            let mut res = (status, bytes).into_response();
            res.headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(format.content_type()));
            res
        }
        Err(e) => {
            tracing::error!(error = %e, ?format, "response encoding failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "errors": [GENERIC_ERROR] })),
            )
                .into_response()
        }
    }
}

/// 200 with the payload, or the error's status with its `errors` envelope, both in `format`.
pub fn reply(format: Format, result: Result<Value, AppError>) -> Response {
    match result {
        Ok(body) => render(format, StatusCode::OK, &body),
        Err(e) => {
            e.log();
            let body = json!({ "errors": e.messages() });
            render(format, e.status(), &body)
        }
    }
}
