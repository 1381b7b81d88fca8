//! Conversion between HTTP messages and pipeline requests.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Query};
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use keel_core::{AppError, Method, Request, Response};
use serde_json::{Map, Value};
use tracing::warn;

/// Decodes the head and collected body of an HTTP request.
///
/// Repeated query keys collect into an array; repeated headers are joined
/// with `", "`. Header values that are not visible ASCII are dropped.
pub(crate) fn decode(parts: &Parts, body: &[u8]) -> Result<Request, AppError> {
    let method = parts
        .method
        .as_str()
        .parse::<Method>()
        .ok()
        .filter(|m| !m.is_wildcard())
        .ok_or_else(|| AppError::status(405))?;

    let mut req = Request::new(method, parts.uri.path());
    req.query = decode_query(parts)?;
    req.headers = decode_headers(parts);
    req.body = decode_body(body);

    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        req.from = Some(peer.to_string());
        req.ip = Some(peer.ip().to_string());
    }

    Ok(req)
}

fn decode_query(parts: &Parts) -> Result<Value, AppError> {
    let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map_err(|e| AppError::new(400u16, format!("malformed query string: {e}")))?;

    let mut query = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match query.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                query.insert(key, value);
            }
        }
    }
    Ok(Value::Object(query))
}

fn decode_headers(parts: &Parts) -> Value {
    let mut headers = Map::new();
    for (name, value) in &parts.headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        // `HeaderName` is already lower-case.
        match headers.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            _ => {
                headers.insert(name.as_str().to_string(), Value::String(value.to_string()));
            }
        }
    }
    Value::Object(headers)
}

fn decode_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

/// Encodes a pipeline result.
pub(crate) fn encode(result: Result<Response, AppError>) -> HttpResponse {
    match result {
        Ok(response) => encode_success(response),
        Err(err) => encode_error(err),
    }
}

fn encode_success(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status()).unwrap_or_else(|_| {
        warn!(status = response.status(), "handler set an invalid status, answering 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut http = (status, Json(response.body)).into_response();
    let headers = http.headers_mut();
    for (name, value) in response.reply.headers() {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "dropping invalid reply header"),
        }
    }
    http
}

pub(crate) fn encode_error(err: AppError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err)).into_response()
}
