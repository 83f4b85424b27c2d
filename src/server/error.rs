// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};

use crate::bridge::CommandFailure;
use crate::error::{Error, ErrorKind};

/// HTTP status for an error category.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::DeviceUnreachable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeviceTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::DeviceProtocol => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
    }
}

fn message_for(err: &Error) -> String {
    match err.kind() {
        ErrorKind::DeviceUnreachable => "PSU unreachable".to_string(),
        ErrorKind::DeviceTimeout => "PSU timeout".to_string(),
        _ => err.to_string(),
    }
}

/// An error response: a status code and a JSON object with at least an
/// `error` key.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Map<String, Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("error".to_string(), Value::String(message.into()));
        Self { status, body }
    }

    /// 401 for a missing or wrong API key.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    /// 429 for a client over its request budget.
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }

    /// Adds an extra key to the body.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_string(), value);
        self
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(status_for(err.kind()), message_for(&err))
    }
}

impl From<CommandFailure> for ApiError {
    fn from(failure: CommandFailure) -> Self {
        let response = Self::from(failure.source);
        match failure.sent {
            Some(sent) => response.with_field("sent", json!(sent)),
            None => response,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}
