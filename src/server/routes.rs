// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request handlers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::AppState;
use super::error::ApiError;
use super::rate_limit::RateLimiter;
use crate::bridge::Applied;
use crate::command::CommandRequest;
use crate::error::{Error, ValueError};
use crate::sequence::{SequenceExecutor, SequenceReport};
use crate::state::{DeviceState, TIMESTAMP_FORMAT};
use crate::telemetry::Telemetry;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    bridge_ok: bool,
    psu_reachable: bool,
    psu_base: String,
    state_file: String,
    last_communication: Option<String>,
    version: &'static str,
    features: Features,
}

#[derive(Debug, Serialize)]
struct Features {
    retry: bool,
    rate_limit: bool,
}

fn authorize(app: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(token) = app.config.api_token() else {
        return Ok(());
    };
    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(given) if tokens_match(given.as_bytes(), token.as_bytes()) => Ok(()),
        _ => {
            tracing::warn!("Rejected request with missing or wrong API key");
            Err(ApiError::unauthorized())
        }
    }
}

/// Compares keys in time independent of where they differ.
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn throttle(limiter: &RateLimiter, peer: SocketAddr) -> Result<(), ApiError> {
    if limiter.check(peer.ip()) {
        Ok(())
    } else {
        tracing::warn!(client = %peer.ip(), "Rate limit exceeded");
        Err(ApiError::rate_limited())
    }
}

/// Parses a request body as a JSON object; anything else reads as empty.
fn parse_body(body: &[u8]) -> Map<String, Value> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// Looks `key` up in the query string first, then in the body.
fn field(query: &HashMap<String, String>, body: &Map<String, Value>, key: &str) -> Option<Value> {
    query
        .get(key)
        .filter(|v| !v.is_empty())
        .map(|v| Value::String(v.clone()))
        .or_else(|| body.get(key).cloned())
}

pub(super) async fn health(State(app): State<Arc<AppState>>) -> Json<HealthReport> {
    let last_communication = match app.bridge.load_state().await {
        Ok(state) => state
            .updated_at
            .map(|at| at.format(TIMESTAMP_FORMAT).to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not read state");
            None
        }
    };

    let psu_reachable = match app.bridge.client().charge_status().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Health PSU check failed");
            false
        }
    };

    Json(HealthReport {
        bridge_ok: true,
        psu_reachable,
        psu_base: app.bridge.client().base_url().to_string(),
        state_file: app.bridge.store().path().display().to_string(),
        last_communication,
        version: env!("CARGO_PKG_VERSION"),
        features: Features {
            retry: true,
            rate_limit: true,
        },
    })
}

pub(super) async fn psu_status(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&app, &headers)?;
    let status = app
        .bridge
        .client()
        .charge_status()
        .await
        .map_err(Error::from)?;
    Ok(Json(status))
}

pub(super) async fn psu_current(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    authorize(&app, &headers)?;
    let set_max_current = app
        .bridge
        .load_state()
        .await
        .map_err(Error::from)?
        .max_current;

    match app.bridge.client().charge_status().await {
        Ok(status) => {
            let telemetry = Telemetry::from_status(&status);
            Ok(Json(json!({
                "current_now": telemetry.current_display(),
                "voltage_now": telemetry.voltage_display(),
                "set_max_current": set_max_current,
            })))
        }
        Err(e) => {
            let err = ApiError::from(Error::from(e));
            if err.status() == StatusCode::BAD_GATEWAY {
                Err(err.with_field("set_max_current", json!(set_max_current)))
            } else {
                Err(err)
            }
        }
    }
}

pub(super) async fn last_set(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DeviceState>, ApiError> {
    authorize(&app, &headers)?;
    let state = app.bridge.load_state().await.map_err(Error::from)?;
    Ok(Json(state))
}

pub(super) async fn set(
    State(app): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Applied>, ApiError> {
    throttle(&app.set_limiter, peer)?;
    authorize(&app, &headers)?;

    let body = parse_body(&body);
    let command = CommandRequest::from_fields(
        field(&query, &body, "voltage").as_ref(),
        field(&query, &body, "max_current").as_ref(),
        field(&query, &body, "access").as_ref(),
    )
    .map_err(Error::from)?;

    let applied = app.bridge.apply(&command).await?;
    Ok(Json(applied))
}

pub(super) async fn set_sequence(
    State(app): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SequenceReport>, ApiError> {
    throttle(&app.sequence_limiter, peer)?;
    authorize(&app, &headers)?;

    let body = parse_body(&body);
    let steps = match body.get("sequence") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(steps)) => steps.clone(),
        Some(_) => return Err(Error::from(ValueError::SequenceNotAList).into()),
    };

    let report = SequenceExecutor::new(&app.bridge).run(&steps).await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_falls_back_to_empty_object() {
        assert!(parse_body(b"not json").is_empty());
        assert!(parse_body(b"[1, 2]").is_empty());
        assert!(parse_body(b"").is_empty());
        assert_eq!(parse_body(br#"{"voltage": 54}"#)["voltage"], json!(54));
    }

    #[test]
    fn query_wins_over_body() {
        let query = HashMap::from([("voltage".to_string(), "48".to_string())]);
        let body = parse_body(br#"{"voltage": 54, "max_current": 6}"#);
        assert_eq!(field(&query, &body, "voltage"), Some(json!("48")));
        assert_eq!(field(&query, &body, "max_current"), Some(json!(6)));
        assert_eq!(field(&query, &body, "access"), None);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secreT", b"secret"));
        assert!(!tokens_match(b"Secret", b"secret"));
        assert!(!tokens_match(b"secret2", b"secret"));
        assert!(!tokens_match(b"", b"secret"));
    }

    #[test]
    fn empty_query_value_is_ignored() {
        let query = HashMap::from([("voltage".to_string(), String::new())]);
        let body = parse_body(br#"{"voltage": 54}"#);
        assert_eq!(field(&query, &body, "voltage"), Some(json!(54)));
    }
}
