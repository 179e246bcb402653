use crate::calc;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, warn};

pub fn required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let value = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::missing(key))?;
    if value.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(value)
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn optional_bool(params: &serde_json::Value, key: &str) -> Result<Option<bool>, HandlerErr> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_bool()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a boolean", key))),
    }
}

/// Holiday counts arrive from free-text inputs; blank means none.
pub fn holidays_param(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    match params.get("holidays") {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(0),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| HandlerErr::bad_params("holidays must be a whole number")),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("holidays must be a whole number")),
    }
}

pub fn required_day(params: &serde_json::Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    calc::parse_calendar_day(&raw).map_err(|e| {
        HandlerErr::from(e).with_details(serde_json::json!({ "field": key, "value": raw }))
    })
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Runs a handler body against the open workspace and wraps the outcome in
/// the response envelope.
pub fn with_conn<F>(state: &mut AppState, req: &Request, body: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return HandlerErr::NoWorkspace.response(&req.id);
    };
    match body(conn, &req.params) {
        Ok(result) => {
            debug!(id = %req.id, method = %req.method, "request handled");
            ok(&req.id, result)
        }
        Err(e) => {
            warn!(id = %req.id, method = %req.method, code = e.code(), error = %e, "request failed");
            e.response(&req.id)
        }
    }
}
