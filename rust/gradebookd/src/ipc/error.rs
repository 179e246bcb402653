use crate::calc::CalcError;
use serde_json::json;

/// Success envelope: payload fields sit next to `id` and `success`.
pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    let mut resp = json!({
        "id": id,
        "success": true,
    });
    match result {
        serde_json::Value::Object(fields) => {
            for (k, v) in fields {
                resp[k] = v;
            }
        }
        serde_json::Value::Null => {}
        other => resp["result"] = other,
    }
    resp
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut resp = json!({
        "id": id,
        "success": false,
        "error": message.into(),
        "code": code,
    });
    if let Some(d) = details {
        resp["details"] = d;
    }
    resp
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerErr {
    #[error("{message}")]
    BadParams {
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<serde_json::Value>,
    },
    #[error("select a workspace first")]
    NoWorkspace,
    #[error(transparent)]
    Query(#[from] rusqlite::Error),
    #[error("{source}")]
    Update {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl HandlerErr {
    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::BadParams {
            message: message.into(),
            details: None,
        }
    }

    pub fn missing(key: &str) -> Self {
        Self::bad_params(format!("missing {}", key))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr::NotFound {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(self, details: serde_json::Value) -> Self {
        match self {
            HandlerErr::BadParams { message, .. } => HandlerErr::BadParams {
                message,
                details: Some(details),
            },
            HandlerErr::NotFound { message, .. } => HandlerErr::NotFound {
                message,
                details: Some(details),
            },
            other => other,
        }
    }

    /// Maps a failed write onto `db_update_failed` with the table name.
    pub fn update(table: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| HandlerErr::Update { table, source }
    }

    pub fn code(&self) -> &'static str {
        match self {
            HandlerErr::BadParams { .. } => "bad_params",
            HandlerErr::NotFound { .. } => "not_found",
            HandlerErr::NoWorkspace => "no_workspace",
            HandlerErr::Query(_) => "db_query_failed",
            HandlerErr::Update { .. } => "db_update_failed",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            HandlerErr::BadParams { details, .. } | HandlerErr::NotFound { details, .. } => {
                details.clone()
            }
            HandlerErr::Update { table, .. } => Some(json!({ "table": table })),
            _ => None,
        }
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code(), self.to_string(), self.details())
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        match e.code.as_str() {
            "not_found" => HandlerErr::NotFound {
                message: e.message,
                details: e.details,
            },
            _ => HandlerErr::BadParams {
                message: e.message,
                details: e.details,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_flattens_object_payloads() {
        let v = ok("7", json!({ "total": 95.0, "grade": "A" }));
        assert_eq!(v["id"], "7");
        assert_eq!(v["success"], true);
        assert_eq!(v["total"], 95.0);
        assert_eq!(v["grade"], "A");
    }

    #[test]
    fn handler_err_carries_code_and_details() {
        let v = HandlerErr::not_found("class has no learners")
            .with_details(json!({ "reason": "no_learners" }))
            .response("9");
        assert_eq!(v["success"], false);
        assert_eq!(v["code"], "not_found");
        assert_eq!(v["error"], "class has no learners");
        assert_eq!(v["details"]["reason"], "no_learners");
    }

    #[test]
    fn calc_errors_become_bad_params() {
        let e: HandlerErr = CalcError::new("bad_params", "ca1 must be between 0 and 15").into();
        assert_eq!(e.code(), "bad_params");
    }
}
