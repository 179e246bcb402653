use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{now_rfc3339, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::learners;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemarkRole {
    Teacher,
    HeadTeacher,
}

impl RemarkRole {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(RemarkRole::Teacher),
            "headteacher" | "head_teacher" => Some(RemarkRole::HeadTeacher),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            RemarkRole::Teacher => "teacher",
            RemarkRole::HeadTeacher => "headTeacher",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRemarks {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_teacher: Option<String>,
}

pub fn load_remarks(
    conn: &Connection,
    learner_id: &str,
    session: &str,
    term: &str,
) -> Result<TermRemarks, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT role, remark FROM remarks
         WHERE learner_id = ? AND session = ? AND term = ?",
    )?;
    let rows = stmt
        .query_map((learner_id, session, term), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = TermRemarks::default();
    for (role, remark) in rows {
        match RemarkRole::parse(&role) {
            Some(RemarkRole::Teacher) => out.teacher = Some(remark),
            Some(RemarkRole::HeadTeacher) => out.head_teacher = Some(remark),
            None => {}
        }
    }
    Ok(out)
}

fn remarks_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let raw_role = required_str(params, "role")?;
    let role = RemarkRole::parse(&raw_role).ok_or_else(|| {
        HandlerErr::bad_params("role must be teacher or headTeacher")
            .with_details(json!({ "role": raw_role }))
    })?;
    let remark = params
        .get("remark")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::missing("remark"))?;

    learners::require_learner(conn, &learner_id)?;

    if remark.is_empty() {
        conn.execute(
            "DELETE FROM remarks WHERE learner_id = ? AND session = ? AND term = ? AND role = ?",
            (&learner_id, &session, &term, role.as_str()),
        )
        .map_err(HandlerErr::update("remarks"))?;
    } else {
        conn.execute(
            "INSERT INTO remarks(learner_id, session, term, role, remark, updated_at)
             VALUES(?, ?, ?, ?, ?, ?)
             ON CONFLICT(learner_id, session, term, role) DO UPDATE SET
               remark = excluded.remark,
               updated_at = excluded.updated_at",
            (&learner_id, &session, &term, role.as_str(), &remark, now_rfc3339()),
        )
        .map_err(HandlerErr::update("remarks"))?;
    }
    info!(learner_id = %learner_id, role = role.as_str(), cleared = remark.is_empty(), "remark saved");

    let remarks = load_remarks(conn, &learner_id, &session, &term)?;
    Ok(json!({ "learnerId": learner_id, "remarks": remarks }))
}

fn remarks_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    learners::require_learner(conn, &learner_id)?;
    let remarks = load_remarks(conn, &learner_id, &session, &term)?;
    Ok(json!({ "learnerId": learner_id, "remarks": remarks }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "remarks.upsert" => Some(with_conn(state, req, remarks_upsert)),
        "remarks.get" => Some(with_conn(state, req, remarks_get)),
        _ => None,
    }
}
