use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{optional_bool, optional_str, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicLearner {
    pub id: String,
    pub full_name: String,
    pub class_level: String,
    pub sort_order: i64,
    pub active: bool,
}

fn learner_from_row(r: &Row<'_>) -> rusqlite::Result<BasicLearner> {
    Ok(BasicLearner {
        id: r.get(0)?,
        full_name: r.get(1)?,
        class_level: r.get(2)?,
        sort_order: r.get(3)?,
        active: r.get::<_, i64>(4)? != 0,
    })
}

pub fn find_learner(conn: &Connection, learner_id: &str) -> Result<Option<BasicLearner>, HandlerErr> {
    Ok(conn
        .query_row(
            "SELECT id, full_name, class_level, sort_order, active FROM learners WHERE id = ?",
            [learner_id],
            learner_from_row,
        )
        .optional()?)
}

pub fn require_learner(conn: &Connection, learner_id: &str) -> Result<BasicLearner, HandlerErr> {
    find_learner(conn, learner_id)?.ok_or_else(|| {
        HandlerErr::not_found("learner not found").with_details(json!({ "learnerId": learner_id }))
    })
}

/// Active learners of a class in directory order. This is the roster every
/// class-scoped read and write works against.
pub fn list_learners_for_class(
    conn: &Connection,
    class_level: &str,
) -> Result<Vec<BasicLearner>, HandlerErr> {
    let mut stmt = conn.prepare(
        "SELECT id, full_name, class_level, sort_order, active
         FROM learners
         WHERE class_level = ? AND active = 1
         ORDER BY sort_order, rowid",
    )?;
    let roster = stmt
        .query_map([class_level], learner_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(roster)
}

fn learners_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let full_name = required_str(params, "fullName")?;
    let class_level = required_str(params, "classLevel")?;
    let active = optional_bool(params, "active")?.unwrap_or(true);

    let learner_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO learners(id, full_name, class_level, active, sort_order)
         VALUES(?, ?, ?, ?,
           COALESCE((SELECT MAX(sort_order) + 1 FROM learners WHERE class_level = ?), 0))",
        (&learner_id, &full_name, &class_level, active as i64, &class_level),
    )
    .map_err(HandlerErr::update("learners"))?;
    info!(learner_id = %learner_id, class_level = %class_level, "learner created");

    Ok(json!({
        "learnerId": learner_id,
        "fullName": full_name,
        "classLevel": class_level,
        "active": active
    }))
}

fn learners_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_level = optional_str(params, "classLevel");
    // Inactive learners stay in the directory listing.
    let mut stmt = conn.prepare(
        "SELECT id, full_name, class_level, sort_order, active
         FROM learners
         WHERE ?1 IS NULL OR class_level = ?1
         ORDER BY class_level, sort_order, rowid",
    )?;
    let learners = stmt
        .query_map([class_level], learner_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(json!({ "learners": learners }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "learners.create" => Some(with_conn(state, req, learners_create)),
        "learners.list" => Some(with_conn(state, req, learners_list)),
        _ => None,
    }
}
