use crate::calc::{self, AttendanceStatus};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{holidays_param, required_day, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{calendar, learners};

#[derive(Debug, Clone, PartialEq)]
struct StatusMark {
    learner_id: String,
    status: AttendanceStatus,
    /// Position of the winning record in the request.
    index: usize,
}

/// Scope every attendance document is keyed by.
#[derive(Debug, Clone)]
struct AttendanceScope {
    class_level: String,
    session: String,
    term: String,
}

impl AttendanceScope {
    fn from_params(params: &serde_json::Value) -> Result<Self, HandlerErr> {
        Ok(Self {
            class_level: required_str(params, "classLevel")?,
            session: required_str(params, "session")?,
            term: required_str(params, "term")?,
        })
    }
}

fn parse_marks(params: &serde_json::Value) -> Result<Vec<StatusMark>, HandlerErr> {
    let Some(records) = params.get("records").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::missing("records"));
    };
    let mut marks: Vec<StatusMark> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let learner_id = rec
            .get("learnerId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params("record is missing learnerId").with_details(json!({ "index": i }))
            })?;
        let raw_status = rec.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let status = AttendanceStatus::parse(raw_status).ok_or_else(|| {
            HandlerErr::bad_params("status must be Present or Absent")
                .with_details(json!({ "index": i, "status": raw_status }))
        })?;
        // Last mark for a learner wins.
        match marks.iter_mut().find(|m| m.learner_id == learner_id) {
            Some(existing) => {
                existing.status = status;
                existing.index = i;
            }
            None => marks.push(StatusMark {
                learner_id,
                status,
                index: i,
            }),
        }
    }
    Ok(marks)
}

fn attendance_mark(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = AttendanceScope::from_params(params)?;
    let day = required_day(params, "date")?;
    let day_key = calc::day_key(day);
    let marks = parse_marks(params)?;
    let roster = learners::list_learners_for_class(conn, &scope.class_level)?;
    for mark in &marks {
        if !roster.iter().any(|l| l.id == mark.learner_id) {
            return Err(HandlerErr::bad_params("learner is not enrolled in classLevel").with_details(json!({
                "index": mark.index,
                "learnerId": mark.learner_id,
                "classLevel": scope.class_level
            })));
        }
    }

    let tx = conn.unchecked_transaction()?;
    let existing_id: Option<String> = tx
        .query_row(
            "SELECT id FROM attendance_days
             WHERE class_level = ? AND session = ? AND term = ? AND day = ?",
            (&scope.class_level, &scope.session, &scope.term, &day_key),
            |r| r.get(0),
        )
        .optional()?;
    let created = existing_id.is_none();
    let day_id = match existing_id {
        Some(id) => {
            tx.execute("DELETE FROM attendance_marks WHERE day_id = ?", [&id])
                .map_err(HandlerErr::update("attendance_marks"))?;
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO attendance_days(id, class_level, session, term, day, sort_order)
                 VALUES(?1, ?2, ?3, ?4, ?5,
                   COALESCE((SELECT MAX(sort_order) + 1 FROM attendance_days
                             WHERE class_level = ?2 AND session = ?3 AND term = ?4), 0))",
                (&id, &scope.class_level, &scope.session, &scope.term, &day_key),
            )
            .map_err(HandlerErr::update("attendance_days"))?;
            id
        }
    };
    for (i, mark) in marks.iter().enumerate() {
        tx.execute(
            "INSERT INTO attendance_marks(day_id, learner_id, status, sort_order)
             VALUES(?, ?, ?, ?)",
            (&day_id, &mark.learner_id, mark.status.as_str(), i as i64),
        )
        .map_err(HandlerErr::update("attendance_marks"))?;
    }
    tx.commit().map_err(HandlerErr::update("attendance_marks"))?;
    info!(
        class_level = %scope.class_level,
        session = %scope.session,
        term = %scope.term,
        day = %day_key,
        marks = marks.len(),
        created,
        "attendance day saved"
    );

    Ok(json!({
        "date": day_key,
        "created": created,
        "markCount": marks.len()
    }))
}

fn attendance_range(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let scope = AttendanceScope::from_params(params)?;
    let start = required_day(params, "startDate")?;
    let end = required_day(params, "endDate")?;
    if end < start {
        return Err(HandlerErr::bad_params("endDate must not be before startDate").with_details(
            json!({ "startDate": calc::day_key(start), "endDate": calc::day_key(end) }),
        ));
    }

    let mut stmt = conn.prepare(
        "SELECT d.day, m.learner_id, l.full_name, m.status
         FROM attendance_days d
         LEFT JOIN attendance_marks m ON m.day_id = d.id
         LEFT JOIN learners l ON l.id = m.learner_id
         WHERE d.class_level = ? AND d.session = ? AND d.term = ?
           AND d.day >= ? AND d.day <= ?
         ORDER BY d.day, m.sort_order",
    )?;
    let rows = stmt
        .query_map(
            (
                &scope.class_level,
                &scope.session,
                &scope.term,
                calc::day_key(start),
                calc::day_key(end),
            ),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = serde_json::Map::new();
    for (day, learner_id, full_name, status) in rows {
        let entry = records
            .entry(day)
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        let Some(learner_id) = learner_id else {
            continue;
        };
        if let serde_json::Value::Array(list) = entry {
            list.push(json!({
                "learnerId": learner_id,
                "fullName": full_name,
                "status": status
            }));
        }
    }
    Ok(json!({ "records": records }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceCounts {
    pub present: i64,
    pub absent: i64,
    pub days_recorded: i64,
}

/// Counts a learner's statuses over every recorded day of the term. No date
/// bounds apply here.
pub fn learner_presence(
    conn: &Connection,
    learner_id: &str,
    class_level: &str,
    session: &str,
    term: &str,
) -> Result<PresenceCounts, HandlerErr> {
    let (present, absent): (i64, i64) = conn.query_row(
        "SELECT
           COALESCE(SUM(CASE WHEN m.status = 'Present' THEN 1 ELSE 0 END), 0),
           COALESCE(SUM(CASE WHEN m.status = 'Absent' THEN 1 ELSE 0 END), 0)
         FROM attendance_marks m
         JOIN attendance_days d ON d.id = m.day_id
         WHERE m.learner_id = ? AND d.class_level = ? AND d.session = ? AND d.term = ?",
        (learner_id, class_level, session, term),
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let days_recorded: i64 = conn.query_row(
        "SELECT COUNT(*) FROM attendance_days
         WHERE class_level = ? AND session = ? AND term = ?",
        (class_level, session, term),
        |r| r.get(0),
    )?;
    Ok(PresenceCounts {
        present,
        absent,
        days_recorded,
    })
}

fn attendance_learner_summary(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let scope = AttendanceScope::from_params(params)?;
    let holidays = holidays_param(params)?;

    learners::require_learner(conn, &learner_id)?;
    let counts = learner_presence(conn, &learner_id, &scope.class_level, &scope.session, &scope.term)?;

    let mut result = json!({
        "learnerId": learner_id,
        "presentCount": counts.present,
        "absentCount": counts.absent,
        "daysRecorded": counts.days_recorded
    });
    if let Some(cal) = calendar::find_calendar(conn, &scope.session, &scope.term)? {
        let effective = cal.effective_days(holidays);
        result["effectiveDays"] = json!(effective);
        result["percentage"] = json!(calc::attendance_percentage(counts.present, effective));
    }
    Ok(result)
}

fn attendance_effective_days(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let holidays = holidays_param(params)?;
    let cal = calendar::require_calendar(conn, &session, &term)?;

    Ok(json!({
        "termOpens": calc::day_key(cal.term_opens),
        "termEnds": calc::day_key(cal.term_ends),
        "weekdays": calc::weekdays_between(cal.term_opens, cal.term_ends),
        "holidays": holidays.max(0),
        "effectiveDays": cal.effective_days(holidays)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(with_conn(state, req, attendance_mark)),
        "attendance.range" => Some(with_conn(state, req, attendance_range)),
        "attendance.learnerSummary" => Some(with_conn(state, req, attendance_learner_summary)),
        "attendance.effectiveDays" => Some(with_conn(state, req, attendance_effective_days)),
        _ => None,
    }
}
