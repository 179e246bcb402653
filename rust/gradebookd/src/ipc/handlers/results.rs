use crate::calc::{self, ScoreComponents, ScorePatch};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{now_rfc3339, optional_bool, optional_str, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::learners;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEntry {
    pub subject: String,
    pub code: Option<String>,
    pub ca1: Option<f64>,
    pub ca2: Option<f64>,
    pub hf: Option<f64>,
    pub project: Option<f64>,
    pub exams: Option<f64>,
    pub total: f64,
    pub grade: String,
}

impl SubjectEntry {
    fn components(&self) -> ScoreComponents {
        ScoreComponents {
            ca1: self.ca1,
            ca2: self.ca2,
            hf: self.hf,
            project: self.project,
            exams: self.exams,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermEntry {
    pub term: String,
    pub subjects: Vec<SubjectEntry>,
}

const SUBJECT_COLUMNS: &str = "subject, code, ca1, ca2, hf, project, exams, total, grade";

fn subject_from_row(r: &Row<'_>) -> rusqlite::Result<SubjectEntry> {
    Ok(SubjectEntry {
        subject: r.get(0)?,
        code: r.get(1)?,
        ca1: r.get(2)?,
        ca2: r.get(3)?,
        hf: r.get(4)?,
        project: r.get(5)?,
        exams: r.get(6)?,
        total: r.get(7)?,
        grade: r.get(8)?,
    })
}

fn find_subject(
    conn: &Connection,
    learner_id: &str,
    session: &str,
    term: &str,
    subject: &str,
) -> Result<Option<SubjectEntry>, HandlerErr> {
    let sql = format!(
        "SELECT {SUBJECT_COLUMNS} FROM result_subjects
         WHERE learner_id = ? AND session = ? AND term = ? AND subject = ?"
    );
    Ok(conn
        .query_row(&sql, (learner_id, session, term, subject), subject_from_row)
        .optional()?)
}

/// Subjects of one term in insertion order.
pub fn load_term_subjects(
    conn: &Connection,
    learner_id: &str,
    session: &str,
    term: &str,
) -> Result<Vec<SubjectEntry>, HandlerErr> {
    let sql = format!(
        "SELECT {SUBJECT_COLUMNS} FROM result_subjects
         WHERE learner_id = ? AND session = ? AND term = ?
         ORDER BY sort_order"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((learner_id, session, term), subject_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The learner's result document for a session: terms in order of first
/// write, each with its subjects in insertion order.
pub fn load_result_document(
    conn: &Connection,
    learner_id: &str,
    session: &str,
) -> Result<Vec<TermEntry>, HandlerErr> {
    let sql = format!(
        "SELECT term, {SUBJECT_COLUMNS} FROM result_subjects
         WHERE learner_id = ? AND session = ?
         ORDER BY sort_order"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((learner_id, session), |r| {
            let term: String = r.get(0)?;
            let entry = SubjectEntry {
                subject: r.get(1)?,
                code: r.get(2)?,
                ca1: r.get(3)?,
                ca2: r.get(4)?,
                hf: r.get(5)?,
                project: r.get(6)?,
                exams: r.get(7)?,
                total: r.get(8)?,
                grade: r.get(9)?,
            };
            Ok((term, entry))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut terms: Vec<TermEntry> = Vec::new();
    for (term, entry) in rows {
        match terms.iter_mut().find(|t| t.term == term) {
            Some(t) => t.subjects.push(entry),
            None => terms.push(TermEntry {
                term,
                subjects: vec![entry],
            }),
        }
    }
    Ok(terms)
}

fn results_upsert_subject(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let subject = required_str(params, "subject")?;
    let code = optional_str(params, "code");
    let force_clear = optional_bool(params, "forceClear")?.unwrap_or(false);
    let patch = ScorePatch::from_params(params, force_clear)?;

    learners::require_learner(conn, &learner_id)?;

    // Read-modify-write must see a stable row.
    let tx = conn.unchecked_transaction()?;
    let existing = find_subject(&tx, &learner_id, &session, &term, &subject)?;
    let base = existing
        .as_ref()
        .map(SubjectEntry::components)
        .unwrap_or_default();
    let next = calc::apply_patch(base, &patch)?;
    let total = next.total();
    let grade = calc::grade_for_total(total).as_str();

    tx.execute(
        "INSERT INTO result_subjects(
           learner_id, session, term, subject, code,
           ca1, ca2, hf, project, exams, total, grade, sort_order, updated_at)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
           COALESCE((SELECT MAX(sort_order) + 1 FROM result_subjects
                     WHERE learner_id = ?1 AND session = ?2), 0),
           ?13)
         ON CONFLICT(learner_id, session, term, subject) DO UPDATE SET
           code = COALESCE(excluded.code, result_subjects.code),
           ca1 = excluded.ca1,
           ca2 = excluded.ca2,
           hf = excluded.hf,
           project = excluded.project,
           exams = excluded.exams,
           total = excluded.total,
           grade = excluded.grade,
           updated_at = excluded.updated_at",
        params![
            learner_id,
            session,
            term,
            subject,
            code,
            next.ca1,
            next.ca2,
            next.hf,
            next.project,
            next.exams,
            total,
            grade,
            now_rfc3339(),
        ],
    )
    .map_err(HandlerErr::update("result_subjects"))?;
    tx.commit().map_err(HandlerErr::update("result_subjects"))?;

    let created = existing.is_none();
    info!(
        learner_id = %learner_id,
        session = %session,
        term = %term,
        subject = %subject,
        total,
        grade,
        created,
        "subject score saved"
    );

    let entry = SubjectEntry {
        subject,
        code: code.or_else(|| existing.and_then(|e| e.code)),
        ca1: next.ca1,
        ca2: next.ca2,
        hf: next.hf,
        project: next.project,
        exams: next.exams,
        total,
        grade: grade.to_string(),
    };
    Ok(json!({
        "learnerId": learner_id,
        "session": session,
        "term": term,
        "created": created,
        "entry": entry
    }))
}

fn results_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let session = required_str(params, "session")?;
    let term = optional_str(params, "term");

    learners::require_learner(conn, &learner_id)?;
    let mut terms = load_result_document(conn, &learner_id, &session)?;
    if let Some(term) = term {
        terms.retain(|t| t.term == term);
    }
    Ok(json!({
        "learnerId": learner_id,
        "session": session,
        "terms": terms
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.upsertSubject" => Some(with_conn(state, req, results_upsert_subject)),
        "results.get" => Some(with_conn(state, req, results_get)),
        _ => None,
    }
}
