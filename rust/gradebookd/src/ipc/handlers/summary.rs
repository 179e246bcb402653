use crate::calc::{self, ClassExtremes, LearnerTotal};
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

use super::learners;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMiss {
    NoLearners,
    NoResults,
    NoTermEntries,
}

impl SummaryMiss {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryMiss::NoLearners => "no_learners",
            SummaryMiss::NoResults => "no_results",
            SummaryMiss::NoTermEntries => "no_term_entries",
        }
    }

    fn message(self) -> &'static str {
        match self {
            SummaryMiss::NoLearners => "no learners found for class",
            SummaryMiss::NoResults => "no results found for session",
            SummaryMiss::NoTermEntries => "no results found for term",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub extremes: ClassExtremes,
    pub learner_count: usize,
}

/// Per-learner term totals for a class, reduced to highest and lowest.
/// Learners without an entry for the term are left out.
pub fn class_summary(
    conn: &Connection,
    class_level: &str,
    session: &str,
    term: &str,
) -> Result<Result<ClassSummary, SummaryMiss>, HandlerErr> {
    let class_learners = learners::list_learners_for_class(conn, class_level)?;
    if class_learners.is_empty() {
        return Ok(Err(SummaryMiss::NoLearners));
    }

    let mut stmt = conn.prepare(
        "SELECT r.learner_id, r.term, SUM(r.total)
         FROM result_subjects r
         JOIN learners l ON l.id = r.learner_id
         WHERE l.class_level = ? AND r.session = ?
         GROUP BY r.learner_id, r.term",
    )?;
    let rows = stmt
        .query_map((class_level, session), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, f64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    if rows.is_empty() {
        return Ok(Err(SummaryMiss::NoResults));
    }

    let term_totals: HashMap<String, f64> = rows
        .into_iter()
        .filter(|(_, t, _)| t == term)
        .map(|(learner_id, _, total)| (learner_id, total))
        .collect();

    let totals: Vec<LearnerTotal> = class_learners
        .into_iter()
        .filter_map(|l| {
            term_totals.get(&l.id).map(|total| LearnerTotal {
                learner_id: l.id,
                full_name: l.full_name,
                total: *total,
            })
        })
        .collect();

    match calc::class_extremes(&totals) {
        Some(extremes) => Ok(Ok(ClassSummary {
            extremes,
            learner_count: totals.len(),
        })),
        None => Ok(Err(SummaryMiss::NoTermEntries)),
    }
}

fn summary_class_extremes(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_level = required_str(params, "classLevel")?;
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;

    match class_summary(conn, &class_level, &session, &term)? {
        Ok(summary) => Ok(json!({
            "classLevel": class_level,
            "session": session,
            "term": term,
            "highest": summary.extremes.highest,
            "lowest": summary.extremes.lowest,
            "learnerCount": summary.learner_count
        })),
        Err(miss) => Err(HandlerErr::not_found(miss.message()).with_details(json!({
            "reason": miss.as_str(),
            "classLevel": class_level,
            "session": session,
            "term": term
        }))),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "summary.classExtremes" => Some(with_conn(state, req, summary_class_extremes)),
        _ => None,
    }
}
