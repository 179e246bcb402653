use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{holidays_param, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

use super::{attendance, calendar, learners, remarks, results, summary};

/// Everything a printable report card needs for one learner and term.
/// Rendering is left to the caller.
fn report_card_model(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let learner_id = required_str(params, "learnerId")?;
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let holidays = holidays_param(params)?;

    let learner = learners::require_learner(conn, &learner_id)?;
    let subjects = results::load_term_subjects(conn, &learner_id, &session, &term)?;
    let grand_total: f64 = subjects.iter().map(|s| s.total).sum();
    let average = if subjects.is_empty() {
        0.0
    } else {
        calc::round_off_1_decimal(grand_total / subjects.len() as f64)
    };

    let presence =
        attendance::learner_presence(conn, &learner_id, &learner.class_level, &session, &term)?;
    let mut attendance_json = json!({
        "presentCount": presence.present,
        "absentCount": presence.absent,
        "daysRecorded": presence.days_recorded
    });
    if let Some(cal) = calendar::find_calendar(conn, &session, &term)? {
        let effective = cal.effective_days(holidays);
        attendance_json["effectiveDays"] = json!(effective);
        attendance_json["percentage"] = json!(calc::attendance_percentage(presence.present, effective));
    }

    let mut model = json!({
        "learner": learner,
        "session": session,
        "term": term,
        "subjects": subjects,
        "subjectCount": subjects.len(),
        "grandTotal": grand_total,
        "average": average,
        "overallGrade": calc::grade_for_total(average).as_str(),
        "attendance": attendance_json,
        "remarks": remarks::load_remarks(conn, &learner_id, &session, &term)?
    });
    if let Ok(class) = summary::class_summary(conn, &learner.class_level, &session, &term)? {
        model["classHighest"] = json!(class.extremes.highest);
        model["classLowest"] = json!(class.extremes.lowest);
        model["classSize"] = json!(class.learner_count);
    }
    Ok(model)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.reportCard" => Some(with_conn(state, req, report_card_model)),
        _ => None,
    }
}
