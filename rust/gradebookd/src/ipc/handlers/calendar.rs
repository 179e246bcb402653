use crate::calc;
use crate::ipc::error::HandlerErr;
use crate::ipc::helpers::{required_day, required_str, with_conn};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TermCalendar {
    pub term_opens: NaiveDate,
    pub term_ends: NaiveDate,
}

impl TermCalendar {
    pub fn effective_days(&self, holidays: i64) -> i64 {
        calc::effective_school_days(self.term_opens, self.term_ends, holidays)
    }
}

pub fn find_calendar(
    conn: &Connection,
    session: &str,
    term: &str,
) -> Result<Option<TermCalendar>, HandlerErr> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT term_opens, term_ends FROM term_calendars WHERE session = ? AND term = ?",
            (session, term),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((opens, ends)) = row else {
        return Ok(None);
    };
    Ok(Some(TermCalendar {
        term_opens: calc::parse_calendar_day(&opens)?,
        term_ends: calc::parse_calendar_day(&ends)?,
    }))
}

pub fn require_calendar(conn: &Connection, session: &str, term: &str) -> Result<TermCalendar, HandlerErr> {
    find_calendar(conn, session, term)?.ok_or_else(|| {
        HandlerErr::not_found("term calendar not found")
            .with_details(json!({ "session": session, "term": term }))
    })
}

fn calendar_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let opens = required_day(params, "termOpens")?;
    let ends = required_day(params, "termEnds")?;
    if ends < opens {
        return Err(HandlerErr::bad_params("termEnds must not be before termOpens").with_details(
            json!({ "termOpens": calc::day_key(opens), "termEnds": calc::day_key(ends) }),
        ));
    }

    conn.execute(
        "INSERT INTO term_calendars(session, term, term_opens, term_ends)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(session, term) DO UPDATE SET
           term_opens = excluded.term_opens,
           term_ends = excluded.term_ends",
        (&session, &term, calc::day_key(opens), calc::day_key(ends)),
    )
    .map_err(HandlerErr::update("term_calendars"))?;
    info!(session = %session, term = %term, "term calendar saved");

    Ok(json!({
        "session": session,
        "term": term,
        "termOpens": calc::day_key(opens),
        "termEnds": calc::day_key(ends),
        "weekdays": calc::weekdays_between(opens, ends)
    }))
}

fn calendar_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session = required_str(params, "session")?;
    let term = required_str(params, "term")?;
    let cal = require_calendar(conn, &session, &term)?;
    Ok(json!({
        "session": session,
        "term": term,
        "termOpens": calc::day_key(cal.term_opens),
        "termEnds": calc::day_key(cal.term_ends),
        "weekdays": calc::weekdays_between(cal.term_opens, cal.term_ends)
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.upsert" => Some(with_conn(state, req, calendar_upsert)),
        "calendar.get" => Some(with_conn(state, req, calendar_get)),
        _ => None,
    }
}
