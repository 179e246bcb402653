use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One-decimal rounding used for every derived percentage:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreField {
    Ca1,
    Ca2,
    HomeFun,
    Project,
    Exams,
}

impl ScoreField {
    pub const ALL: [ScoreField; 5] = [
        ScoreField::Ca1,
        ScoreField::Ca2,
        ScoreField::HomeFun,
        ScoreField::Project,
        ScoreField::Exams,
    ];

    /// Wire name of the field in request params and responses.
    pub fn key(self) -> &'static str {
        match self {
            ScoreField::Ca1 => "ca1",
            ScoreField::Ca2 => "ca2",
            ScoreField::HomeFun => "hf",
            ScoreField::Project => "project",
            ScoreField::Exams => "exams",
        }
    }

    pub fn max(self) -> f64 {
        match self {
            ScoreField::Ca1 | ScoreField::Ca2 => 15.0,
            ScoreField::HomeFun | ScoreField::Project => 5.0,
            ScoreField::Exams => 60.0,
        }
    }
}

/// Stored component scores of one subject entry. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub ca1: Option<f64>,
    pub ca2: Option<f64>,
    pub hf: Option<f64>,
    pub project: Option<f64>,
    pub exams: Option<f64>,
}

impl ScoreComponents {
    pub fn get(&self, field: ScoreField) -> Option<f64> {
        match field {
            ScoreField::Ca1 => self.ca1,
            ScoreField::Ca2 => self.ca2,
            ScoreField::HomeFun => self.hf,
            ScoreField::Project => self.project,
            ScoreField::Exams => self.exams,
        }
    }

    fn slot_mut(&mut self, field: ScoreField) -> &mut Option<f64> {
        match field {
            ScoreField::Ca1 => &mut self.ca1,
            ScoreField::Ca2 => &mut self.ca2,
            ScoreField::HomeFun => &mut self.hf,
            ScoreField::Project => &mut self.project,
            ScoreField::Exams => &mut self.exams,
        }
    }

    /// Sum of all components, unset fields count as 0.
    pub fn total(&self) -> f64 {
        ScoreField::ALL
            .iter()
            .map(|f| self.get(*f).unwrap_or(0.0))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    Keep,
    Set(f64),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorePatch {
    pub ca1: FieldUpdate,
    pub ca2: FieldUpdate,
    pub hf: FieldUpdate,
    pub project: FieldUpdate,
    pub exams: FieldUpdate,
}

impl Default for ScorePatch {
    fn default() -> Self {
        Self {
            ca1: FieldUpdate::Keep,
            ca2: FieldUpdate::Keep,
            hf: FieldUpdate::Keep,
            project: FieldUpdate::Keep,
            exams: FieldUpdate::Keep,
        }
    }
}

impl ScorePatch {
    pub fn get(&self, field: ScoreField) -> FieldUpdate {
        match field {
            ScoreField::Ca1 => self.ca1,
            ScoreField::Ca2 => self.ca2,
            ScoreField::HomeFun => self.hf,
            ScoreField::Project => self.project,
            ScoreField::Exams => self.exams,
        }
    }

    pub fn set(&mut self, field: ScoreField, update: FieldUpdate) {
        match field {
            ScoreField::Ca1 => self.ca1 = update,
            ScoreField::Ca2 => self.ca2 = update,
            ScoreField::HomeFun => self.hf = update,
            ScoreField::Project => self.project = update,
            ScoreField::Exams => self.exams = update,
        }
    }

    /// Reads every score field out of a request's params object.
    pub fn from_params(params: &serde_json::Value, force_clear: bool) -> Result<Self, CalcError> {
        let mut patch = ScorePatch::default();
        for field in ScoreField::ALL {
            let update = parse_field_update(field, params.get(field.key()), force_clear)?;
            patch.set(field, update);
        }
        Ok(patch)
    }
}

/// Present and non-empty overwrites; explicit null clears only when forced;
/// everything else keeps the stored value.
pub fn parse_field_update(
    field: ScoreField,
    raw: Option<&serde_json::Value>,
    force_clear: bool,
) -> Result<FieldUpdate, CalcError> {
    let Some(v) = raw else {
        return Ok(FieldUpdate::Keep);
    };
    match v {
        serde_json::Value::Null if force_clear => Ok(FieldUpdate::Clear),
        serde_json::Value::Null => Ok(FieldUpdate::Keep),
        serde_json::Value::Number(n) => n.as_f64().map(FieldUpdate::Set).ok_or_else(|| {
            CalcError::new("bad_params", format!("{} must be a number", field.key()))
        }),
        serde_json::Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(FieldUpdate::Keep);
            }
            t.parse::<f64>().map(FieldUpdate::Set).map_err(|_| {
                CalcError::new("bad_params", format!("{} must be numeric", field.key()))
                    .with_details(json!({ "field": field.key(), "value": s }))
            })
        }
        other => Err(
            CalcError::new("bad_params", format!("{} must be a number or null", field.key()))
                .with_details(json!({ "field": field.key(), "value": other })),
        ),
    }
}

pub fn validate_component(field: ScoreField, value: f64) -> Result<(), CalcError> {
    if !value.is_finite() || value < 0.0 || value > field.max() {
        return Err(CalcError::new(
            "bad_params",
            format!("{} must be between 0 and {}", field.key(), field.max()),
        )
        .with_details(json!({
            "field": field.key(),
            "value": value,
            "max": field.max()
        })));
    }
    Ok(())
}

pub fn apply_patch(
    existing: ScoreComponents,
    patch: &ScorePatch,
) -> Result<ScoreComponents, CalcError> {
    let mut next = existing;
    for field in ScoreField::ALL {
        match patch.get(field) {
            FieldUpdate::Keep => {}
            FieldUpdate::Clear => *next.slot_mut(field) = None,
            FieldUpdate::Set(v) => {
                validate_component(field, v)?;
                *next.slot_mut(field) = Some(v);
            }
        }
    }
    Ok(next)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
        }
    }
}

/// Inclusive lower bounds, highest band wins.
pub fn grade_for_total(total: f64) -> Grade {
    if total >= 70.0 {
        Grade::A
    } else if total >= 60.0 {
        Grade::B
    } else if total >= 50.0 {
        Grade::C
    } else if total >= 45.0 {
        Grade::D
    } else if total >= 40.0 {
        Grade::E
    } else {
        Grade::F
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

/// Accepts `YYYY-MM-DD` or a timestamp; timestamps collapse to their UTC
/// calendar day.
pub fn parse_calendar_day(raw: &str) -> Result<NaiveDate, CalcError> {
    let t = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    Err(CalcError::new("bad_params", "date must be YYYY-MM-DD or RFC 3339")
        .with_details(json!({ "value": raw })))
}

pub fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Mon-Fri days in `[opens, ends]`. Zero when the range is inverted.
pub fn weekdays_between(opens: NaiveDate, ends: NaiveDate) -> i64 {
    if ends < opens {
        return 0;
    }
    opens
        .iter_days()
        .take_while(|d| *d <= ends)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .count() as i64
}

pub fn effective_school_days(opens: NaiveDate, ends: NaiveDate, holidays: i64) -> i64 {
    (weekdays_between(opens, ends) - holidays.max(0)).max(0)
}

pub fn attendance_percentage(present: i64, effective_days: i64) -> f64 {
    if effective_days <= 0 {
        return 0.0;
    }
    round_off_1_decimal(100.0 * present as f64 / effective_days as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerTotal {
    pub learner_id: String,
    pub full_name: String,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassExtremes {
    pub highest: LearnerTotal,
    pub lowest: LearnerTotal,
}

/// Highest and lowest per-learner totals. On ties the earliest entry in
/// `totals` wins, so callers pass learners in directory order.
pub fn class_extremes(totals: &[LearnerTotal]) -> Option<ClassExtremes> {
    let first = totals.first()?;
    let mut highest = first;
    let mut lowest = first;
    for t in &totals[1..] {
        if t.total > highest.total {
            highest = t;
        }
        if t.total < lowest.total {
            lowest = t;
        }
    }
    Some(ClassExtremes {
        highest: highest.clone(),
        lowest: lowest.clone(),
    })
}
