//! Raw search hits and detail records, and the typed view built from them.
//!
//! Records arrive as nested JSON objects whose shape varies between entries.
//! Lookups never fail: probing a missing or mistyped path yields `None`, and
//! only a record that is not an object at all is rejected.

use serde::Serialize;
use serde_json::{Map, Value};

use zivi_shared::{Language, Result, ZiviError};

/// Placeholder the service uses for "no value".
const NOT_AVAILABLE: &str = "n/a";

/// Codes of coded flags that count as "yes" (`JA`) or "exempt" (`IE`).
const TRUTHY_CODES: &[&str] = &["JA", "IE"];

/// Code marking weekend work as possible ("möglich").
const WEEKEND_WORK_CODE: &str = "M";

/// Code marking night work as possible ("ja").
const NIGHT_WORK_CODE: &str = "J";

// ---------------------------------------------------------------------------
// SearchHit
// ---------------------------------------------------------------------------

/// One element of a search-result collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SearchHit(Map<String, Value>);

impl SearchHit {
    /// Wrap a JSON value; anything but an object is a format error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ZiviError::format(format!(
                "search hit is not an object: {}",
                type_name(&other)
            ))),
        }
    }

    /// Numeric identifier used to fetch the detail record.
    pub fn id(&self) -> Result<u64> {
        self.0
            .get("id")
            .and_then(as_id)
            .ok_or_else(|| ZiviError::format("search hit has no numeric id"))
    }

    /// The underlying nested mapping.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

// ---------------------------------------------------------------------------
// DetailRecord
// ---------------------------------------------------------------------------

/// Full record of one assignment specification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetailRecord(Map<String, Value>);

impl DetailRecord {
    /// Wrap a JSON value; anything but an object is a format error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ZiviError::format(format!(
                "detail record is not an object: {}",
                type_name(&other)
            ))),
        }
    }

    /// Numeric id of the record, if present.
    pub fn id(&self) -> Option<u64> {
        self.0.get("id").and_then(as_id)
    }

    /// Follow `path` through nested objects.
    ///
    /// Returns `None` when any step is missing, `null`, or not an object.
    pub fn probe(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.0.get(*first)?;
        for key in rest {
            current = current.as_object()?.get(*key)?;
        }
        (!current.is_null()).then_some(current)
    }

    /// Scalar at `path` as display text; empty when absent or `n/a`.
    pub fn text(&self, path: &[&str]) -> String {
        self.probe(path).map(scalar_text).unwrap_or_default()
    }

    /// Join `field` of every element of the list at `path` with `, `.
    pub fn joined(&self, path: &[&str], field: &str) -> String {
        let Some(items) = self.probe(path).and_then(Value::as_array) else {
            return String::new();
        };
        items
            .iter()
            .filter_map(|item| item.as_object()?.get(field))
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Flag-like value at `path`.
    pub fn flag(&self, path: &[&str]) -> Flag {
        Flag::from_value(self.probe(path))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

// ---------------------------------------------------------------------------
// Flag
// ---------------------------------------------------------------------------

/// Boolean-like source field, resolved once at ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flag {
    /// An object carrying a `code`, e.g. `{"code": "JA"}`.
    Coded { code: Option<String> },
    /// Any other value, reduced to its truthiness.
    Plain(bool),
}

impl Flag {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self::Coded {
                code: map.get("code").map(scalar_text).filter(|c| !c.is_empty()),
            },
            Some(other) => Self::Plain(is_truthy(other)),
            None => Self::Plain(false),
        }
    }

    /// True if the flag is plain-true or carries one of `codes`.
    pub fn is_set_with(&self, codes: &[&str]) -> bool {
        match self {
            Self::Coded { code } => code.as_deref().is_some_and(|c| codes.contains(&c)),
            Self::Plain(value) => *value,
        }
    }

    /// True for plain-true values and the yes / exempt codes.
    pub fn is_set(&self) -> bool {
        self.is_set_with(TRUTHY_CODES)
    }
}

// ---------------------------------------------------------------------------
// Assignment view
// ---------------------------------------------------------------------------

/// Contact person named on an assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contact {
    pub given_name: String,
    pub family_name: String,
    pub function: String,
    pub phone_1: String,
    pub phone_2: String,
    pub email: String,
}

impl Contact {
    /// "first last", or whichever part exists.
    pub fn full_name(&self) -> String {
        full_name(&self.given_name, &self.family_name)
    }
}

/// Typed view of the fields the table and cards are built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: Option<u64>,
    pub organisation_id: String,
    pub organisation_name: String,
    pub organisation_phone: String,
    pub organisation_email: String,
    pub postal_code: String,
    /// Localized country name, `None` when the lookup misses.
    pub country: Option<String>,
    pub activities: String,
    pub min_duration_weeks: String,
    pub work_model: String,
    pub weekend_work: Flag,
    pub night_work: Flag,
    pub lodging: Flag,
    pub meals: Flag,
    pub courses: String,
    pub flagship_programme: Flag,
    pub contact: Contact,
}

impl Assignment {
    /// Extract the view from a raw record using `language` for localized text.
    pub fn from_record(record: &DetailRecord, language: Language) -> Self {
        let text_key = language.text_key();
        let country = record.text(&["eibAdresse", "land", text_key]);

        Self {
            id: record.id(),
            organisation_id: record.text(&["eibNummer"]),
            organisation_name: record.text(&["eibName"]),
            organisation_phone: record.text(&["eibTelefon"]),
            organisation_email: record.text(&["eibEmail"]),
            postal_code: record.text(&["eibAdresse", "plz"]),
            country: (!country.is_empty()).then_some(country),
            activities: record.joined(&["taetigkeitList"], "kurzbeschreibung"),
            min_duration_weeks: record.text(&["mindestdauerEinsatzInWochen"]),
            work_model: record.text(&["arbeitszeitmodell", text_key]),
            weekend_work: record.flag(&["wochenendarbeit"]),
            night_work: record.flag(&["nachtarbeit"]),
            lodging: record.flag(&["unterkunftAngeboten"]),
            meals: record.flag(&["verpflegungAngeboten"]),
            courses: record.joined(&["kursZiviList"], "code"),
            flagship_programme: record.flag(&["schwerpunktprogramm"]),
            contact: Contact {
                given_name: record.text(&["kontaktPersonVorname"]),
                family_name: record.text(&["kontaktPersonName"]),
                function: record.text(&["kontaktPersonFunktion"]),
                phone_1: record.text(&["kontaktPersonTelefon1"]),
                phone_2: record.text(&["kontaktPersonTelefon2"]),
                email: record.text(&["kontaktPersonEmail"]),
            },
        }
    }

    pub fn weekend_work_possible(&self) -> bool {
        self.weekend_work.is_set_with(&[WEEKEND_WORK_CODE])
    }

    pub fn night_work_possible(&self) -> bool {
        self.night_work.is_set_with(&[NIGHT_WORK_CODE])
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// "first last", or whichever part is non-empty.
pub(crate) fn full_name(first: &str, last: &str) -> String {
    match (first.is_empty(), last.is_empty()) {
        (false, false) => format!("{first} {last}"),
        (false, true) => first.to_string(),
        (true, false) => last.to_string(),
        (true, true) => String::new(),
    }
}

/// Render a value as cell text. Non-scalars fall back to compact JSON.
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) if s == NOT_AVAILABLE => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != NOT_AVAILABLE,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
