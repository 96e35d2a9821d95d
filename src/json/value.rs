use serde::Serialize;
use serde_json::value::{to_value, Value as Json};

use crate::json::path::Path;

pub(crate) static DEFAULT_VALUE: Json = Json::Null;

/// A JSON wrapper designed for template internal use case
///
/// * Constant: the JSON value hardcoded into template
/// * Context:  the JSON value referenced in your provided data context
/// * Derived:  the owned JSON value computed during rendering process
/// * Safe:     a pre-escaped string, never HTML-escaped on output
///
#[derive(Debug, Clone)]
pub enum ScopedJson<'rc> {
    Constant(&'rc Json),
    Derived(Json),
    Context(&'rc Json),
    Safe(Json),
    Missing,
}

impl<'rc> ScopedJson<'rc> {
    /// Wraps text that is already escaped for HTML output.
    pub fn safe<S: Into<String>>(s: S) -> ScopedJson<'rc> {
        ScopedJson::Safe(Json::String(s.into()))
    }

    /// get the JSON reference
    pub fn as_json(&self) -> &Json {
        match self {
            ScopedJson::Constant(j) => j,
            ScopedJson::Derived(ref j) => j,
            ScopedJson::Context(j) => j,
            ScopedJson::Safe(ref j) => j,
            ScopedJson::Missing => &DEFAULT_VALUE,
        }
    }

    pub fn render(&self) -> String {
        self.as_json().render()
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ScopedJson::Missing)
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, ScopedJson::Safe(_))
    }

    pub fn into_derived(self) -> ScopedJson<'rc> {
        match self {
            ScopedJson::Missing | ScopedJson::Derived(_) | ScopedJson::Safe(_) => self,
            other => ScopedJson::Derived(other.as_json().clone()),
        }
    }

    pub fn into_json(self) -> Json {
        match self {
            ScopedJson::Derived(j) | ScopedJson::Safe(j) => j,
            ScopedJson::Constant(j) | ScopedJson::Context(j) => j.clone(),
            ScopedJson::Missing => Json::Null,
        }
    }
}

impl<'rc> From<Json> for ScopedJson<'rc> {
    fn from(v: Json) -> ScopedJson<'rc> {
        ScopedJson::Derived(v)
    }
}

/// Json wrapper that holds the Json value and reference path information
///
#[derive(Debug, Clone)]
pub struct PathAndJson<'rc> {
    relative_path: Option<&'rc Path>,
    value: ScopedJson<'rc>,
}

impl<'rc> PathAndJson<'rc> {
    pub fn new(relative_path: Option<&'rc Path>, value: ScopedJson<'rc>) -> PathAndJson<'rc> {
        PathAndJson {
            relative_path,
            value,
        }
    }

    /// Returns relative path when the value is referenced
    /// If the value is from a literal, the path is `None`
    pub fn relative_path(&self) -> Option<&str> {
        self.relative_path.map(|p| p.raw())
    }

    /// Returns the value
    pub fn value(&self) -> &Json {
        self.value.as_json()
    }

    pub fn scoped(&self) -> &ScopedJson<'rc> {
        &self.value
    }

    pub fn into_scoped(self) -> ScopedJson<'rc> {
        self.value
    }

    /// Test if value is missing
    pub fn is_value_missing(&self) -> bool {
        self.value.is_missing()
    }

    pub fn render(&self) -> String {
        self.value.render()
    }
}

/// Render Json data with default format
pub trait JsonRender {
    fn render(&self) -> String;
}

pub trait JsonTruthy {
    fn is_truthy(&self, include_zero: bool) -> bool;
}

impl JsonRender for Json {
    fn render(&self) -> String {
        match *self {
            Json::String(ref s) => s.to_string(),
            Json::Bool(i) => i.to_string(),
            Json::Number(ref n) => render_number(n),
            Json::Null => "".to_owned(),
            // same text a script runtime produces when it stringifies a list
            Json::Array(ref a) => a.iter().map(|i| i.render()).collect::<Vec<_>>().join(","),
            Json::Object(_) => "[object Object]".to_owned(),
        }
    }
}

fn render_number(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => {
            format!("{}", f as i64)
        }
        _ => n.to_string(),
    }
}

pub fn to_json<T>(src: T) -> Json
where
    T: Serialize,
{
    to_value(src).unwrap_or_default()
}

pub fn as_string(src: &Json) -> Option<&str> {
    src.as_str()
}

impl JsonTruthy for Json {
    fn is_truthy(&self, include_zero: bool) -> bool {
        match *self {
            Json::Bool(ref i) => *i,
            Json::Number(ref n) => {
                if include_zero {
                    n.as_f64().map(|f| !f.is_nan()).unwrap_or(false)
                } else {
                    // there is no inifity in json/serde_json
                    n.as_f64().map(|f| f.is_normal()).unwrap_or(false)
                }
            }
            Json::Null => false,
            Json::String(ref i) => !i.is_empty(),
            Json::Array(ref i) => !i.is_empty(),
            // a mapping is truthy even when it has no keys
            Json::Object(_) => true,
        }
    }
}
