use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::value::{to_value, Map, Value as Json};

use crate::error::RenderError;
use crate::json::value::ScopedJson;

pub type Object = BTreeMap<String, Json>;

/// The context wrap data you render on your templates.
///
#[derive(Debug, Clone)]
pub struct Context {
    data: Json,
}

impl Context {
    /// Create a context with null data
    pub fn null() -> Context {
        Context { data: Json::Null }
    }

    /// Create a context with given data
    pub fn wraps<T: Serialize>(e: T) -> Result<Context, RenderError> {
        to_value(e)
            .map_err(RenderError::from)
            .map(|d| Context { data: d })
    }

    /// Return the Json data wrapped in context
    pub fn data(&self) -> &Json {
        &self.data
    }

    /// Return the mutable reference to Json data wrapped in context
    pub fn data_mut(&mut self) -> &mut Json {
        &mut self.data
    }
}

impl From<Json> for Context {
    fn from(data: Json) -> Context {
        Context { data }
    }
}

pub fn merge_json(base: &Json, addition: &Object) -> Json {
    let mut base_map = match base {
        Json::Object(ref m) => m.clone(),
        _ => Map::new(),
    };

    for (k, v) in addition.iter() {
        base_map.insert(k.clone(), v.clone());
    }

    Json::Object(base_map)
}

/// The ways a value can answer a path segment, tried in declaration order.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Capability<'a> {
    /// map-like values
    Keyed(&'a Map<String, Json>),
    /// sequences, for non-negative integer segments
    Indexed(&'a [Json]),
    /// computed record properties such as `length`
    Named(&'a Json),
}

impl<'a> Capability<'a> {
    fn of(value: &'a Json) -> [Option<Capability<'a>>; 3] {
        match value {
            Json::Object(m) => [Some(Capability::Keyed(m)), None, None],
            Json::Array(list) => [
                None,
                Some(Capability::Indexed(list)),
                Some(Capability::Named(value)),
            ],
            Json::String(_) => [None, None, Some(Capability::Named(value))],
            _ => [None, None, None],
        }
    }

    fn get(self, seg: &str) -> Option<Cow<'a, Json>> {
        match self {
            Capability::Keyed(m) => m.get(seg).map(Cow::Borrowed),
            Capability::Indexed(list) => seg
                .parse::<usize>()
                .ok()
                .and_then(|i| list.get(i))
                .map(Cow::Borrowed),
            Capability::Named(v) => named_property(v, seg).map(Cow::Owned),
        }
    }
}

fn named_property(value: &Json, name: &str) -> Option<Json> {
    match (value, name) {
        (Json::Array(list), "length") => Some(Json::from(list.len())),
        (Json::String(s), "length") => Some(Json::from(s.chars().count())),
        _ => None,
    }
}

/// Resolve one segment against a value. The first capability that answers
/// wins.
pub(crate) fn lookup<'a>(value: &'a Json, seg: &str) -> Option<Cow<'a, Json>> {
    Capability::of(value)
        .into_iter()
        .flatten()
        .find_map(|cap| cap.get(seg))
}

/// Walk `segs` down from `value`. Missing keys end the walk with `None`.
pub(crate) fn navigate<'a>(value: Cow<'a, Json>, segs: &[String]) -> Option<Cow<'a, Json>> {
    let mut current = value;
    for seg in segs {
        current = match current {
            Cow::Borrowed(v) => lookup(v, seg)?,
            Cow::Owned(v) => Cow::Owned(lookup(&v, seg)?.into_owned()),
        };
        trace!("resolved segment {seg:?}");
    }
    Some(current)
}

/// `navigate` for scoped values. Values borrowed from the render data stay
/// borrowed.
pub(crate) fn navigate_scoped<'rc>(
    value: &ScopedJson<'rc>,
    segs: &[String],
) -> Option<ScopedJson<'rc>> {
    match value {
        ScopedJson::Context(j) | ScopedJson::Constant(j) => {
            let j: &'rc Json = j;
            navigate(Cow::Borrowed(j), segs).map(|v| match v {
                Cow::Borrowed(b) => ScopedJson::Context(b),
                Cow::Owned(o) => ScopedJson::Derived(o),
            })
        }
        ScopedJson::Missing => None,
        other if segs.is_empty() => Some(other.clone()),
        ScopedJson::Derived(j) | ScopedJson::Safe(j) => {
            navigate(Cow::Borrowed(j), segs).map(|v| ScopedJson::Derived(v.into_owned()))
        }
    }
}
