//! Message catalogs for the `i18n` helper.
//!
//! A catalog maps locale to a flat table of format strings. Format strings
//! refer to positional arguments as `{{arg0}}`, `{{arg1}}` and so on.
use std::collections::BTreeMap;

use serde_json::value::Value as Json;

use crate::error::{RenderError, RenderErrorReason};

/// Supplies format strings by locale.
pub trait MessageSource: Send + Sync {
    /// The format string stored for `key` under exactly `locale`.
    fn message(&self, locale: &str, key: &str) -> Option<&str>;

    fn default_locale(&self) -> &str;

    /// Look `key` up for `locale`, falling back from `lang_COUNTRY` to
    /// `lang` and then to the default locale. A missing key formats as the
    /// key itself.
    fn format(&self, locale: Option<&str>, key: &str, args: &[String]) -> String {
        let found = fallback_chain(locale, self.default_locale())
            .iter()
            .find_map(|l| self.message(l, key));
        match found {
            Some(f) => substitute(f, args),
            None => {
                debug!("no message {key:?} for locale {locale:?}");
                key.to_owned()
            }
        }
    }
}

/// In-memory catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCatalog {
    default_locale: String,
    messages: BTreeMap<String, BTreeMap<String, String>>,
}

impl MessageCatalog {
    pub fn new(default_locale: &str) -> MessageCatalog {
        MessageCatalog {
            default_locale: normalize(default_locale),
            messages: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, locale: &str, key: &str, format: &str) -> &mut MessageCatalog {
        self.messages
            .entry(normalize(locale))
            .or_default()
            .insert(key.to_owned(), format.to_owned());
        self
    }

    pub fn extend<K, V, I>(&mut self, locale: &str, messages: I) -> &mut MessageCatalog
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let table = self.messages.entry(normalize(locale)).or_default();
        for (k, v) in messages {
            table.insert(k.into(), v.into());
        }
        self
    }

    /// Build a catalog from `{"<locale>": {"<key>": "<format>", ...}, ...}`.
    pub fn from_json(default_locale: &str, value: &Json) -> Result<MessageCatalog, RenderError> {
        let locales = value
            .as_object()
            .ok_or(RenderErrorReason::InvalidParamType("object of locales"))?;
        let mut catalog = MessageCatalog::new(default_locale);
        for (locale, table) in locales {
            let table = table
                .as_object()
                .ok_or(RenderErrorReason::InvalidParamType("object of messages"))?;
            for (key, format) in table {
                let format = format
                    .as_str()
                    .ok_or(RenderErrorReason::InvalidParamType("string"))?;
                catalog.insert(locale, key, format);
            }
        }
        Ok(catalog)
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.messages.keys().map(String::as_str)
    }
}

impl MessageSource for MessageCatalog {
    fn message(&self, locale: &str, key: &str) -> Option<&str> {
        self.messages
            .get(locale)
            .and_then(|t| t.get(key))
            .map(String::as_str)
    }

    fn default_locale(&self) -> &str {
        &self.default_locale
    }
}

/// `fr-CA` and `fr_CA` name the same locale.
fn normalize(locale: &str) -> String {
    locale.replace('-', "_")
}

fn fallback_chain(locale: Option<&str>, default: &str) -> Vec<String> {
    let mut chain = Vec::with_capacity(3);
    if let Some(l) = locale.map(normalize) {
        if let Some((lang, _)) = l.split_once('_') {
            let lang = lang.to_owned();
            chain.push(l);
            chain.push(lang);
        } else {
            chain.push(l);
        }
    }
    let default = normalize(default);
    if !chain.contains(&default) {
        chain.push(default);
    }
    chain
}

/// Replace every `{{argN}}` with the Nth argument. Placeholders without an
/// argument are kept verbatim.
fn substitute(format: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    while let Some(start) = rest.find("{{arg") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 5..];
        let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
        let arg = tail[..digits].parse::<usize>().ok().and_then(|i| args.get(i));
        match arg {
            Some(a) if digits > 0 && tail[digits..].starts_with("}}") => {
                out.push_str(a);
                rest = &tail[digits + 2..];
            }
            _ => {
                out.push_str("{{arg");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
