#![doc(html_root_url = "https://docs.rs/hbskit/0.1.0")]
//! # hbskit
//!
//! [Handlebars](https://handlebarsjs.com/) templating for Rust, with a
//! concurrent compile cache, helpers written in [rhai](https://rhai.rs)
//! and an emitter that turns compiled templates into snippets for the
//! JavaScript Handlebars runtime.
//!
//! ## Getting started
//!
//! ```
//! use hbskit::Handlebars;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reg = Handlebars::new();
//! // render without registering
//! assert_eq!(
//!     reg.render_template("Hello {{name}}", &json!({"name": "foo"}))?,
//!     "Hello foo"
//! );
//!
//! // register template using given name
//! reg.register_template_string("tpl_1", "Good afternoon, {{name}}")?;
//! assert_eq!(reg.render("tpl_1", &json!({"name": "foo"}))?, "Good afternoon, foo");
//! # Ok(())
//! # }
//! ```
//!
//! ## Template syntax
//!
//! * `{{path}}` and `{{{path}}}` (or `{{&path}}`) write escaped and raw values
//! * `{{#name}}...{{else}}...{{/name}}` blocks, `{{^name}}` inverted sections
//! * `{{> partial}}`, `{{#> layout}}default{{/layout}}` and `{{> @partial-block}}`
//! * `{{*decorator}}` and `{{#*inline "name"}}...{{/inline}}`
//! * `(helper arg)` sub-expressions and `key=value` hash arguments
//! * `{{! comment }}`, `{{!-- comment --}}`, `\{{escaped}}`
//! * `{{{{raw}}}}...{{{{/raw}}}}` raw blocks
//! * `{{=<% %>=}}` switches delimiters for the rest of the template
//! * `{{~tag~}}` trims adjacent whitespace
//!
//! Paths support `this`, `./`, `../` ascension, `@root`, `@index`, `@key`,
//! `@first`, `@last` and `[segment literal]` notation.
//!
//! ## Helpers
//!
//! Built in: `if`, `unless`, `each`, `with`, `lookup`, `raw`, `log`,
//! `eq`, `ne`, `gt`, `gte`, `lt`, `lte`, `and`, `or`, `not`, `len`,
//! `i18n` and `precompile`. Custom helpers implement [`HelperDef`], are bare
//! functions, come from [`handlebars_helper!`] or are rhai scripts
//! registered with `Registry::register_script_helper`.
//!
//! ## Escaping
//!
//! Values written by `{{ }}` go through the registry escape function,
//! [`html_escape`] by default. [`ScopedJson::Safe`] values are written as
//! they are.
//!
//! ## Portable output
//!
//! [`precompile::emit`] produces a JavaScript snippet that registers the
//! template with the Handlebars runtime, in one of four envelope
//! revisions.
//!
#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate maplit;

pub use self::block::{BlockContext, BlockParams};
pub use self::cache::{CacheKey, CachePolicy, ConcurrentTemplateCache, NoCache, TemplateCache};
pub use self::compiler::KnownNames;
pub use self::context::Context;
pub use self::decorators::{DecoratorDef, DecoratorResult};
#[cfg(feature = "script_helper")]
pub use self::error::ScriptError;
pub use self::error::{RenderError, RenderErrorReason, TemplateError, TemplateErrorReason};
pub use self::helpers::{HelperDef, HelperResult};
pub use self::i18n::{MessageCatalog, MessageSource};
pub use self::json::path::Path;
pub use self::json::value::{to_json, JsonRender, JsonTruthy, PathAndJson, ScopedJson};
pub use self::output::{Output, StringOutput, WriteOutput};
pub use self::precompile::{EmitError, EmitOptions, Revision, Wrapper};
pub use self::registry::{html_escape, no_escape, EscapeFn, Registry as Handlebars, Registry};
pub use self::render::{Decorator, Evaluable, Helper, RenderContext, Renderable};
pub use self::template::{Delimiters, Template};

/// The JSON type data is rendered against.
pub use serde_json::Value as JsonValue;

#[macro_use]
mod macros;
mod block;
pub mod cache;
pub mod compiler;
mod context;
mod decorators;
mod error;
mod helpers;
pub mod i18n;
mod json {
    pub mod path;
    pub mod value;
}
mod output;
pub mod parser;
mod partial;
pub mod precompile;
mod registry;
mod render;
mod support;
pub mod template;
