use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;

use crate::cache::{CacheKey, CachePolicy, ConcurrentTemplateCache, TemplateCache};
use crate::compiler::{self, KnownNames};
use crate::context::Context;
use crate::decorators::{self, DecoratorDef};
use crate::error::{RenderError, RenderErrorReason, TemplateError};
use crate::helpers::{self, HelperDef};
use crate::i18n::{MessageCatalog, MessageSource};
use crate::output::{Output, StringOutput, WriteOutput};
use crate::parser;
use crate::precompile::{self, EmitOptions, Revision, Wrapper};
use crate::render::{RenderContext, Renderable};
use crate::support::str::escape_html;
use crate::template::{Delimiters, Template};

#[cfg(feature = "script_helper")]
use crate::error::ScriptError;
#[cfg(feature = "script_helper")]
use crate::helpers::scripting::{self, ScriptHelper};

/// This type represents an *escape fn*, that is a function whose purpose it is
/// to escape potentially problematic characters in a string.
///
/// An *escape fn* is represented as an `Arc` to avoid unnecessary type
/// parameters and to keep the registry cheap to clone.
pub type EscapeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// The default *escape fn* replaces the characters `&"<>'`=`
/// with the equivalent html / xml entities.
pub fn html_escape(data: &str) -> String {
    escape_html(data)
}

/// `EscapeFn` that does not change anything. Useful when using in a non-html
/// environment.
pub fn no_escape(data: &str) -> String {
    data.to_owned()
}

const DEFAULT_MAX_PARTIAL_DEPTH: usize = 32;

/// The single entry point of your Handlebars templates
///
/// It maintains compiled templates and registered helpers, partials and
/// decorators, along with the compile cache and the render settings.
///
/// Cloning is shallow: the clone shares templates, helpers and decorators
/// until one side registers something new.
#[derive(Clone)]
pub struct Registry {
    templates: Arc<HashMap<String, Template>>,

    helpers: Arc<HashMap<String, Arc<dyn HelperDef + Send + Sync>>>,
    decorators: Arc<HashMap<String, Arc<dyn DecoratorDef + Send + Sync>>>,
    known: KnownNames,
    fingerprint: u64,

    escape_fn: EscapeFn,
    cache: Arc<dyn TemplateCache>,
    delimiters: Delimiters,
    messages: Option<Arc<dyn MessageSource>>,

    strict_mode: bool,
    dev_mode: bool,
    prevent_indent: bool,
    recursive_partials: bool,
    parent_scope_lookup: bool,
    max_partial_depth: usize,

    #[cfg(feature = "script_helper")]
    script_engine: Arc<rhai::Engine>,
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlebars")
            .field("templates", &self.templates)
            .field("helpers", &self.helpers.keys())
            .field("decorators", &self.decorators.keys())
            .field("cached", &self.cache.len())
            .field("strict_mode", &self.strict_mode)
            .field("dev_mode", &self.dev_mode)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        let r = Registry {
            templates: Arc::default(),
            helpers: Arc::default(),
            decorators: Arc::default(),
            known: KnownNames::default(),
            fingerprint: KnownNames::default().fingerprint(),
            escape_fn: Arc::new(html_escape),
            cache: Arc::new(ConcurrentTemplateCache::new()),
            delimiters: Delimiters::default(),
            messages: None,
            strict_mode: false,
            dev_mode: false,
            prevent_indent: false,
            recursive_partials: false,
            parent_scope_lookup: false,
            max_partial_depth: DEFAULT_MAX_PARTIAL_DEPTH,
            #[cfg(feature = "script_helper")]
            script_engine: Arc::new(scripting::new_engine()),
        };

        r.setup_builtins()
    }

    fn setup_builtins(mut self) -> Registry {
        self.register_helper("if", Box::new(helpers::IF_HELPER));
        self.register_helper("unless", Box::new(helpers::UNLESS_HELPER));
        self.register_helper("each", Box::new(helpers::EACH_HELPER));
        self.register_helper("with", Box::new(helpers::WITH_HELPER));
        self.register_helper("lookup", Box::new(helpers::LOOKUP_HELPER));
        self.register_helper("raw", Box::new(helpers::RAW_HELPER));
        self.register_helper("log", Box::new(helpers::LOG_HELPER));
        self.register_helper("precompile", Box::new(helpers::PRECOMPILE_HELPER));
        self.register_helper("i18n", Box::new(helpers::I18N_HELPER));

        self.register_helper("eq", Box::new(helpers::helper_extras::eq));
        self.register_helper("ne", Box::new(helpers::helper_extras::ne));
        self.register_helper("gt", Box::new(helpers::helper_extras::gt));
        self.register_helper("gte", Box::new(helpers::helper_extras::gte));
        self.register_helper("lt", Box::new(helpers::helper_extras::lt));
        self.register_helper("lte", Box::new(helpers::helper_extras::lte));
        self.register_helper("and", Box::new(helpers::helper_extras::and));
        self.register_helper("or", Box::new(helpers::helper_extras::or));
        self.register_helper("not", Box::new(helpers::helper_extras::not));
        self.register_helper("len", Box::new(helpers::helper_extras::len));

        self.register_decorator("inline", Box::new(decorators::INLINE_DECORATOR));
        self
    }

    /// Enable or disable strict mode
    ///
    /// In strict mode an expression that names a missing field raises
    /// `MissingVariable` instead of rendering empty.
    pub fn set_strict_mode(&mut self, enabled: bool) {
        self.strict_mode = enabled;
    }

    /// Return strict mode state, default is false.
    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Return dev mode state, default is false
    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    /// Enable or disable dev mode
    ///
    /// In dev mode every `render_template` and `compile` call parses the
    /// source again instead of reading the compile cache.
    pub fn set_dev_mode(&mut self, enabled: bool) {
        self.dev_mode = enabled;
    }

    /// Disable automatic re-indentation of standalone partials.
    pub fn set_prevent_indent(&mut self, enable: bool) {
        self.prevent_indent = enable;
    }

    pub fn prevent_indent(&self) -> bool {
        self.prevent_indent
    }

    /// Allow a partial to include itself. The depth ceiling still applies.
    pub fn set_recursive_partials(&mut self, enable: bool) {
        self.recursive_partials = enable;
    }

    pub fn recursive_partials(&self) -> bool {
        self.recursive_partials
    }

    pub fn set_max_partial_depth(&mut self, depth: usize) {
        self.max_partial_depth = depth;
    }

    pub fn max_partial_depth(&self) -> usize {
        self.max_partial_depth
    }

    /// Resolve an unknown simple name against enclosing frames, the way
    /// Mustache does.
    pub fn set_parent_scope_lookup(&mut self, enable: bool) {
        self.parent_scope_lookup = enable;
    }

    pub fn parent_scope_lookup(&self) -> bool {
        self.parent_scope_lookup
    }

    /// Delimiters used by `register_template_string` and `compile`.
    pub fn set_delimiters(&mut self, delimiters: Delimiters) {
        self.delimiters = delimiters;
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    /// Replace the compile cache, for instance with one shared between
    /// registries or with `NoCache`.
    pub fn set_template_cache(&mut self, cache: Arc<dyn TemplateCache>) {
        self.cache = cache;
    }

    /// Start a fresh in-memory cache with the given eviction policy.
    pub fn set_cache_policy(&mut self, policy: CachePolicy) {
        self.cache = Arc::new(ConcurrentTemplateCache::with_policy(policy));
    }

    pub fn template_cache(&self) -> &dyn TemplateCache {
        self.cache.as_ref()
    }

    pub fn set_message_catalog(&mut self, catalog: MessageCatalog) {
        self.messages = Some(Arc::new(catalog));
    }

    pub fn set_message_source(&mut self, source: Arc<dyn MessageSource>) {
        self.messages = Some(source);
    }

    pub fn get_message_source(&self) -> Option<&dyn MessageSource> {
        self.messages.as_deref()
    }

    /// Names the compiler binds call sites against. Registering a helper or
    /// partial changes the fingerprint and so invalidates cached entries.
    pub fn known_names(&self) -> &KnownNames {
        &self.known
    }

    /// Hash of [`Registry::known_names`], part of every compile cache key.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn add_known(&mut self, helper: Option<&str>, partial: Option<&str>) {
        let mut changed = false;
        if let Some(h) = helper {
            changed |= self.known.helpers.insert(h.to_owned());
        }
        if let Some(p) = partial {
            changed |= self.known.partials.insert(p.to_owned());
        }
        if changed {
            self.fingerprint = self.known.fingerprint();
        }
    }

    fn forget_partials(&mut self) {
        self.known.partials = self.templates.keys().cloned().collect();
        self.fingerprint = self.known.fingerprint();
    }

    fn parse_and_compile(
        &self,
        source: &str,
        delimiters: &Delimiters,
        known: &KnownNames,
    ) -> Result<Template, TemplateError> {
        let parsed = parser::parse(source, delimiters)?;
        Ok(compiler::compile(parsed, known))
    }

    /// Compile `source` with the registry delimiters, going through the
    /// compile cache.
    pub fn compile(&self, source: &str) -> Result<Arc<Template>, TemplateError> {
        self.compile_with_delimiters(source, &self.delimiters)
    }

    pub fn compile_with_delimiters(
        &self,
        source: &str,
        delimiters: &Delimiters,
    ) -> Result<Arc<Template>, TemplateError> {
        let known = &self.known;
        if self.dev_mode {
            return Ok(Arc::new(self.parse_and_compile(source, delimiters, known)?));
        }

        let key = CacheKey::new(source, delimiters, self.fingerprint);
        if let Some(t) = self.cache.get(&key) {
            debug!("compile cache hit ({} bytes of source)", source.len());
            return Ok(t);
        }
        debug!("compile cache miss ({} bytes of source)", source.len());
        let compiled = Arc::new(self.parse_and_compile(source, delimiters, known)?);
        Ok(self.cache.put(key, compiled))
    }

    /// Register a compiled template under `name`
    pub fn register_template(&mut self, name: &str, mut tpl: Template) {
        tpl.name = Some(name.to_owned());
        Arc::make_mut(&mut self.templates).insert(name.to_owned(), tpl);
        self.add_known(None, Some(name));
    }

    /// Register a template string
    ///
    /// Returns `TemplateError` if there is syntax error on parsing the template.
    pub fn register_template_string<S>(
        &mut self,
        name: &str,
        tpl_str: S,
    ) -> Result<(), TemplateError>
    where
        S: AsRef<str>,
    {
        let mut template = self
            .parse_and_compile(tpl_str.as_ref(), &self.delimiters, &self.known)
            .map_err(|e| e.in_template(name.to_owned()))?;
        template.name = Some(name.to_owned());
        Arc::make_mut(&mut self.templates).insert(name.to_owned(), template);
        self.add_known(None, Some(name));
        Ok(())
    }

    /// Register a partial string
    ///
    /// A named partial will be added to the registry. It will overwrite template with
    /// same name. Currently a registered partial is just identical to a template.
    pub fn register_partial<S>(&mut self, name: &str, partial_str: S) -> Result<(), TemplateError>
    where
        S: AsRef<str>,
    {
        self.register_template_string(name, partial_str)
    }

    /// Remove a template from the registry
    pub fn unregister_template(&mut self, name: &str) {
        if Arc::make_mut(&mut self.templates).remove(name).is_some() {
            self.forget_partials();
        }
    }

    /// Register a helper
    pub fn register_helper(&mut self, name: &str, def: Box<dyn HelperDef + Send + Sync>) {
        Arc::make_mut(&mut self.helpers).insert(name.to_owned(), def.into());
        self.add_known(Some(name), None);
    }

    /// Register a [rhai](https://docs.rs/rhai/) script as handlebars helper
    ///
    /// The script runs with `context`, `params`, `hash` and `options` in
    /// scope, and its final value is the helper result.
    ///
    /// ```
    /// use hbskit::Handlebars;
    /// use serde_json::json;
    ///
    /// let mut hbs = Handlebars::new();
    /// hbs.register_script_helper("plus", "params[0] + params[1]").unwrap();
    /// assert_eq!(hbs.render_template("{{plus 1 2}}", &json!({})).unwrap(), "3");
    /// ```
    #[cfg(feature = "script_helper")]
    pub fn register_script_helper(&mut self, name: &str, script: &str) -> Result<(), ScriptError> {
        let helper = ScriptHelper::body(self.script_engine.clone(), script)?;
        self.register_helper(name, Box::new(helper));
        Ok(())
    }

    /// Register every `fn name(context, options)` of a script as a helper
    /// and return their names.
    #[cfg(feature = "script_helper")]
    pub fn register_script_helpers(&mut self, script: &str) -> Result<Vec<String>, ScriptError> {
        let helpers = ScriptHelper::functions(self.script_engine.clone(), script)?;
        let mut names = Vec::with_capacity(helpers.len());
        for (name, helper) in helpers {
            self.register_helper(&name, Box::new(helper));
            names.push(name);
        }
        Ok(names)
    }

    /// Register a decorator
    pub fn register_decorator(&mut self, name: &str, def: Box<dyn DecoratorDef + Send + Sync>) {
        Arc::make_mut(&mut self.decorators).insert(name.to_owned(), def.into());
    }

    /// Register a new *escape fn* to be used from now on by this registry.
    pub fn register_escape_fn<F: 'static + Fn(&str) -> String + Send + Sync>(
        &mut self,
        escape_fn: F,
    ) {
        self.escape_fn = Arc::new(escape_fn);
    }

    /// Restore the default *escape fn*.
    pub fn unregister_escape_fn(&mut self) {
        self.escape_fn = Arc::new(html_escape);
    }

    /// Get a reference to the current *escape fn*.
    pub fn get_escape_fn(&self) -> &dyn Fn(&str) -> String {
        self.escape_fn.as_ref()
    }

    /// Return `true` if a template is registered for the given name
    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Return a registered template,
    pub fn get_template(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Return a registered helper
    pub fn get_helper(&self, name: &str) -> Option<&Arc<dyn HelperDef + Send + Sync>> {
        self.helpers.get(name)
    }

    #[inline]
    pub(crate) fn has_helper(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    /// Return a registered decorator
    pub fn get_decorator(&self, name: &str) -> Option<&Arc<dyn DecoratorDef + Send + Sync>> {
        self.decorators.get(name)
    }

    /// Return all templates registered
    pub fn get_templates(&self) -> &HashMap<String, Template> {
        &self.templates
    }

    /// Unregister all templates
    pub fn clear_templates(&mut self) {
        Arc::make_mut(&mut self.templates).clear();
        self.forget_partials();
        self.cache.clear();
    }

    fn render_to_output<O>(
        &self,
        name: &str,
        ctx: &Context,
        output: &mut O,
    ) -> Result<(), RenderError>
    where
        O: Output,
    {
        let template = self
            .get_template(name)
            .ok_or_else(|| RenderErrorReason::TemplateNotFound(name.to_owned()))?;
        self.render_resolved(template, ctx, output)
    }

    fn render_resolved<O>(
        &self,
        template: &Template,
        ctx: &Context,
        output: &mut O,
    ) -> Result<(), RenderError>
    where
        O: Output,
    {
        let mut render_context = RenderContext::new(template.name.as_ref());
        template.render(self, ctx, &mut render_context, output)
    }

    /// Render a registered template with some data into a string
    ///
    /// * `name` is the template name you registered previously
    /// * `data` is the data that implements `serde::Serialize`
    ///
    /// Returns rendered string or a struct with error information
    pub fn render<T>(&self, name: &str, data: &T) -> Result<String, RenderError>
    where
        T: Serialize,
    {
        let mut output = StringOutput::new();
        let ctx = Context::wraps(data)?;
        self.render_to_output(name, &ctx, &mut output)?;
        output.into_string().map_err(RenderError::from)
    }

    /// Render a registered template with reused context
    pub fn render_with_context(&self, name: &str, ctx: &Context) -> Result<String, RenderError> {
        let mut output = StringOutput::new();
        self.render_to_output(name, ctx, &mut output)?;
        output.into_string().map_err(RenderError::from)
    }

    /// Render a registered template and write data to the `std::io::Write`
    pub fn render_to_write<T, W>(&self, name: &str, data: &T, writer: W) -> Result<(), RenderError>
    where
        T: Serialize,
        W: Write,
    {
        let mut output = WriteOutput::new(writer);
        let ctx = Context::wraps(data)?;
        self.render_to_output(name, &ctx, &mut output)
    }

    /// Render a template string using current registry without registering it
    ///
    /// The compiled form is kept in the compile cache, keyed by the source,
    /// the delimiters and the registry fingerprint.
    pub fn render_template<T>(&self, template_string: &str, data: &T) -> Result<String, RenderError>
    where
        T: Serialize,
    {
        let ctx = Context::wraps(data)?;
        self.render_template_with_context(template_string, &ctx)
    }

    /// Render a template string using reusable context data
    pub fn render_template_with_context(
        &self,
        template_string: &str,
        ctx: &Context,
    ) -> Result<String, RenderError> {
        let tpl = self.compile(template_string)?;
        let mut out = StringOutput::new();
        self.render_resolved(&tpl, ctx, &mut out)?;
        out.into_string().map_err(RenderError::from)
    }

    /// Render a template string using current registry without registering it
    pub fn render_template_to_write<T, W>(
        &self,
        template_string: &str,
        data: &T,
        writer: W,
    ) -> Result<(), RenderError>
    where
        T: Serialize,
        W: Write,
    {
        let tpl = self.compile(template_string)?;
        let ctx = Context::wraps(data)?;
        let mut out = WriteOutput::new(writer);
        self.render_resolved(&tpl, &ctx, &mut out)
    }

    fn emit_options(&self, revision: Revision, wrapper: Wrapper) -> EmitOptions {
        EmitOptions {
            revision,
            wrapper,
            parent_scope_lookup: self.parent_scope_lookup,
            prevent_indent: self.prevent_indent,
        }
    }

    /// Emit a registered template as a JavaScript snippet for the external
    /// Handlebars runtime.
    pub fn precompile(
        &self,
        name: &str,
        revision: Revision,
        wrapper: Wrapper,
    ) -> Result<String, RenderError> {
        let template = self
            .get_template(name)
            .ok_or_else(|| RenderErrorReason::TemplateNotFound(name.to_owned()))?;
        precompile::emit_with(name, template, &self.emit_options(revision, wrapper))
            .map_err(|e| RenderErrorReason::EmitError(e.to_string()).into())
    }

    /// Emit every registered template, ordered by name, into one unit.
    pub fn precompile_all(&self, revision: Revision, wrapper: Wrapper) -> Result<String, RenderError> {
        let mut names: Vec<&String> = self.templates.keys().collect();
        names.sort();
        let templates = names
            .into_iter()
            .filter_map(|n| self.templates.get(n).map(|t| (n.as_str(), t)));
        precompile::emit_bundle(templates, &self.emit_options(revision, wrapper))
            .map_err(|e| RenderErrorReason::EmitError(e.to_string()).into())
    }
}
