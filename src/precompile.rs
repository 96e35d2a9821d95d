//! Emits compiled templates as self-contained JavaScript snippets for the
//! external Handlebars runtime.
//!
//! Four envelope revisions are supported. `V1` is the closure form with
//! `this.compilerInfo`, later revisions describe the template with a
//! declarative object. Templates registered by `V1` and `V2` snippets are
//! keyed `<name>.hbs`, `V3` and `V4` use the bare name.
//!
//! ```
//! use hbskit::precompile::{emit, Revision};
//! use hbskit::Template;
//!
//! let t = Template::compile("Hello {{.}}!").unwrap();
//! let js = emit("hello", &t, Revision::V4).unwrap();
//! assert!(js.contains(r#""compiler":[8,">= 4.3.0"]"#));
//! ```
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::value::Value as Json;
use thiserror::Error;

use crate::json::path::Path;
use crate::template::{
    Binding, BlockNode, Call, ExpressionNode, Node, Parameter, PartialNode, Template,
};

/// Wire-format revision of the compiled-template envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Revision {
    V1,
    V2,
    V3,
    V4,
}

impl Revision {
    pub const ALL: [Revision; 4] = [Revision::V1, Revision::V2, Revision::V3, Revision::V4];

    /// The `compiler` marker the runtime checks before executing a snippet.
    pub fn compiler_info(self) -> &'static str {
        match self {
            Revision::V1 => "[4,'>= 1.0.0']",
            Revision::V2 => r#"[6,">= 2.0.0-beta.1"]"#,
            Revision::V3 => r#"[7,">= 4.0.0"]"#,
            Revision::V4 => r#"[8,">= 4.3.0"]"#,
        }
    }

    pub fn from_number(n: u64) -> Option<Revision> {
        match n {
            1 => Some(Revision::V1),
            2 => Some(Revision::V2),
            3 => Some(Revision::V3),
            4 => Some(Revision::V4),
            _ => None,
        }
    }

    fn qualified_keys(self) -> bool {
        matches!(self, Revision::V1 | Revision::V2)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            Revision::V1 => 1,
            Revision::V2 => 2,
            Revision::V3 => 3,
            Revision::V4 => 4,
        };
        write!(f, "V{n}")
    }
}

/// How the registration code is wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wrapper {
    /// `define('<name>.hbs', ['handlebars'], function(Handlebars) { ... });`
    Amd,
    /// an immediately invoked function
    #[default]
    Anonymous,
    None,
}

impl FromStr for Wrapper {
    type Err = String;

    fn from_str(s: &str) -> Result<Wrapper, String> {
        match s.to_ascii_lowercase().as_str() {
            "amd" => Ok(Wrapper::Amd),
            "anonymous" => Ok(Wrapper::Anonymous),
            "none" => Ok(Wrapper::None),
            other => Err(format!(
                "found {other:?}, expected one of: amd, anonymous, none"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    pub revision: Revision,
    pub wrapper: Wrapper,
    /// emit mustache-compatible outward lookup for simple paths
    pub parent_scope_lookup: bool,
    /// skip partial re-indentation
    pub prevent_indent: bool,
}

impl Default for EmitOptions {
    fn default() -> EmitOptions {
        EmitOptions {
            revision: Revision::V4,
            wrapper: Wrapper::default(),
            parent_scope_lookup: false,
            prevent_indent: false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum EmitError {
    #[error("{feature} cannot be expressed in portable revision {revision}")]
    Unsupported {
        feature: &'static str,
        revision: Revision,
    },
}

/// Emit `template` registered as `name`, without a wrapper.
pub fn emit(name: &str, template: &Template, revision: Revision) -> Result<String, EmitError> {
    emit_with(
        name,
        template,
        &EmitOptions {
            revision,
            wrapper: Wrapper::None,
            ..Default::default()
        },
    )
}

pub fn emit_with(
    name: &str,
    template: &Template,
    options: &EmitOptions,
) -> Result<String, EmitError> {
    let spec = template_spec(template, options)?;
    Ok(register(name, &spec, options))
}

/// Emit several templates into one output unit. Each keeps its own name.
pub fn emit_bundle<'a, I>(templates: I, options: &EmitOptions) -> Result<String, EmitError>
where
    I: IntoIterator<Item = (&'a str, &'a Template)>,
{
    let mut out = String::new();
    for (name, template) in templates {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&emit_with(name, template, options)?);
    }
    Ok(out)
}

/// The bare template function (`V1`) or description object (later
/// revisions) that `Handlebars.template` accepts.
pub fn template_spec(template: &Template, options: &EmitOptions) -> Result<String, EmitError> {
    let mut emitter = Emitter::new(options, false);
    let spec = emitter.run(template)?;
    if emitter.use_depths {
        // frame ascension needs `depths` threaded through every program
        let mut emitter = Emitter::new(options, true);
        return emitter.run(template);
    }
    Ok(spec)
}

fn register(name: &str, spec: &str, options: &EmitOptions) -> String {
    let key = if options.revision.qualified_keys() {
        js_single(&format!("{name}.hbs"))
    } else {
        js_single(name)
    };

    let body = format!(
        "  var template = Handlebars.template({spec});\n\
         \x20 var templates = Handlebars.templates = Handlebars.templates || {{}};\n\
         \x20 templates[{key}] = template;\n\
         \x20 var partials = Handlebars.partials = Handlebars.partials || {{}};\n\
         \x20 partials[{key}] = template;\n"
    );

    match options.wrapper {
        Wrapper::Amd => format!(
            "define({}, ['handlebars'], function(Handlebars) {{\n{body}  return template;\n}});\n",
            js_single(&format!("{name}.hbs"))
        ),
        Wrapper::Anonymous => format!("(function() {{\n{body}}})();\n"),
        Wrapper::None => body,
    }
}

/// A double-quoted JavaScript string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s)
        .unwrap_or_default()
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn js_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn js_literal(j: &Json) -> String {
    serde_json::to_string(j).unwrap_or_else(|_| "null".to_owned())
}

const LOOKUP_PROPERTY: &str = "lookupProperty = container.lookupProperty || function(parent, propertyName) {
        if (Object.prototype.hasOwnProperty.call(parent, propertyName)) {
          return parent[propertyName];
        }
        return undefined
    }";

/// Per-function state: temporaries and whether `lookupProperty` is used.
#[derive(Default)]
struct Frame {
    temps: usize,
    lookup: bool,
}

impl Frame {
    fn temp(&mut self) -> String {
        self.temps += 1;
        format!("stack{}", self.temps)
    }

    fn temp_names(&self) -> Vec<String> {
        (1..=self.temps).map(|i| format!("stack{i}")).collect()
    }
}

struct Emitter<'a> {
    opts: &'a EmitOptions,
    programs: Vec<String>,
    depths: bool,
    use_depths: bool,
    compat: bool,
    // variables the V1 closure declares once for all nested programs
    function_type: bool,
    escape: bool,
    self_ref: bool,
}

impl<'a> Emitter<'a> {
    fn new(opts: &'a EmitOptions, depths: bool) -> Emitter<'a> {
        Emitter {
            opts,
            programs: Vec::new(),
            depths,
            use_depths: false,
            compat: false,
            function_type: false,
            escape: false,
            self_ref: false,
        }
    }

    fn rev(&self) -> Revision {
        self.opts.revision
    }

    fn unsupported<T>(&self, feature: &'static str) -> Result<T, EmitError> {
        Err(EmitError::Unsupported {
            feature,
            revision: self.rev(),
        })
    }

    fn run(&mut self, template: &Template) -> Result<String, EmitError> {
        let mut frame = Frame::default();
        let parts = self.parts(&mut frame, template)?;

        if self.rev() == Revision::V1 {
            return Ok(self.v1_main(&frame, &parts));
        }

        let mut spec = String::from("{");
        for (i, p) in self.programs.iter().enumerate() {
            spec.push_str(&format!("\"{}\":{},", i + 1, p));
        }
        spec.push_str(&format!(
            "\"compiler\":{},\"main\":{},\"useData\":true",
            self.rev().compiler_info(),
            self.function(&frame, &parts)
        ));
        if self.depths {
            spec.push_str(",\"useDepths\":true");
        }
        if self.compat {
            spec.push_str(",\"compat\":true");
        }
        spec.push('}');
        Ok(spec)
    }

    fn parts(&mut self, f: &mut Frame, t: &Template) -> Result<Vec<String>, EmitError> {
        let mut parts = Vec::new();
        for node in &t.elements {
            match node {
                Node::Text(s) if s.is_empty() => {}
                Node::Text(s) => parts.push(js_str(s)),
                Node::Comment(_) => {}
                Node::Expression(e) => parts.push(self.expression(f, e)?),
                Node::Block(b) => parts.push(self.block(f, b)?),
                Node::Partial(p) => parts.push(self.partial(f, p)?),
                Node::PartialBlock(_) => return self.unsupported("partial blocks"),
                Node::Decorator(_) => return self.unsupported("decorators and inline partials"),
            }
        }
        Ok(parts)
    }

    fn args(&self) -> String {
        let depths = if self.depths { ",depths" } else { "" };
        match self.rev() {
            Revision::V1 => "depth0,data".to_owned(),
            Revision::V2 => format!("depth0,helpers,partials,data{depths}"),
            _ if self.depths => "container,depth0,helpers,partials,data,blockParams,depths".to_owned(),
            _ => "container,depth0,helpers,partials,data".to_owned(),
        }
    }

    /// A V2+ template function.
    fn function(&self, f: &Frame, parts: &[String]) -> String {
        let mut vars = f.temp_names();
        if f.lookup {
            vars.push(LOOKUP_PROPERTY.to_owned());
        }
        let prelude = if vars.is_empty() {
            String::new()
        } else {
            format!("    var {};\n\n", vars.join(", "))
        };
        let body = if parts.is_empty() {
            "\"\"".to_owned()
        } else {
            parts.join("\n    + ")
        };
        format!("function({}) {{\n{prelude}  return {body};\n}}", self.args())
    }

    fn v1_body(parts: &[String], vars: String) -> String {
        let mut out = format!("  var buffer = \"\"{vars};\n");
        if !parts.is_empty() {
            out.push_str(&format!("  buffer += {};\n", parts.join("\n    + ")));
        }
        out.push_str("  return buffer;\n  }");
        out
    }

    fn v1_main(&self, f: &Frame, parts: &[String]) -> String {
        let mut vars = String::new();
        for t in f.temp_names() {
            vars.push_str(&format!(", {t}"));
        }
        if self.function_type {
            vars.push_str(", functionType=\"function\"");
        }
        if self.escape {
            vars.push_str(", escapeExpression=this.escapeExpression");
        }
        if self.self_ref {
            vars.push_str(", self=this");
        }

        let mut out = format!(
            "function (Handlebars,depth0,helpers,partials,data) {{\n  this.compilerInfo = {};\n\
             helpers = this.merge(helpers, Handlebars.helpers); data = data || {{}};\n\
             \x20 var buffer = \"\"{vars};\n\n",
            Revision::V1.compiler_info()
        );
        for p in &self.programs {
            out.push_str(p);
            out.push('\n');
        }
        out.push('\n');
        if !parts.is_empty() {
            out.push_str(&format!("  buffer += {};\n", parts.join("\n    + ")));
        }
        out.push_str("  return buffer;\n  }");
        out
    }

    /// Emit `t` as a numbered program and return the reference that runs it.
    fn program_ref(&mut self, t: &Template) -> Result<String, EmitError> {
        self.programs.push(String::new());
        let n = self.programs.len();

        let mut f = Frame::default();
        let parts = self.parts(&mut f, t)?;
        let text = if self.rev() == Revision::V1 {
            let vars: String = f.temp_names().iter().map(|t| format!(", {t}")).collect();
            format!(
                "function program{n}(depth0,data) {{\n{}",
                Emitter::v1_body(&parts, vars)
            )
        } else {
            self.function(&f, &parts)
        };
        self.programs[n - 1] = text;

        let depths = if self.depths { ", depths" } else { "" };
        Ok(match self.rev() {
            Revision::V1 => {
                self.self_ref = true;
                format!("self.program({n}, program{n}, data)")
            }
            Revision::V2 => format!("this.program({n}, data{depths})"),
            _ if self.depths => format!("container.program({n}, data, 0, blockParams, depths)"),
            _ => format!("container.program({n}, data, 0)"),
        })
    }

    fn noop(&mut self) -> String {
        match self.rev() {
            Revision::V1 => {
                self.self_ref = true;
                "self.noop".to_owned()
            }
            Revision::V2 => "this.noop".to_owned(),
            _ => "container.noop".to_owned(),
        }
    }

    fn container(&self) -> &'static str {
        match self.rev() {
            Revision::V1 => "self",
            Revision::V2 => "this",
            _ => "container",
        }
    }

    /// The receiver helpers are called with.
    fn ctx(&self) -> &'static str {
        match self.rev() {
            Revision::V1 | Revision::V2 => "depth0",
            _ => "depth0 != null ? depth0 : (container.nullContext || {})",
        }
    }

    fn property(&self, f: &mut Frame, base: &str, key: &str) -> String {
        if self.rev() == Revision::V4 {
            f.lookup = true;
            format!("lookupProperty({base},{})", js_str(key))
        } else {
            format!("{base}[{}]", js_str(key))
        }
    }

    fn helper_ref(&self, f: &mut Frame, name: &str) -> String {
        self.property(f, "helpers", name)
    }

    fn hook(&self, f: &mut Frame, name: &str) -> String {
        if self.rev() == Revision::V4 {
            format!("container.hooks.{name}")
        } else {
            self.helper_ref(f, name)
        }
    }

    fn escape(&mut self, value: String) -> String {
        match self.rev() {
            Revision::V1 => {
                self.escape = true;
                format!("escapeExpression({value})")
            }
            Revision::V2 => format!("this.escapeExpression({value})"),
            _ => format!("container.escapeExpression({value})"),
        }
    }

    /// Call the value when it is a function, the way plain mustaches do.
    fn lambda(&mut self, f: &mut Frame, value: String) -> String {
        match self.rev() {
            Revision::V1 => {
                self.function_type = true;
                if value == "depth0" {
                    "(typeof depth0 === functionType ? depth0.apply(depth0) : depth0)".to_owned()
                } else {
                    let t = f.temp();
                    format!("({t} = {value}, typeof {t} === functionType ? {t}.apply(depth0) : {t})")
                }
            }
            _ => format!("{}.lambda({value}, depth0)", self.container()),
        }
    }

    fn navigate(&self, f: &mut Frame, base: String, segs: &[String]) -> String {
        if segs.is_empty() {
            return base;
        }
        let t = f.temp();
        let mut out = format!("({t} = {base}");
        for seg in segs {
            let access = self.property(f, &t, seg);
            out.push_str(&format!(", {t} = {t} != null ? {access} : {t}"));
        }
        out.push_str(&format!(", {t})"));
        out
    }

    fn path(&mut self, f: &mut Frame, path: &Path) -> Result<String, EmitError> {
        match path {
            Path::Relative {
                ups,
                segs,
                explicit_this,
                ..
            } => {
                if *ups > 0 {
                    if self.rev() == Revision::V1 {
                        return self.unsupported("parent-frame paths");
                    }
                    self.use_depths = true;
                    return Ok(self.navigate(f, format!("depths[{ups}]"), segs));
                }
                if self.opts.parent_scope_lookup && !*explicit_this && !segs.is_empty() {
                    if self.rev() == Revision::V1 {
                        return self.unsupported("parent-scope lookup");
                    }
                    self.use_depths = true;
                    self.compat = true;
                    let first = format!("{}.lookup(depths, {})", self.container(), js_str(&segs[0]));
                    return Ok(self.navigate(f, first, &segs[1..]));
                }
                Ok(self.navigate(f, "depth0".to_owned(), segs))
            }
            Path::Local { ups, name, segs, .. } => {
                if *ups > 0 {
                    return self.unsupported("parent-frame data variables");
                }
                if name == "root" && self.rev() == Revision::V1 {
                    return self.unsupported("@root");
                }
                let mut all = Vec::with_capacity(segs.len() + 1);
                all.push(name.clone());
                all.extend(segs.iter().cloned());
                Ok(self.navigate(f, "data".to_owned(), &all))
            }
        }
    }

    fn param(&mut self, f: &mut Frame, p: &Parameter) -> Result<String, EmitError> {
        match p {
            Parameter::Path(path) => self.path(f, path),
            Parameter::Literal(j) => Ok(js_literal(j)),
            Parameter::Subexpression(call) => self.call_value(f, call),
        }
    }

    fn hash(
        &mut self,
        f: &mut Frame,
        hash: &BTreeMap<String, Parameter>,
    ) -> Result<String, EmitError> {
        let mut entries = Vec::with_capacity(hash.len());
        for (k, v) in hash {
            let v = self.param(f, v)?;
            entries.push(format!("{}:{v}", js_str(k)));
        }
        Ok(format!("{{{}}}", entries.join(",")))
    }

    fn options(
        &mut self,
        f: &mut Frame,
        call: &Call,
        name: &str,
        programs: Option<(String, String)>,
    ) -> Result<String, EmitError> {
        let hash = self.hash(f, &call.hash)?;
        let mut parts = Vec::new();
        if self.rev() == Revision::V1 {
            parts.push(format!("hash:{hash}"));
            if let Some((fn_ref, inverse)) = programs {
                parts.push(format!("inverse:{inverse}"));
                parts.push(format!("fn:{fn_ref}"));
            }
            parts.push("data:data".to_owned());
        } else {
            parts.push(format!("\"name\":{}", js_str(name)));
            parts.push(format!("\"hash\":{hash}"));
            if let Some((fn_ref, inverse)) = programs {
                parts.push(format!("\"fn\":{fn_ref}"));
                parts.push(format!("\"inverse\":{inverse}"));
            }
            parts.push("\"data\":data".to_owned());
        }
        Ok(format!("{{{}}}", parts.join(",")))
    }

    /// A helper call used as a value, falling back to `helperMissing`.
    fn call_value(&mut self, f: &mut Frame, call: &Call) -> Result<String, EmitError> {
        let name = match (call.binding, call.helper_name()) {
            (Binding::Value, _) | (_, None) => return self.param(f, &call.name),
            (_, Some(name)) => name,
        };
        let h = f.temp();
        let helper = self.helper_ref(f, name);
        let missing = self.hook(f, "helperMissing");
        let mut args = vec![self.ctx().to_owned()];
        for p in &call.params {
            args.push(self.param(f, p)?);
        }
        args.push(self.options(f, call, name, None)?);
        Ok(format!(
            "({h} = {helper} || {missing}, {h}.call({}))",
            args.join(", ")
        ))
    }

    fn expression(&mut self, f: &mut Frame, e: &ExpressionNode) -> Result<String, EmitError> {
        let call = &e.call;
        let value = match (call.binding, call.helper_name()) {
            (Binding::Value, _) | (_, None) => {
                let v = self.param(f, &call.name)?;
                self.lambda(f, v)
            }
            (Binding::Deferred, Some(name)) if call.is_name_only() => {
                // a helper of that name wins over the property
                let h = f.temp();
                let helper = self.helper_ref(f, name);
                let value = self.param(f, &call.name)?;
                let opts = self.options(f, call, name, None)?;
                let function_type = if self.rev() == Revision::V1 {
                    self.function_type = true;
                    "functionType"
                } else {
                    "\"function\""
                };
                format!(
                    "({h} = {helper} || {value}, typeof {h} === {function_type} ? {h}.call({}, {opts}) : {h})",
                    self.ctx()
                )
            }
            _ => self.call_value(f, call)?,
        };

        if e.escaped {
            Ok(self.escape(value))
        } else {
            let s = f.temp();
            Ok(format!("(({s} = {value}) != null ? {s} : \"\")"))
        }
    }

    fn block(&mut self, f: &mut Frame, b: &BlockNode) -> Result<String, EmitError> {
        if b.raw {
            return self.unsupported("raw blocks");
        }
        if b.call.block_param.is_some() {
            return self.unsupported("block params");
        }

        let fn_ref = match &b.body {
            Some(t) => self.program_ref(t)?,
            None => self.noop(),
        };
        let inverse = match &b.inverse {
            Some(t) => self.program_ref(t)?,
            None => self.noop(),
        };

        let call = &b.call;
        let bhm = self.hook(f, "blockHelperMissing");
        let ctx = self.ctx();
        let expr = match (call.binding, call.helper_name()) {
            (Binding::Value, _) | (_, None) => {
                let value = self.param(f, &call.name)?;
                let opts = self.options(f, call, &call.name.name(), Some((fn_ref, inverse)))?;
                format!("{bhm}.call({ctx}, {value}, {opts})")
            }
            (_, Some(name)) => {
                let h = f.temp();
                let o = f.temp();
                let helper = self.helper_ref(f, name);
                let value = self.param(f, &call.name)?;
                let mut args = vec![ctx.to_owned()];
                for p in &call.params {
                    args.push(self.param(f, p)?);
                }
                args.push(o.clone());
                let opts = self.options(f, call, name, Some((fn_ref, inverse)))?;
                format!(
                    "({h} = {helper}, {o} = {opts}, {h} ? {h}.call({}) : {bhm}.call({ctx}, {value}, {o}))",
                    args.join(", ")
                )
            }
        };

        let s = f.temp();
        Ok(format!("(({s} = {expr}) != null ? {s} : \"\")"))
    }

    fn partial(&mut self, f: &mut Frame, p: &PartialNode) -> Result<String, EmitError> {
        let Some(name) = p.static_name() else {
            return self.unsupported("dynamic partial names");
        };
        let n = js_str(name);
        let indent = if self.opts.prevent_indent {
            None
        } else {
            p.indent.as_deref()
        };
        let context = match &p.context {
            Some(c) => self.param(f, c)?,
            None => "depth0".to_owned(),
        };

        let expr = match self.rev() {
            Revision::V1 => {
                if !p.hash.is_empty() {
                    return self.unsupported("partial hash arguments");
                }
                if indent.is_some() {
                    return self.unsupported("partial indentation");
                }
                self.self_ref = true;
                format!("self.invokePartial(partials[{n}], {n}, {context}, helpers, partials, data)")
            }
            Revision::V2 => {
                let hash = if p.hash.is_empty() {
                    "undefined".to_owned()
                } else {
                    self.hash(f, &p.hash)?
                };
                let depths = if self.depths { ", depths" } else { "" };
                format!(
                    "this.invokePartial(partials[{n}], {}, {n}, {context}, {hash}, helpers, partials, data{depths})",
                    js_str(indent.unwrap_or(""))
                )
            }
            Revision::V3 | Revision::V4 => {
                let partial = self.property(f, "partials", name);
                let hash = self.hash(f, &p.hash)?;
                let mut opts = vec![
                    format!("\"name\":{n}"),
                    format!("\"hash\":{hash}"),
                    "\"data\":data".to_owned(),
                ];
                if let Some(indent) = indent {
                    opts.push(format!("\"indent\":{}", js_str(indent)));
                }
                opts.push("\"helpers\":helpers".to_owned());
                opts.push("\"partials\":partials".to_owned());
                opts.push("\"decorators\":container.decorators".to_owned());
                format!(
                    "container.invokePartial({partial},{context},{{{}}})",
                    opts.join(",")
                )
            }
        };

        let s = f.temp();
        Ok(format!("(({s} = {expr}) != null ? {s} : \"\")"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fixture() -> Template {
        Template::compile("I'm template a.\nHello {{.}}!").unwrap()
    }

    fn amd(revision: Revision) -> EmitOptions {
        EmitOptions {
            revision,
            wrapper: Wrapper::Amd,
            ..Default::default()
        }
    }

    #[test]
    fn test_golden_revisions() {
        let t = fixture();
        let golden = [
            (Revision::V1, include_str!("../tests/fixtures/precompile/v1.js")),
            (Revision::V2, include_str!("../tests/fixtures/precompile/v2.js")),
            (Revision::V3, include_str!("../tests/fixtures/precompile/v3.js")),
            (Revision::V4, include_str!("../tests/fixtures/precompile/v4.js")),
        ];
        for (revision, expected) in golden {
            assert_eq!(emit_with("a", &t, &amd(revision)).unwrap(), expected, "{revision}");
        }
    }

    #[test]
    fn test_wrappers() {
        let t = fixture();
        let anonymous = emit_with(
            "a",
            &t,
            &EmitOptions {
                revision: Revision::V3,
                wrapper: Wrapper::Anonymous,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(anonymous.starts_with("(function() {\n"));
        assert!(anonymous.ends_with("})();\n"));
        assert!(anonymous.contains("templates['a'] = template;"));

        let bare = emit("a", &t, Revision::V2).unwrap();
        assert!(bare.starts_with("  var template = Handlebars.template({"));
        assert!(bare.contains("partials['a.hbs'] = template;"));

        assert_eq!("AMD".parse::<Wrapper>(), Ok(Wrapper::Amd));
        assert!("umd".parse::<Wrapper>().is_err());
    }

    #[test]
    fn test_programs_are_numbered() {
        let t = Template::compile("{{#if a}}{{b}}{{else}}none{{/if}}").unwrap();
        let spec = template_spec(&t, &EmitOptions::default()).unwrap();
        assert!(spec.starts_with("{\"1\":function(container,depth0,helpers,partials,data) {"));
        assert!(spec.contains("\"2\":function(container,depth0,helpers,partials,data) {\n  return \"none\";\n}"));
        assert!(spec.contains("\"fn\":container.program(1, data, 0),\"inverse\":container.program(2, data, 0)"));
        assert!(spec.contains("container.hooks.blockHelperMissing"));
        assert!(spec.contains("lookupProperty = container.lookupProperty"));

        let v1 = template_spec(
            &t,
            &EmitOptions {
                revision: Revision::V1,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(v1.contains("function program1(depth0,data) {"));
        assert!(v1.contains("fn:self.program(1, program1, data)"));
        assert!(v1.contains(", self=this;"));
    }

    #[test]
    fn test_depths() {
        let t = Template::compile("{{#each items}}{{../title}}{{/each}}").unwrap();
        let spec = template_spec(
            &t,
            &EmitOptions {
                revision: Revision::V3,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(spec.contains("depths[1]"));
        assert!(spec.contains("\"useDepths\":true"));
        assert!(spec.contains("container.program(1, data, 0, blockParams, depths)"));

        let v1 = EmitOptions {
            revision: Revision::V1,
            ..Default::default()
        };
        assert_eq!(
            template_spec(&t, &v1),
            Err(EmitError::Unsupported {
                feature: "parent-frame paths",
                revision: Revision::V1
            })
        );
    }

    #[test]
    fn test_unsupported_constructs() {
        let cases = [
            ("{{#*inline \"x\"}}y{{/inline}}", "decorators and inline partials"),
            ("{{#> layout}}body{{/layout}}", "partial blocks"),
            ("{{> (lookup this \"p\")}}", "dynamic partial names"),
            ("{{{{raw}}}}{{x}}{{{{/raw}}}}", "raw blocks"),
            ("{{#each xs as |x|}}{{x}}{{/each}}", "block params"),
        ];
        for (source, feature) in cases {
            let t = Template::compile(source).unwrap();
            for revision in Revision::ALL {
                let opts = EmitOptions {
                    revision,
                    ..Default::default()
                };
                assert_eq!(
                    template_spec(&t, &opts),
                    Err(EmitError::Unsupported { feature, revision }),
                    "{source}"
                );
            }
        }

        let t = Template::compile("{{name}}").unwrap();
        let compat = EmitOptions {
            revision: Revision::V1,
            parent_scope_lookup: true,
            ..Default::default()
        };
        assert!(template_spec(&t, &compat).is_err());
        let compat = EmitOptions {
            revision: Revision::V4,
            parent_scope_lookup: true,
            ..Default::default()
        };
        let spec = template_spec(&t, &compat).unwrap();
        assert!(spec.contains("container.lookup(depths, \"name\")"));
        assert!(spec.contains("\"compat\":true"));
    }

    #[test]
    fn test_partials() {
        let t = Template::compile("<ul>\n  {{> item this role=\"x\"}}\n</ul>").unwrap();
        let spec = template_spec(&t, &EmitOptions::default()).unwrap();
        assert!(spec.contains(
            "container.invokePartial(lookupProperty(partials,\"item\"),depth0,{\"name\":\"item\",\"hash\":{\"role\":\"x\"},\"data\":data,\"indent\":\"  \""
        ));

        let v1 = EmitOptions {
            revision: Revision::V1,
            ..Default::default()
        };
        assert!(template_spec(&t, &v1).is_err());
        let plain = Template::compile("{{> item}}").unwrap();
        assert!(template_spec(&plain, &v1)
            .unwrap()
            .contains("self.invokePartial(partials[\"item\"], \"item\", depth0, helpers, partials, data)"));
    }

    #[test]
    fn test_bundle() {
        let a = fixture();
        let b = Template::compile("{{x}}").unwrap();
        let out = emit_bundle([("a", &a), ("b", &b)], &amd(Revision::V4)).unwrap();
        assert!(out.contains("define('a.hbs'"));
        assert!(out.contains("define('b.hbs'"));
        assert!(out.contains("templates['b'] = template;"));
    }

    #[test]
    fn test_text_escaping() {
        let t = Template::compile("line\u{2028}\"quoted\"").unwrap();
        let spec = template_spec(&t, &EmitOptions::default()).unwrap();
        assert!(spec.contains(r#"return "line\u2028\"quoted\"";"#));
    }
}
