use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::value::Value as Json;

use crate::compiler::{self, KnownNames};
use crate::error::TemplateError;
use crate::json::path::Path;
use crate::json::value::JsonRender;
use crate::parser;

/// Open and close tag markers, `{{` and `}}` unless changed.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Default for Delimiters {
    fn default() -> Delimiters {
        Delimiters {
            open: "{{".to_owned(),
            close: "}}".to_owned(),
        }
    }
}

impl Delimiters {
    /// Returns `None` when either marker is empty or contains whitespace or `=`.
    pub fn new(open: &str, close: &str) -> Option<Delimiters> {
        let valid = |s: &str| !s.is_empty() && !s.contains(|c: char| c.is_whitespace() || c == '=');
        if valid(open) && valid(close) {
            Some(Delimiters {
                open: open.to_owned(),
                close: close.to_owned(),
            })
        } else {
            None
        }
    }

    pub fn is_default(&self) -> bool {
        self.open == "{{" && self.close == "}}"
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct TemplateMapping(pub usize, pub usize);

/// How a call site was bound by the compiler.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum Binding {
    /// simple name not known as a helper yet, decided at render time
    #[default]
    Deferred,
    /// a helper registered when the template was compiled
    Helper,
    /// a path or literal that can never name a helper
    Value,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Parameter {
    Path(Path),
    Literal(Json),
    Subexpression(Box<Call>),
}

impl Parameter {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Parameter::Path(p) => Some(p),
            _ => None,
        }
    }

    /// The name used for helper lookup and close-tag matching.
    pub fn name(&self) -> String {
        match self {
            Parameter::Path(p) => p.raw().to_owned(),
            Parameter::Literal(j) => j.render(),
            Parameter::Subexpression(c) => format!("({})", c.name.name()),
        }
    }
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum BlockParam {
    Single(String),
    Pair(String, String),
}

/// A name with its params and hash: the shape shared by expressions, blocks,
/// decorators and sub-expressions.
#[derive(PartialEq, Clone, Debug)]
pub struct Call {
    pub name: Parameter,
    pub params: Vec<Parameter>,
    pub hash: BTreeMap<String, Parameter>,
    pub block_param: Option<BlockParam>,
    pub binding: Binding,
}

impl Call {
    pub fn new(name: Parameter) -> Call {
        Call {
            name,
            params: Vec::new(),
            hash: BTreeMap::new(),
            block_param: None,
            binding: Binding::Deferred,
        }
    }

    /// The bare helper name, if the call could name a helper at all.
    pub fn helper_name(&self) -> Option<&str> {
        match &self.name {
            Parameter::Path(p) => p.simple_name(),
            Parameter::Literal(Json::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn is_name_only(&self) -> bool {
        self.params.is_empty() && self.hash.is_empty()
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct ExpressionNode {
    pub call: Call,
    pub escaped: bool,
}

#[derive(PartialEq, Clone, Debug)]
pub struct BlockNode {
    pub call: Call,
    /// `None` for inverted sections
    pub body: Option<Template>,
    pub inverse: Option<Template>,
    pub raw: bool,
}

#[derive(PartialEq, Clone, Debug)]
pub struct PartialNode {
    /// a literal name, or a sub-expression evaluated at render time
    pub name: Parameter,
    pub context: Option<Parameter>,
    pub hash: BTreeMap<String, Parameter>,
    pub indent: Option<String>,
}

impl PartialNode {
    pub fn static_name(&self) -> Option<&str> {
        match &self.name {
            Parameter::Literal(Json::String(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub struct PartialBlockNode {
    pub partial: PartialNode,
    pub body: Template,
}

#[derive(PartialEq, Clone, Debug)]
pub struct DecoratorNode {
    pub call: Call,
    pub body: Option<Template>,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Node {
    Text(String),
    Expression(Box<ExpressionNode>),
    Block(Box<BlockNode>),
    Partial(Box<PartialNode>),
    PartialBlock(Box<PartialBlockNode>),
    Decorator(Box<DecoratorNode>),
    Comment(String),
}

impl Node {
    pub fn is_decorator(&self) -> bool {
        matches!(self, Node::Decorator(_))
    }
}

/// Helper and partial names a compiled template refers to.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub struct References {
    pub helpers: BTreeSet<String>,
    pub partials: BTreeSet<String>,
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct Template {
    pub name: Option<String>,
    pub elements: Vec<Node>,
    pub mapping: Vec<TemplateMapping>,
    pub delimiters: Delimiters,
    pub references: References,
    pub fingerprint: u64,
}

impl Template {
    pub fn new() -> Template {
        Template::default()
    }

    pub(crate) fn push_element(&mut self, e: Node, line: usize, col: usize) {
        self.elements.push(e);
        self.mapping.push(TemplateMapping(line, col));
    }

    /// Parse and compile `source` without any registry knowledge. Every
    /// simple name stays deferred to render time.
    pub fn compile(source: &str) -> Result<Template, TemplateError> {
        let parsed = parser::parse(source, &Delimiters::default())?;
        Ok(compiler::compile(parsed, &KnownNames::default()))
    }

    pub fn compile_with_name<S: AsRef<str>>(
        source: S,
        name: String,
    ) -> Result<Template, TemplateError> {
        let mut t = Template::compile(source.as_ref()).map_err(|e| e.in_template(name.clone()))?;
        t.name = Some(name);
        Ok(t)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Template({}, {} elements)",
            self.name.as_deref().unwrap_or("anonymous"),
            self.elements.len()
        )
    }
}
