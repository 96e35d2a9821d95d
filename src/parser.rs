//! Hand-written lexer and parser for template source.
//!
//! Delimiters live in the parser state so `{{=<% %>=}}` can switch them in
//! the middle of a template. Nesting is tracked with explicit stacks: open
//! blocks in `Parser::stack`, open sub-expressions in the builder stack of
//! `Parser::parse_call`, so neither depends on the native call stack.

use std::collections::BTreeMap;
use std::mem;

use serde_json::value::Value as Json;

use crate::error::{TemplateError, TemplateErrorReason};
use crate::json::path::Path;
use crate::template::{
    BlockNode, BlockParam, Call, DecoratorNode, Delimiters, ExpressionNode, Node, Parameter,
    PartialBlockNode, PartialNode, Template,
};

/// Parse `source` into a template tree. Nothing is bound yet: every call
/// site is `Binding::Deferred` until `compiler::compile` runs.
pub fn parse(source: &str, delimiters: &Delimiters) -> Result<Template, TemplateError> {
    Parser::new(source, delimiters).run()
}

#[derive(Debug)]
enum Kind<'a> {
    Expression { escaped: bool, body: &'a str },
    Comment(&'a str),
    Delimiters(&'a str),
    BlockOpen(&'a str),
    InvertedOpen(&'a str),
    PartialBlockOpen(&'a str),
    DecoratorBlockOpen(&'a str),
    Close(&'a str),
    Else,
    ElseChain(&'a str),
    Partial(&'a str),
    Decorator(&'a str),
}

impl<'a> Kind<'a> {
    fn standalone_capable(&self) -> bool {
        !matches!(self, Kind::Expression { .. })
    }
}

#[derive(Debug)]
struct Tag<'a> {
    kind: Kind<'a>,
    start: usize,
    end: usize,
    trim_left: bool,
    trim_right: bool,
}

enum FrameKind {
    Root,
    Block {
        call: Call,
        chained: bool,
        inverted: bool,
    },
    PartialBlock(PartialNode),
    DecoratorBlock(Call),
}

struct Frame {
    kind: FrameKind,
    name: String,
    open_at: usize,
    body: Template,
    inverse: Option<Template>,
    in_inverse: bool,
}

impl Frame {
    fn new(kind: FrameKind, name: String, open_at: usize) -> Frame {
        Frame {
            kind,
            name,
            open_at,
            body: Template::new(),
            inverse: None,
            in_inverse: false,
        }
    }

    fn current(&mut self) -> &mut Template {
        if self.in_inverse {
            self.inverse.get_or_insert_with(Template::new)
        } else {
            &mut self.body
        }
    }

    fn is_chained(&self) -> bool {
        matches!(self.kind, FrameKind::Block { chained: true, .. })
    }

    fn into_node(self) -> Option<Node> {
        match self.kind {
            FrameKind::Root => None,
            FrameKind::Block { call, inverted, .. } => Some(Node::Block(Box::new(BlockNode {
                call,
                body: if inverted { None } else { Some(self.body) },
                inverse: self.inverse,
                raw: false,
            }))),
            FrameKind::PartialBlock(partial) => {
                Some(Node::PartialBlock(Box::new(PartialBlockNode {
                    partial,
                    body: self.body,
                })))
            }
            FrameKind::DecoratorBlock(call) => Some(Node::Decorator(Box::new(DecoratorNode {
                call,
                body: Some(self.body),
            }))),
        }
    }
}

#[derive(Debug)]
enum Tok {
    Open,
    Close,
    Eq,
    Pipe,
    Str(String),
    Word(String),
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Open => "(".to_owned(),
            Tok::Close => ")".to_owned(),
            Tok::Eq => "=".to_owned(),
            Tok::Pipe => "|".to_owned(),
            Tok::Str(s) => format!("{s:?}"),
            Tok::Word(w) => w.clone(),
        }
    }
}

struct Builder {
    name: Option<Parameter>,
    params: Vec<Parameter>,
    hash: BTreeMap<String, Parameter>,
    pending_key: Option<String>,
    open_at: usize,
}

impl Builder {
    fn new(open_at: usize) -> Builder {
        Builder {
            name: None,
            params: Vec::new(),
            hash: BTreeMap::new(),
            pending_key: None,
            open_at,
        }
    }

    fn add(&mut self, p: Parameter) {
        if let Some(k) = self.pending_key.take() {
            self.hash.insert(k, p);
        } else if self.name.is_none() {
            self.name = Some(p);
        } else {
            self.params.push(p);
        }
    }
}

fn top(stack: &mut [Builder]) -> &mut Builder {
    let n = stack.len();
    &mut stack[n - 1]
}

fn is_blank(s: &str) -> bool {
    s.bytes().all(|b| b == b' ' || b == b'\t')
}

fn looks_numeric(w: &str) -> bool {
    let digits = w.strip_prefix('-').unwrap_or(w);
    digits.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
    delimiters: Delimiters,
    initial: Delimiters,
    line_starts: Vec<usize>,
    text: String,
    text_start: usize,
    stack: Vec<Frame>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, delimiters: &Delimiters) -> Parser<'a> {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));

        Parser {
            source,
            pos: 0,
            delimiters: delimiters.clone(),
            initial: delimiters.clone(),
            line_starts,
            text: String::new(),
            text_start: 0,
            stack: vec![Frame::new(FrameKind::Root, String::new(), 0)],
        }
    }

    fn run(mut self) -> Result<Template, TemplateError> {
        while self.pos < self.source.len() {
            let rest = &self.source[self.pos..];
            let Some(rel) = rest.find(self.delimiters.open.as_str()) else {
                self.push_text(self.pos, self.source.len());
                self.pos = self.source.len();
                break;
            };
            let tag_start = self.pos + rel;
            let bytes = self.source.as_bytes();

            if tag_start > 0 && bytes[tag_start - 1] == b'\\' {
                self.push_text(self.pos, tag_start - 1);
                if tag_start < 2 || bytes[tag_start - 2] != b'\\' {
                    // `\{{` renders the open marker literally
                    let open_end = tag_start + self.delimiters.open.len();
                    self.push_text(tag_start, open_end);
                    self.pos = open_end;
                    continue;
                }
            } else {
                self.push_text(self.pos, tag_start);
            }

            if self.delimiters.is_default() && self.source[tag_start..].starts_with("{{{{") {
                self.raw_block(tag_start)?;
                continue;
            }

            let tag = self.read_tag(tag_start)?;
            self.handle(tag)?;
        }

        self.finish()
    }

    fn finish(mut self) -> Result<Template, TemplateError> {
        self.flush_text();

        if self.stack.len() > 1 {
            let unclosed = self
                .stack
                .iter()
                .rev()
                .find(|f| !f.is_chained())
                .map(|f| (f.name.clone(), f.open_at))
                .unwrap_or_default();
            return Err(self.error(TemplateErrorReason::UnclosedBlock(unclosed.0), unclosed.1));
        }

        let mut root = match self.stack.pop() {
            Some(frame) => frame.body,
            None => Template::new(),
        };
        root.delimiters = self.initial;
        Ok(root)
    }

    fn location(&self, offset: usize) -> (usize, usize) {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let line_start = self.line_starts[line_idx];
        let col = self.source[line_start..offset].chars().count() + 1;
        (line_idx + 1, col)
    }

    fn error(&self, reason: TemplateErrorReason, offset: usize) -> TemplateError {
        let (line, col) = self.location(offset);
        TemplateError::of(reason).at(self.source, line, col)
    }

    fn syntax(&self, expected: &str, found: &str, offset: usize) -> TemplateError {
        self.error(
            TemplateErrorReason::InvalidSyntax {
                expected: expected.to_owned(),
                found: found.to_owned(),
            },
            offset,
        )
    }

    fn offset_of(&self, s: &str) -> usize {
        s.as_ptr() as usize - self.source.as_ptr() as usize
    }

    fn current(&mut self) -> &mut Template {
        let n = self.stack.len();
        self.stack[n - 1].current()
    }

    fn push_text(&mut self, from: usize, to: usize) {
        if from < to {
            if self.text.is_empty() {
                self.text_start = from;
            }
            self.text.push_str(&self.source[from..to]);
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let (line, col) = self.location(self.text_start);
            let text = mem::take(&mut self.text);
            self.current().push_element(Node::Text(text), line, col);
        }
    }

    fn push_node(&mut self, node: Node, at: usize) {
        self.flush_text();
        let (line, col) = self.location(at);
        self.current().push_element(node, line, col);
    }

    /// Position of the close marker, skipping string literals and `[...]`
    /// segments so they may contain it.
    fn find_close(&self, from: usize, tag_start: usize) -> Result<usize, TemplateError> {
        let bytes = self.source.as_bytes();
        let close = self.delimiters.close.as_bytes();
        let mut i = from;

        while i < bytes.len() {
            if bytes[i..].starts_with(close) {
                return Ok(i);
            }
            match bytes[i] {
                q @ (b'"' | b'\'') => {
                    let string_start = i;
                    i += 1;
                    loop {
                        if i >= bytes.len() {
                            return Err(
                                self.error(TemplateErrorReason::UnterminatedString, string_start)
                            );
                        }
                        if bytes[i] == b'\\' {
                            i += 2;
                            continue;
                        }
                        if bytes[i] == q {
                            break;
                        }
                        i += 1;
                    }
                }
                b'[' => {
                    if let Some(e) = bytes[i..].iter().position(|b| *b == b']') {
                        i += e;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Err(self.syntax(&self.delimiters.close, "end of input", tag_start))
    }

    fn read_tag(&self, start: usize) -> Result<Tag<'a>, TemplateError> {
        let src = self.source;
        let close = self.delimiters.close.as_str();
        let inner_start = start + self.delimiters.open.len();
        let after = &src[inner_start..];
        let lead = after.strip_prefix('~').unwrap_or(after);

        let close_at = if lead.starts_with("!--") {
            let from = inner_start + (after.len() - lead.len()) + 3;
            let mut search = from;
            loop {
                let Some(rel) = src[search..].find("--") else {
                    return Err(self.syntax("--", "end of input", start));
                };
                let dash = search + rel;
                let tail = &src[dash + 2..];
                if tail.starts_with(close) {
                    break dash + 2;
                }
                if tail.starts_with('~') && tail[1..].starts_with(close) {
                    break dash + 3;
                }
                search = dash + 1;
            }
        } else if lead.starts_with('!') {
            src[inner_start..]
                .find(close)
                .map(|i| inner_start + i)
                .ok_or_else(|| self.syntax(close, "end of input", start))?
        } else {
            let mut at = self.find_close(inner_start, start)?;
            if lead.trim_start().starts_with('{')
                && src[at..].starts_with('}')
                && src[at + 1..].starts_with(close)
            {
                at += 1;
            }
            at
        };

        let end = close_at + close.len();
        let mut body = &src[inner_start..close_at];
        let mut trim_left = false;
        let mut trim_right = false;

        if let Some(b) = body.strip_prefix('~') {
            trim_left = true;
            body = b;
        }

        if let Some(comment) = body.strip_prefix('!') {
            let mut comment = comment;
            if let Some(c) = comment.strip_suffix('~') {
                trim_right = true;
                comment = c;
            }
            if let Some(c) = comment.strip_prefix("--") {
                comment = c.strip_suffix("--").unwrap_or(c);
            }
            return Ok(Tag {
                kind: Kind::Comment(comment),
                start,
                end,
                trim_left,
                trim_right,
            });
        }

        if let Some(b) = body.strip_suffix('~') {
            trim_right = true;
            body = b;
        }

        let t = body.trim_start();
        let kind = if let Some(inner) = t.strip_prefix('{') {
            let mut inner = inner;
            if let Some(i) = inner.strip_prefix('~') {
                trim_left = true;
                inner = i;
            }
            let mut inner = inner
                .trim_end()
                .strip_suffix('}')
                .ok_or_else(|| self.syntax("}", close, close_at))?;
            if let Some(i) = inner.trim_end().strip_suffix('~') {
                trim_right = true;
                inner = i;
            }
            Kind::Expression {
                escaped: false,
                body: inner,
            }
        } else if let Some(rest) = t.strip_prefix('&') {
            Kind::Expression {
                escaped: false,
                body: rest,
            }
        } else if t.starts_with('=') {
            Kind::Delimiters(t.trim_end())
        } else if let Some(rest) = t.strip_prefix('#') {
            if let Some(r) = rest.strip_prefix('>') {
                Kind::PartialBlockOpen(r)
            } else if let Some(r) = rest.strip_prefix('*') {
                Kind::DecoratorBlockOpen(r)
            } else {
                Kind::BlockOpen(rest)
            }
        } else if let Some(rest) = t.strip_prefix('^') {
            if rest.trim().is_empty() {
                Kind::Else
            } else {
                Kind::InvertedOpen(rest)
            }
        } else if let Some(rest) = t.strip_prefix('/') {
            Kind::Close(rest.trim())
        } else if let Some(rest) = t.strip_prefix('>') {
            Kind::Partial(rest)
        } else if let Some(rest) = t.strip_prefix('*') {
            Kind::Decorator(rest)
        } else {
            let w = t.trim_end();
            if w == "else" {
                Kind::Else
            } else if let Some(r) = w
                .strip_prefix("else")
                .filter(|r| r.starts_with(char::is_whitespace))
            {
                Kind::ElseChain(r)
            } else {
                Kind::Expression {
                    escaped: true,
                    body: t,
                }
            }
        };

        Ok(Tag {
            kind,
            start,
            end,
            trim_left,
            trim_right,
        })
    }

    /// Whitespace before the tag on its line and the offset just past the
    /// line break, when nothing but blanks share the line with the tag.
    fn standalone(&self, start: usize, end: usize) -> Option<(&'a str, usize)> {
        let src = self.source;
        let line_start = src[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let before = &src[line_start..start];
        if !is_blank(before) {
            return None;
        }

        let rest = &src[end..];
        let line_end = rest.find('\n');
        let after = match line_end {
            Some(i) => &rest[..i],
            None => rest,
        };
        if !is_blank(after.strip_suffix('\r').unwrap_or(after)) {
            return None;
        }

        let next = line_end.map(|i| end + i + 1).unwrap_or(src.len());
        Some((before, next))
    }

    fn trim_text_end(&mut self) {
        let kept = self.text.trim_end_matches([' ', '\t']).len();
        self.text.truncate(kept);
        if self.text.ends_with('\n') {
            self.text.pop();
            if self.text.ends_with('\r') {
                self.text.pop();
            }
        }
    }

    fn skip_trimmed(&self, mut pos: usize) -> usize {
        let bytes = self.source.as_bytes();
        while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
            pos += 1;
        }
        if bytes[pos..].starts_with(b"\r\n") {
            pos + 2
        } else if bytes[pos..].starts_with(b"\n") {
            pos + 1
        } else {
            pos
        }
    }

    fn handle(&mut self, tag: Tag<'a>) -> Result<(), TemplateError> {
        if tag.trim_left {
            self.trim_text_end();
        }

        let mut end = tag.end;
        let mut indent = None;
        if tag.kind.standalone_capable() && !tag.trim_left && !tag.trim_right {
            if let Some((ws, next)) = self.standalone(tag.start, tag.end) {
                if self.text.ends_with(ws) {
                    let kept = self.text.len() - ws.len();
                    self.text.truncate(kept);
                    if !ws.is_empty() {
                        indent = Some(ws.to_owned());
                    }
                    end = next;
                }
            }
        }

        self.pos = if tag.trim_right {
            self.skip_trimmed(end)
        } else {
            end
        };

        self.dispatch(tag, indent)
    }

    fn dispatch(&mut self, tag: Tag<'a>, indent: Option<String>) -> Result<(), TemplateError> {
        let at = tag.start;
        match tag.kind {
            Kind::Comment(c) => self.push_node(Node::Comment(c.to_owned()), at),
            Kind::Delimiters(d) => self.switch_delimiters(d, at)?,
            Kind::Expression { escaped, body } => {
                let call = self.parse_call(body, false)?;
                self.push_node(Node::Expression(Box::new(ExpressionNode { call, escaped })), at);
            }
            Kind::BlockOpen(body) | Kind::InvertedOpen(body) => {
                let inverted = matches!(tag.kind, Kind::InvertedOpen(_));
                let call = self.parse_call(body, true)?;
                self.open_frame(
                    FrameKind::Block {
                        call,
                        chained: false,
                        inverted,
                    },
                    at,
                );
            }
            Kind::PartialBlockOpen(body) => {
                let partial = self.parse_partial(body, None)?;
                if partial.static_name().is_none() {
                    return Err(self.error(
                        TemplateErrorReason::InvalidPartialBlock(
                            "a partial block needs a literal partial name".to_owned(),
                        ),
                        at,
                    ));
                }
                self.open_frame(FrameKind::PartialBlock(partial), at);
            }
            Kind::DecoratorBlockOpen(body) => {
                let call = self.parse_call(body, false)?;
                self.open_frame(FrameKind::DecoratorBlock(call), at);
            }
            Kind::Close(name) => self.close_block(name, at)?,
            Kind::Else => self.open_inverse(at)?,
            Kind::ElseChain(body) => {
                self.open_inverse(at)?;
                let call = self.parse_call(body, true)?;
                self.open_frame(
                    FrameKind::Block {
                        call,
                        chained: true,
                        inverted: false,
                    },
                    at,
                );
            }
            Kind::Partial(body) => {
                let partial = self.parse_partial(body, indent)?;
                self.push_node(Node::Partial(Box::new(partial)), at);
            }
            Kind::Decorator(body) => {
                let call = self.parse_call(body, false)?;
                self.push_node(Node::Decorator(Box::new(DecoratorNode { call, body: None })), at);
            }
        }
        Ok(())
    }

    fn open_frame(&mut self, kind: FrameKind, at: usize) {
        self.flush_text();
        let name = match &kind {
            FrameKind::Root => String::new(),
            FrameKind::Block { call, .. } | FrameKind::DecoratorBlock(call) => call.name.name(),
            FrameKind::PartialBlock(partial) => partial.name.name(),
        };
        let mut frame = Frame::new(kind, name, at);
        if let FrameKind::Block { inverted: true, .. } = frame.kind {
            frame.in_inverse = true;
        }
        self.stack.push(frame);
    }

    fn open_inverse(&mut self, at: usize) -> Result<(), TemplateError> {
        self.flush_text();
        let n = self.stack.len();
        let frame = &self.stack[n - 1];
        let expected = match frame.kind {
            FrameKind::Block { .. } if !frame.in_inverse => None,
            FrameKind::Root => Some("an open block".to_owned()),
            _ => Some(format!("{{{{/{}}}}}", frame.name)),
        };
        if let Some(expected) = expected {
            return Err(self.syntax(&expected, "else", at));
        }

        let frame = &mut self.stack[n - 1];
        frame.in_inverse = true;
        frame.inverse = Some(Template::new());
        Ok(())
    }

    fn close_block(&mut self, name: &str, at: usize) -> Result<(), TemplateError> {
        self.flush_text();
        loop {
            if self.stack.len() <= 1 {
                return Err(self.error(TemplateErrorReason::UnexpectedClose(name.to_owned()), at));
            }
            let Some(frame) = self.stack.pop() else {
                return Err(self.error(TemplateErrorReason::UnexpectedClose(name.to_owned()), at));
            };
            let chained = frame.is_chained();
            if !chained && frame.name != name {
                return Err(self.error(
                    TemplateErrorReason::MismatchingClosedHelper(frame.name, name.to_owned()),
                    at,
                ));
            }

            let (line, col) = self.location(frame.open_at);
            if let Some(node) = frame.into_node() {
                self.current().push_element(node, line, col);
            }
            if !chained {
                return Ok(());
            }
        }
    }

    fn switch_delimiters(&mut self, d: &str, at: usize) -> Result<(), TemplateError> {
        let invalid = || TemplateErrorReason::InvalidDelimiters(d.to_owned());
        let inner = d
            .strip_prefix('=')
            .and_then(|s| s.strip_suffix('='))
            .ok_or_else(|| self.error(invalid(), at))?;

        let mut parts = inner.split_whitespace();
        let delimiters = match (parts.next(), parts.next(), parts.next()) {
            (Some(open), Some(close), None) => Delimiters::new(open, close),
            _ => None,
        }
        .ok_or_else(|| self.error(invalid(), at))?;

        debug!("switching delimiters to {delimiters:?}");
        self.delimiters = delimiters;
        Ok(())
    }

    fn raw_block(&mut self, start: usize) -> Result<(), TemplateError> {
        let inner_start = start + 4;
        let close_rel = self.source[inner_start..]
            .find("}}}}")
            .ok_or_else(|| self.syntax("}}}}", "end of input", start))?;
        let header = &self.source[inner_start..inner_start + close_rel];
        let call = self.parse_call(header, false)?;
        let name = call.name.name();

        let body_start = inner_start + close_rel + 4;
        let end_tag = ["{{{{/", name.as_str(), "}}}}"].concat();
        let body_len = self.source[body_start..]
            .find(&end_tag)
            .ok_or_else(|| self.error(TemplateErrorReason::UnclosedBlock(name.clone()), start))?;

        let mut body = Template::new();
        if body_len > 0 {
            let (line, col) = self.location(body_start);
            body.push_element(
                Node::Text(self.source[body_start..body_start + body_len].to_owned()),
                line,
                col,
            );
        }

        self.push_node(
            Node::Block(Box::new(BlockNode {
                call,
                body: Some(body),
                inverse: None,
                raw: true,
            })),
            start,
        );
        self.pos = body_start + body_len + end_tag.len();
        Ok(())
    }

    fn parse_partial(
        &self,
        body: &'a str,
        indent: Option<String>,
    ) -> Result<PartialNode, TemplateError> {
        let at = self.offset_of(body);
        let mut call = self.parse_call(body, false)?;

        let name = match call.name {
            Parameter::Path(p) => {
                let raw = p.raw();
                let name = raw
                    .strip_prefix('[')
                    .and_then(|r| r.strip_suffix(']'))
                    .unwrap_or(raw);
                Parameter::Literal(Json::String(name.to_owned()))
            }
            Parameter::Literal(Json::String(s)) => Parameter::Literal(Json::String(s)),
            Parameter::Literal(other) => {
                Parameter::Literal(Json::String(crate::json::value::JsonRender::render(&other)))
            }
            Parameter::Subexpression(sub) => Parameter::Subexpression(sub),
        };

        if call.params.len() > 1 {
            return Err(self.error(
                TemplateErrorReason::InvalidParam(format!(
                    "partial {} takes at most one context parameter",
                    name.name()
                )),
                at,
            ));
        }

        Ok(PartialNode {
            name,
            context: call.params.pop(),
            hash: call.hash,
            indent,
        })
    }

    fn tokenize(&self, body: &str) -> Result<Vec<(Tok, usize)>, TemplateError> {
        let base = self.offset_of(body);
        let bytes = body.as_bytes();
        let mut toks = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b' ' | b'\t' | b'\n' | b'\r' => i += 1,
                b'(' => {
                    toks.push((Tok::Open, base + i));
                    i += 1;
                }
                b')' => {
                    toks.push((Tok::Close, base + i));
                    i += 1;
                }
                b'=' => {
                    toks.push((Tok::Eq, base + i));
                    i += 1;
                }
                b'|' => {
                    toks.push((Tok::Pipe, base + i));
                    i += 1;
                }
                q @ (b'"' | b'\'') => {
                    let start = i;
                    let mut s = String::new();
                    i += 1;
                    let mut seg_start = i;
                    loop {
                        if i >= bytes.len() {
                            return Err(
                                self.error(TemplateErrorReason::UnterminatedString, base + start)
                            );
                        }
                        if bytes[i] == b'\\' && i + 1 < bytes.len() {
                            s.push_str(&body[seg_start..i]);
                            seg_start = i + 1;
                            i += 2;
                            continue;
                        }
                        if bytes[i] == q {
                            s.push_str(&body[seg_start..i]);
                            i += 1;
                            break;
                        }
                        i += 1;
                    }
                    toks.push((Tok::Str(s), base + start));
                }
                _ => {
                    let start = i;
                    while i < bytes.len() {
                        match bytes[i] {
                            b' ' | b'\t' | b'\n' | b'\r' | b'(' | b')' | b'=' | b'|' => break,
                            b'[' => match bytes[i..].iter().position(|b| *b == b']') {
                                Some(e) => i += e + 1,
                                None => i = bytes.len(),
                            },
                            _ => i += 1,
                        }
                    }
                    toks.push((Tok::Word(body[start..i].to_owned()), base + start));
                }
            }
        }

        Ok(toks)
    }

    fn word_param(&self, w: &str, at: usize) -> Result<Parameter, TemplateError> {
        match w {
            "true" => return Ok(Parameter::Literal(Json::Bool(true))),
            "false" => return Ok(Parameter::Literal(Json::Bool(false))),
            "null" | "undefined" => return Ok(Parameter::Literal(Json::Null)),
            _ => {}
        }

        if looks_numeric(w) {
            if let Ok(n) = serde_json::from_str::<Json>(w) {
                return Ok(Parameter::Literal(n));
            }
        }

        Path::parse(w)
            .map(Parameter::Path)
            .map_err(|e| self.error(TemplateErrorReason::InvalidParam(e), at))
    }

    fn finish_builder(&self, b: Builder, at: usize) -> Result<Call, TemplateError> {
        if b.pending_key.is_some() {
            return Err(self.syntax("a hash value", "end of expression", at));
        }
        let name = b
            .name
            .ok_or_else(|| self.syntax("a helper or path name", "nothing", b.open_at))?;
        Ok(Call {
            name,
            params: b.params,
            hash: b.hash,
            block_param: None,
            binding: Default::default(),
        })
    }

    /// Parse `name params.. key=value.. [as |a b|]`. Sub-expressions are
    /// kept on an explicit builder stack.
    fn parse_call(&self, body: &str, allow_block_params: bool) -> Result<Call, TemplateError> {
        let toks = self.tokenize(body)?;
        let body_at = self.offset_of(body);
        let mut stack = vec![Builder::new(body_at)];
        let mut block_param = None;
        let mut i = 0;

        while i < toks.len() {
            let (tok, at) = &toks[i];
            let at = *at;
            match tok {
                Tok::Open => stack.push(Builder::new(at)),
                Tok::Close => {
                    if stack.len() == 1 {
                        return Err(self.error(TemplateErrorReason::UnbalancedParens, at));
                    }
                    let Some(b) = stack.pop() else {
                        return Err(self.error(TemplateErrorReason::UnbalancedParens, at));
                    };
                    let call = self.finish_builder(b, at)?;
                    top(&mut stack).add(Parameter::Subexpression(Box::new(call)));
                }
                Tok::Word(w) if matches!(toks.get(i + 1), Some((Tok::Eq, _))) => {
                    let b = top(&mut stack);
                    if b.name.is_none() || b.pending_key.is_some() {
                        return Err(self.syntax("a parameter", "=", toks[i + 1].1));
                    }
                    b.pending_key = Some(w.clone());
                    i += 2;
                    continue;
                }
                Tok::Word(w)
                    if w == "as"
                        && stack.len() == 1
                        && matches!(toks.get(i + 1), Some((Tok::Pipe, _))) =>
                {
                    if !allow_block_params {
                        return Err(self.syntax("a parameter", "block params", at));
                    }
                    let mut names = Vec::new();
                    let mut j = i + 2;
                    loop {
                        match toks.get(j) {
                            Some((Tok::Word(n), _)) => {
                                names.push(n.clone());
                                j += 1;
                            }
                            Some((Tok::Pipe, _)) => break,
                            Some((other, pos)) => {
                                return Err(self.syntax("|", &other.describe(), *pos))
                            }
                            None => return Err(self.syntax("|", "end of expression", at)),
                        }
                    }
                    let mut names = names.into_iter();
                    block_param = match (names.next(), names.next(), names.next()) {
                        (Some(a), None, None) => Some(BlockParam::Single(a)),
                        (Some(a), Some(b), None) => Some(BlockParam::Pair(a, b)),
                        _ => return Err(self.syntax("one or two block params", "|", at)),
                    };
                    i = j + 1;
                    if let Some((other, pos)) = toks.get(i) {
                        return Err(self.syntax(
                            &self.delimiters.close,
                            &other.describe(),
                            *pos,
                        ));
                    }
                    continue;
                }
                Tok::Word(w) => {
                    let p = self.word_param(w, at)?;
                    top(&mut stack).add(p);
                }
                Tok::Str(s) => top(&mut stack).add(Parameter::Literal(Json::String(s.clone()))),
                Tok::Eq | Tok::Pipe => return Err(self.syntax("a parameter", &tok.describe(), at)),
            }
            i += 1;
        }

        if stack.len() > 1 {
            let open_at = top(&mut stack).open_at;
            return Err(self.error(TemplateErrorReason::UnbalancedParens, open_at));
        }
        let Some(b) = stack.pop() else {
            return Err(self.syntax("an expression", "nothing", body_at));
        };
        let mut call = self.finish_builder(b, body_at + body.len())?;
        call.block_param = block_param;
        Ok(call)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::template::{Binding, Node};

    fn parse_default(source: &str) -> Result<Template, TemplateError> {
        parse(source, &Delimiters::default())
    }

    fn path_name(p: &Parameter) -> &str {
        match p {
            Parameter::Path(p) => p.raw(),
            other => panic!("path expected, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_text_and_expressions() {
        let t = parse_default("Hello {{name}}! {{{html}}} {{&raw}}").unwrap();
        assert_eq!(t.elements.len(), 6);
        assert_eq!(t.elements[0], Node::Text("Hello ".to_owned()));
        match &t.elements[1] {
            Node::Expression(e) => {
                assert!(e.escaped);
                assert_eq!(path_name(&e.call.name), "name");
                assert_eq!(e.call.binding, Binding::Deferred);
            }
            other => panic!("{other:?}"),
        }
        match (&t.elements[3], &t.elements[5]) {
            (Node::Expression(a), Node::Expression(b)) => {
                assert!(!a.escaped);
                assert!(!b.escaped);
                assert_eq!(path_name(&b.call.name), "raw");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_parse_params_and_hash() {
        let t = parse_default(r#"{{link "home" page.url -1 true class=(css "a" b) title='x'}}"#)
            .unwrap();
        let Node::Expression(e) = &t.elements[0] else {
            panic!()
        };
        assert_eq!(e.call.params.len(), 4);
        assert_eq!(e.call.params[0], Parameter::Literal(Json::from("home")));
        assert_eq!(path_name(&e.call.params[1]), "page.url");
        assert_eq!(e.call.params[2], Parameter::Literal(Json::from(-1)));
        assert_eq!(e.call.params[3], Parameter::Literal(Json::Bool(true)));
        match e.call.hash.get("class") {
            Some(Parameter::Subexpression(sub)) => {
                assert_eq!(path_name(&sub.name), "css");
                assert_eq!(sub.params.len(), 2);
            }
            other => panic!("{other:?}"),
        }
        assert_eq!(e.call.hash.get("title"), Some(&Parameter::Literal(Json::from("x"))));
    }

    #[test]
    fn test_parse_blocks_and_else() {
        let t = parse_default("{{#if a}}x{{else if b}}y{{else}}z{{/if}}").unwrap();
        let Node::Block(outer) = &t.elements[0] else {
            panic!()
        };
        assert_eq!(path_name(&outer.call.name), "if");
        let inverse = outer.inverse.as_ref().unwrap();
        assert_eq!(inverse.elements.len(), 1);
        let Node::Block(chained) = &inverse.elements[0] else {
            panic!()
        };
        assert_eq!(path_name(&chained.call.params[0]), "b");
        assert_eq!(
            chained.inverse.as_ref().unwrap().elements,
            vec![Node::Text("z".to_owned())]
        );

        let t = parse_default("{{^empty}}nothing{{/empty}}").unwrap();
        let Node::Block(b) = &t.elements[0] else {
            panic!()
        };
        assert!(b.body.is_none());
        assert!(b.inverse.is_some());
    }

    #[test]
    fn test_block_params() {
        let t = parse_default("{{#each list as |item idx|}}{{item}}{{/each}}").unwrap();
        let Node::Block(b) = &t.elements[0] else {
            panic!()
        };
        assert_eq!(
            b.call.block_param,
            Some(BlockParam::Pair("item".to_owned(), "idx".to_owned()))
        );
        assert!(parse_default("{{foo as |x|}}").is_err());
    }

    #[test]
    fn test_mismatched_and_unclosed_blocks() {
        let err = parse_default("{{#if a}}\n{{/each}}").unwrap_err();
        assert_eq!(
            err.reason(),
            &TemplateErrorReason::MismatchingClosedHelper("if".to_owned(), "each".to_owned())
        );
        assert_eq!(err.line_no, Some(2));

        let err = parse_default("{{#if a}}text").unwrap_err();
        assert_eq!(err.reason(), &TemplateErrorReason::UnclosedBlock("if".to_owned()));

        let err = parse_default("text{{/if}}").unwrap_err();
        assert_eq!(err.reason(), &TemplateErrorReason::UnexpectedClose("if".to_owned()));

        assert!(parse_default("{{else}}").is_err());
    }

    #[test]
    fn test_malformed_expressions() {
        let err = parse_default(r#"{{foo "bar}}"#).unwrap_err();
        assert_eq!(err.reason(), &TemplateErrorReason::UnterminatedString);

        let err = parse_default("{{foo (bar 1}}").unwrap_err();
        assert_eq!(err.reason(), &TemplateErrorReason::UnbalancedParens);

        let err = parse_default("{{foo bar)}}").unwrap_err();
        assert_eq!(err.reason(), &TemplateErrorReason::UnbalancedParens);

        let err = parse_default("{{foo ()}}").unwrap_err();
        assert!(matches!(err.reason(), TemplateErrorReason::InvalidSyntax { .. }));

        let err = parse_default("{{foo").unwrap_err();
        assert!(matches!(err.reason(), TemplateErrorReason::InvalidSyntax { .. }));

        assert!(parse_default("{{#> (dynamic)}}x{{/dynamic}}").is_err());
    }

    #[test]
    fn test_deep_subexpression_nesting() {
        let depth = 5000;
        let mut source = String::from("{{f ");
        for _ in 0..depth {
            source.push_str("(f ");
        }
        source.push('x');
        for _ in 0..depth {
            source.push(')');
        }
        source.push_str("}}");

        let t = parse_default(&source).unwrap();
        let Node::Expression(e) = &t.elements[0] else {
            panic!()
        };
        let mut levels = 0;
        let mut current = &e.call;
        while let Some(Parameter::Subexpression(sub)) = current.params.first() {
            levels += 1;
            current = sub;
        }
        assert_eq!(levels, depth);
        // drop the chain iteratively so the test itself stays shallow
        let mut t = t;
        if let Some(Node::Expression(e)) = t.elements.pop() {
            let mut next = e.call.params.into_iter().next();
            while let Some(Parameter::Subexpression(sub)) = next {
                let sub = *sub;
                next = sub.params.into_iter().next();
            }
        }
    }

    #[test]
    fn test_delimiter_switch() {
        let t = parse_default("{{a}} {{=<% %>=}}<% b %> {{c}} <%={{ }}=%>{{d}}").unwrap();
        let names: Vec<String> = t
            .elements
            .iter()
            .filter_map(|n| match n {
                Node::Expression(e) => Some(e.call.name.name()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a", "b", "d"]);
        assert!(t
            .elements
            .iter()
            .any(|n| *n == Node::Text(" {{c}} ".to_owned())));
        assert_eq!(t.delimiters, Delimiters::default());

        assert!(parse_default("{{=<%=}}").is_err());
    }

    #[test]
    fn test_trim_markers() {
        let t = parse_default("a  \n  {{~b~}}  \n  c").unwrap();
        assert_eq!(t.elements[0], Node::Text("a  ".to_owned()));
        assert_eq!(t.elements[2], Node::Text("  c".to_owned()));

        let t = parse_default("  {{~{ foo }~}}  ").unwrap();
        assert_eq!(t.elements.len(), 1);
        let Node::Expression(e) = &t.elements[0] else {
            panic!()
        };
        assert!(!e.escaped);
    }

    #[test]
    fn test_standalone_lines() {
        let t = parse_default("<ul>\n  {{#each a}}\n  <li/>\n  {{/each}}\n</ul>").unwrap();
        assert_eq!(t.elements[0], Node::Text("<ul>\n".to_owned()));
        let Node::Block(b) = &t.elements[1] else {
            panic!()
        };
        assert_eq!(
            b.body.as_ref().unwrap().elements,
            vec![Node::Text("  <li/>\n".to_owned())]
        );
        assert_eq!(t.elements[2], Node::Text("</ul>".to_owned()));

        let t = parse_default("<div>\n    {{> item}}\n</div>").unwrap();
        let Node::Partial(p) = &t.elements[1] else {
            panic!()
        };
        assert_eq!(p.indent.as_deref(), Some("    "));
        assert_eq!(p.static_name(), Some("item"));
    }

    #[test]
    fn test_comments_raw_and_escapes() {
        let t = parse_default("{{!-- has }} inside --}}{{! short }}").unwrap();
        assert_eq!(t.elements[0], Node::Comment(" has }} inside ".to_owned()));
        assert_eq!(t.elements[1], Node::Comment(" short ".to_owned()));

        let t = parse_default("{{{{raw}}}}{{not parsed}}{{{{/raw}}}}").unwrap();
        let Node::Block(b) = &t.elements[0] else {
            panic!()
        };
        assert!(b.raw);
        assert_eq!(
            b.body.as_ref().unwrap().elements,
            vec![Node::Text("{{not parsed}}".to_owned())]
        );

        let t = parse_default(r"\{{literal}}").unwrap();
        assert_eq!(t.elements, vec![Node::Text("{{literal}}".to_owned())]);
    }

    #[test]
    fn test_partials_and_decorators() {
        let t = parse_default(
            r#"{{> (whichPartial) ctx key=1}}{{#> layout}}default{{/layout}}{{#*inline "x"}}body{{/inline}}{{*deco}}"#,
        )
        .unwrap();
        match &t.elements[0] {
            Node::Partial(p) => {
                assert!(matches!(p.name, Parameter::Subexpression(_)));
                assert!(p.context.is_some());
                assert_eq!(p.hash.len(), 1);
            }
            other => panic!("{other:?}"),
        }
        match &t.elements[1] {
            Node::PartialBlock(pb) => {
                assert_eq!(pb.partial.static_name(), Some("layout"));
                assert_eq!(pb.body.elements, vec![Node::Text("default".to_owned())]);
            }
            other => panic!("{other:?}"),
        }
        match &t.elements[2] {
            Node::Decorator(d) => {
                assert_eq!(d.call.name.name(), "inline");
                assert!(d.body.is_some());
            }
            other => panic!("{other:?}"),
        }
        assert!(matches!(&t.elements[3], Node::Decorator(d) if d.body.is_none()));

        assert!(parse_default("{{> a b c}}").is_err());
    }

    #[test]
    fn test_error_position() {
        let err = parse_default("line one\n  {{foo \"bar}}").unwrap_err();
        assert_eq!(err.line_no, Some(2));
        assert_eq!(err.column_no, Some(9));
    }
}
