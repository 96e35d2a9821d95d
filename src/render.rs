use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::value::Value as Json;

use crate::block::{BlockContext, BlockParams};
use crate::context::{navigate_scoped, Context};
use crate::decorators::DecoratorDef;
use crate::error::{RenderError, RenderErrorReason};
use crate::helpers::{HelperDef, HelperResult, EACH_HELPER};
use crate::json::path::Path;
use crate::json::value::{PathAndJson, ScopedJson};
use crate::output::{Output, StringOutput};
use crate::partial;
use crate::registry::Registry;
use crate::template::{
    Binding, BlockNode, BlockParam, Call, DecoratorNode, ExpressionNode, Node, Parameter,
    Template, TemplateMapping,
};

/// The context of a render call
///
/// This context stores information of a render: the scope stack, inline
/// partials, the partial call stack and helpers registered by decorators.
///
pub struct RenderContext<'rc> {
    blocks: Vec<BlockContext<'rc>>,
    partials: BTreeMap<String, &'rc Template>,
    partial_block_stack: Vec<&'rc Template>,
    partial_stack: Vec<String>,
    local_helpers: BTreeMap<String, Arc<dyn HelperDef + Send + Sync + 'rc>>,
    /// current template name
    current_template: Option<&'rc String>,
    /// root template name
    root_template: Option<&'rc String>,
    disable_escape: bool,
}

/// Inline partials and local helpers saved around a scope that may
/// define its own.
pub(crate) struct SavedScope<'rc> {
    partials: BTreeMap<String, &'rc Template>,
    local_helpers: BTreeMap<String, Arc<dyn HelperDef + Send + Sync + 'rc>>,
}

/// An owned copy of one scope frame, used by continuations that outlive
/// the borrow of the render call.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameSnapshot {
    pub this: Option<Json>,
    pub locals: BTreeMap<String, Json>,
    pub block_params: BTreeMap<String, Json>,
}

impl<'rc> RenderContext<'rc> {
    /// Create a render context
    pub fn new(root_template: Option<&'rc String>) -> RenderContext<'rc> {
        RenderContext {
            blocks: vec![BlockContext::new()],
            partials: BTreeMap::new(),
            partial_block_stack: Vec::new(),
            partial_stack: Vec::new(),
            local_helpers: BTreeMap::new(),
            current_template: None,
            root_template,
            disable_escape: false,
        }
    }

    /// Push a block context into render context stack. This is typically
    /// called when you entering a block scope.
    pub fn push_block(&mut self, block: BlockContext<'rc>) {
        self.blocks.push(block);
    }

    /// Pop and drop current block context.
    /// This is typically called when leaving a block scope. The root frame
    /// is never popped.
    pub fn pop_block(&mut self) {
        if self.blocks.len() > 1 {
            self.blocks.pop();
        }
    }

    /// Borrow a reference to current block context
    pub fn block(&self) -> Option<&BlockContext<'rc>> {
        self.blocks.last()
    }

    /// Borrow a mutable reference to current block context in order to
    /// modify some data.
    pub fn block_mut(&mut self) -> Option<&mut BlockContext<'rc>> {
        self.blocks.last_mut()
    }

    /// Number of frames above the root.
    pub fn depth(&self) -> usize {
        self.blocks.len() - 1
    }

    /// The value `this` refers to in the current frame.
    pub fn this(&self, ctx: &'rc Context) -> ScopedJson<'rc> {
        self.frame_value(self.blocks.len() - 1, ctx)
    }

    fn frame_value(&self, idx: usize, ctx: &'rc Context) -> ScopedJson<'rc> {
        self.blocks[..=idx]
            .iter()
            .rev()
            .find_map(|b| b.base_value())
            .cloned()
            .unwrap_or(ScopedJson::Context(ctx.data()))
    }

    fn lookup_in_frame(
        &self,
        idx: usize,
        segs: &[String],
        ctx: &'rc Context,
    ) -> Option<ScopedJson<'rc>> {
        let base = self.frame_value(idx, ctx);
        navigate_scoped(&base, segs)
    }

    /// Resolve a path against the scope stack. Missing values resolve to
    /// `ScopedJson::Missing`, never to an error.
    pub fn resolve(&self, path: &Path, ctx: &'rc Context, registry: &Registry) -> ScopedJson<'rc> {
        trace!("resolving {:?}", path.raw());
        let top = self.blocks.len() - 1;

        match path {
            Path::Relative {
                ups,
                segs,
                explicit_this,
                ..
            } => {
                let simple = *ups == 0 && !*explicit_this;
                if simple {
                    if let Some((first, rest)) = segs.split_first() {
                        for block in self.blocks.iter().rev() {
                            if let Some(v) = block.get_block_param(first) {
                                return navigate_scoped(v, rest).unwrap_or(ScopedJson::Missing);
                            }
                        }
                    }
                }

                if *ups > top {
                    return ScopedJson::Missing;
                }
                let idx = top - ups;
                if let Some(v) = self.lookup_in_frame(idx, segs, ctx) {
                    return v;
                }

                if simple && registry.parent_scope_lookup() {
                    for i in (0..idx).rev() {
                        if let Some(v) = self.lookup_in_frame(i, segs, ctx) {
                            return v;
                        }
                    }
                }
                ScopedJson::Missing
            }
            Path::Local { ups, name, segs, .. } => {
                if name == "root" {
                    return navigate_scoped(&ScopedJson::Context(ctx.data()), segs)
                        .unwrap_or(ScopedJson::Missing);
                }
                if *ups > top {
                    return ScopedJson::Missing;
                }
                self.blocks[..=top - ups]
                    .iter()
                    .rev()
                    .find_map(|b| b.get_local_var(name))
                    .and_then(|v| navigate_scoped(&ScopedJson::Derived(v.clone()), segs))
                    .unwrap_or(ScopedJson::Missing)
            }
        }
    }

    /// Get registered partial in this render context
    pub fn get_partial(&self, name: &str) -> Option<&'rc Template> {
        self.partials.get(name).copied()
    }

    /// Register a partial for this context
    pub fn set_partial(&mut self, name: String, partial: &'rc Template) {
        self.partials.insert(name, partial);
    }

    pub(crate) fn inline_partials(&self) -> &BTreeMap<String, &'rc Template> {
        &self.partials
    }

    pub(crate) fn push_partial_block(&mut self, body: &'rc Template) {
        self.partial_block_stack.push(body);
    }

    pub(crate) fn pop_partial_block(&mut self) -> Option<&'rc Template> {
        self.partial_block_stack.pop()
    }

    pub(crate) fn push_partial(&mut self, name: String) {
        self.partial_stack.push(name);
    }

    pub(crate) fn pop_partial(&mut self) {
        self.partial_stack.pop();
    }

    /// Names of the partials being rendered, outermost first.
    pub fn partial_stack(&self) -> &[String] {
        &self.partial_stack
    }

    pub(crate) fn partial_blocks(&self) -> &[&'rc Template] {
        &self.partial_block_stack
    }

    /// Resume partial bookkeeping captured from another render context.
    pub(crate) fn restore_partials(&mut self, stack: &[String], blocks: &'rc [Template]) {
        self.partial_stack = stack.to_vec();
        self.partial_block_stack = blocks.iter().collect();
    }

    pub(crate) fn save_scope(&self) -> SavedScope<'rc> {
        SavedScope {
            partials: self.partials.clone(),
            local_helpers: self.local_helpers.clone(),
        }
    }

    pub(crate) fn restore_scope(&mut self, saved: SavedScope<'rc>) {
        self.partials = saved.partials;
        self.local_helpers = saved.local_helpers;
    }

    /// Register a helper in current render context.
    /// This is typically called in decorators where user can modify
    /// render behavior for the rest of the enclosing template.
    pub fn register_local_helper(
        &mut self,
        name: &str,
        def: Box<dyn HelperDef + Send + Sync + 'rc>,
    ) {
        self.local_helpers.insert(name.to_string(), def.into());
    }

    /// Remove a helper from render context
    pub fn unregister_local_helper(&mut self, name: &str) {
        self.local_helpers.remove(name);
    }

    /// Attempt to get a helper from current render context.
    pub fn get_local_helper(&self, name: &str) -> Option<Arc<dyn HelperDef + Send + Sync + 'rc>> {
        self.local_helpers.get(name).cloned()
    }

    /// Returns the current template name.
    /// Note that the name can be vary from root template when you are rendering
    /// from partials.
    pub fn get_current_template_name(&self) -> Option<&'rc String> {
        self.current_template
    }

    /// Set the current template name.
    pub fn set_current_template_name(&mut self, name: Option<&'rc String>) {
        self.current_template = name;
    }

    /// Get root template name if any.
    /// This is the template name that you call `render` from `Handlebars`.
    pub fn get_root_template_name(&self) -> Option<&'rc String> {
        self.root_template
    }

    /// Get the escape toggle
    pub fn is_disable_escape(&self) -> bool {
        self.disable_escape
    }

    /// Set the escape toggle.
    /// When toggle is on, escape_fn will be called when rendering.
    pub fn set_disable_escape(&mut self, disable: bool) {
        self.disable_escape = disable
    }

    pub(crate) fn snapshot_frames(&self) -> Vec<FrameSnapshot> {
        self.blocks
            .iter()
            .map(|b| FrameSnapshot {
                this: b.base_value().map(|v| v.as_json().clone()),
                locals: b.local_variables().clone(),
                block_params: b.block_params_json(),
            })
            .collect()
    }

    pub(crate) fn restore_frames(&mut self, frames: &'rc [FrameSnapshot]) {
        for (i, frame) in frames.iter().enumerate() {
            let mut block = BlockContext::new();
            if let Some(this) = &frame.this {
                block.set_base_value(ScopedJson::Context(this));
            }
            for (k, v) in &frame.locals {
                block.set_local_var(k, v.clone());
            }
            if !frame.block_params.is_empty() {
                let mut params = BlockParams::new();
                for (k, v) in &frame.block_params {
                    params.add_value(k, ScopedJson::Context(v));
                }
                block.set_block_params(params);
            }
            if i == 0 {
                self.blocks[0] = block;
            } else {
                self.push_block(block);
            }
        }
    }
}

impl<'rc> fmt::Debug for RenderContext<'rc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("RenderContext")
            .field("blocks", &self.blocks)
            .field("partials", &self.partials.keys().collect::<Vec<_>>())
            .field("partial_stack", &self.partial_stack)
            .field("local_helpers", &self.local_helpers.keys().collect::<Vec<_>>())
            .field("current_template", &self.current_template)
            .field("root_template", &self.root_template)
            .field("disable_escape", &self.disable_escape)
            .finish()
    }
}

/// Render-time Helper data when using in a helper definition.
///
/// This is the options bundle of a helper call: resolved params and hash,
/// the block body and the `else` body.
#[derive(Debug)]
pub struct Helper<'rc> {
    name: String,
    params: Vec<PathAndJson<'rc>>,
    hash: BTreeMap<&'rc str, PathAndJson<'rc>>,
    block_param: Option<&'rc BlockParam>,
    template: Option<&'rc Template>,
    inverse: Option<&'rc Template>,
    block: bool,
}

impl<'rc> Helper<'rc> {
    pub(crate) fn try_from_call(
        call: &'rc Call,
        template: Option<&'rc Template>,
        inverse: Option<&'rc Template>,
        block: bool,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<Helper<'rc>, RenderError> {
        let mut params = Vec::with_capacity(call.params.len());
        for p in &call.params {
            params.push(p.expand(registry, ctx, rc)?);
        }

        let mut hash = BTreeMap::new();
        for (k, p) in &call.hash {
            hash.insert(k.as_str(), p.expand(registry, ctx, rc)?);
        }

        Ok(Helper {
            name: call.name.name(),
            params,
            hash,
            block_param: call.block_param.as_ref(),
            template,
            inverse,
            block,
        })
    }

    /// Returns helper name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all helper params, resolved within the context
    pub fn params(&self) -> &Vec<PathAndJson<'rc>> {
        &self.params
    }

    /// Returns nth helper param, resolved within the context.
    ///
    /// ## Example
    ///
    /// To get the first param in `{{my_helper abc}}` or `{{my_helper 2}}`,
    /// use `h.param(0)` in helper definition.
    /// Variable `abc` is auto resolved in current context.
    ///
    /// ```
    /// use hbskit::*;
    ///
    /// fn my_helper(h: &Helper, _: &Handlebars, _: &Context, rc: &mut RenderContext, out: &mut dyn Output) -> HelperResult {
    ///     let v = h.param(0).map(|v| v.value())
    ///         .ok_or(RenderErrorReason::ParamNotFoundForIndex("my_helper", 0));
    ///     // ..
    ///     Ok(())
    /// }
    /// ```
    pub fn param(&self, idx: usize) -> Option<&PathAndJson<'rc>> {
        self.params.get(idx)
    }

    /// Returns hash, resolved within the context
    pub fn hash(&self) -> &BTreeMap<&'rc str, PathAndJson<'rc>> {
        &self.hash
    }

    /// Return hash value of a given key, resolved within the context
    pub fn hash_get(&self, key: &str) -> Option<&PathAndJson<'rc>> {
        self.hash.get(key)
    }

    /// Returns the default inner template if the helper is a block helper.
    ///
    /// Typically you will render the template via: `template.render(registry, render_context)`
    ///
    pub fn template(&self) -> Option<&'rc Template> {
        self.template
    }

    /// Returns the template of `else` branch if any
    pub fn inverse(&self) -> Option<&'rc Template> {
        self.inverse
    }

    /// Returns if the helper is a block one `{{#helper}}{{/helper}}` or not `{{helper 123}}`
    pub fn is_block(&self) -> bool {
        self.block
    }

    /// Returns if the helper has either a block param or block param pair
    pub fn has_block_param(&self) -> bool {
        self.block_param.is_some()
    }

    /// Returns block param if any
    pub fn block_param(&self) -> Option<&'rc str> {
        match self.block_param {
            Some(BlockParam::Single(s)) => Some(s),
            _ => None,
        }
    }

    /// Return block param pair (for example |key, val|) if any
    pub fn block_param_pair(&self) -> Option<(&'rc str, &'rc str)> {
        match self.block_param {
            Some(BlockParam::Pair(a, b)) => Some((a, b)),
            _ => None,
        }
    }

    /// Render the block body against `this`, or against the current frame
    /// when `this` is `None`. Returns an empty string for non-block calls.
    pub fn render_fn(
        &self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        this: Option<ScopedJson<'rc>>,
    ) -> Result<String, RenderError> {
        render_branch(self.template, registry, ctx, rc, this)
    }

    /// Same as `render_fn` for the `else` body.
    pub fn render_inverse(
        &self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        this: Option<ScopedJson<'rc>>,
    ) -> Result<String, RenderError> {
        render_branch(self.inverse, registry, ctx, rc, this)
    }
}

fn render_branch<'rc>(
    template: Option<&'rc Template>,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    this: Option<ScopedJson<'rc>>,
) -> Result<String, RenderError> {
    let Some(t) = template else {
        return Ok(String::new());
    };
    match this {
        Some(value) => {
            rc.push_block(BlockContext::with_value(value));
            let result = t.renders(registry, ctx, rc);
            rc.pop_block();
            result
        }
        None => t.renders(registry, ctx, rc),
    }
}

/// Render-time Decorator data when using in a decorator definition
#[derive(Debug)]
pub struct Decorator<'rc> {
    name: String,
    params: Vec<PathAndJson<'rc>>,
    hash: BTreeMap<&'rc str, PathAndJson<'rc>>,
    template: Option<&'rc Template>,
}

impl<'rc> Decorator<'rc> {
    pub(crate) fn try_from_node(
        node: &'rc DecoratorNode,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<Decorator<'rc>, RenderError> {
        let mut params = Vec::with_capacity(node.call.params.len());
        for p in &node.call.params {
            params.push(p.expand(registry, ctx, rc)?);
        }

        let mut hash = BTreeMap::new();
        for (k, p) in &node.call.hash {
            hash.insert(k.as_str(), p.expand(registry, ctx, rc)?);
        }

        Ok(Decorator {
            name: node.call.name.name(),
            params,
            hash,
            template: node.body.as_ref(),
        })
    }

    /// Returns helper name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all helper params, resolved within the context
    pub fn params(&self) -> &Vec<PathAndJson<'rc>> {
        &self.params
    }

    /// Returns nth helper param, resolved within the context
    pub fn param(&self, idx: usize) -> Option<&PathAndJson<'rc>> {
        self.params.get(idx)
    }

    /// Returns hash, resolved within the context
    pub fn hash(&self) -> &BTreeMap<&'rc str, PathAndJson<'rc>> {
        &self.hash
    }

    /// Return hash value of a given key, resolved within the context
    pub fn hash_get(&self, key: &str) -> Option<&PathAndJson<'rc>> {
        self.hash.get(key)
    }

    /// Returns the default inner template if any
    pub fn template(&self) -> Option<&'rc Template> {
        self.template
    }
}

/// Render trait
pub trait Renderable {
    /// render into `out`
    fn render<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> Result<(), RenderError>;

    /// render into string
    fn renders<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<String, RenderError> {
        let mut so = StringOutput::new();
        self.render(registry, ctx, rc, &mut so)?;
        so.into_string().map_err(RenderError::from)
    }
}

/// Evaluate decorator
pub trait Evaluable {
    fn eval<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<(), RenderError>;
}

impl Parameter {
    /// Resolve the parameter to a value: paths against the scope stack,
    /// literals as constants and sub-expressions by calling their helper.
    pub fn expand<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<PathAndJson<'rc>, RenderError> {
        match self {
            Parameter::Path(p) => Ok(PathAndJson::new(Some(p), rc.resolve(p, ctx, registry))),
            Parameter::Literal(j) => Ok(PathAndJson::new(None, ScopedJson::Constant(j))),
            Parameter::Subexpression(call) => Ok(PathAndJson::new(
                None,
                eval_subexpression(call, registry, ctx, rc)?,
            )),
        }
    }
}

fn find_helper<'rc>(
    name: &str,
    registry: &'rc Registry,
    rc: &RenderContext<'rc>,
) -> Option<Arc<dyn HelperDef + Send + Sync + 'rc>> {
    if let Some(h) = rc.get_local_helper(name) {
        return Some(h);
    }
    registry.get_helper(name).map(|h| {
        let h: Arc<dyn HelperDef + Send + Sync + 'rc> = h.clone();
        h
    })
}

/// The helper a call site names, honoring the compiler's binding.
fn helper_for<'rc>(
    call: &Call,
    registry: &'rc Registry,
    rc: &RenderContext<'rc>,
) -> Option<Arc<dyn HelperDef + Send + Sync + 'rc>> {
    match (call.binding, call.helper_name()) {
        (Binding::Value, _) | (_, None) => None,
        (_, Some(name)) => find_helper(name, registry, rc),
    }
}

/// The helper used for `call`, falling back to `helperMissing` when the
/// call has arguments.
fn helper_or_missing<'rc>(
    call: &Call,
    registry: &'rc Registry,
    rc: &RenderContext<'rc>,
) -> Option<Arc<dyn HelperDef + Send + Sync + 'rc>> {
    helper_for(call, registry, rc).or_else(|| {
        if call.is_name_only() {
            None
        } else {
            find_helper("helperMissing", registry, rc)
        }
    })
}

fn eval_subexpression<'rc>(
    call: &'rc Call,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
) -> Result<ScopedJson<'rc>, RenderError> {
    let Some(def) = helper_or_missing(call, registry, rc) else {
        return Ok(call.name.expand(registry, ctx, rc)?.into_scoped());
    };

    let h = Helper::try_from_call(call, None, None, false, registry, ctx, rc)?;
    match def.call_inner(&h, registry, ctx, rc) {
        Ok(v) => Ok(v),
        Err(e) if e.is_unimplemented() => {
            // helpers without a value form are rendered to text
            let disable_escape = rc.is_disable_escape();
            rc.set_disable_escape(true);
            let mut so = StringOutput::new();
            let result = def.call(&h, registry, ctx, rc, &mut so);
            rc.set_disable_escape(disable_escape);
            result.map_err(|e| e.in_helper(h.name()))?;
            Ok(ScopedJson::Derived(Json::String(so.into_string()?)))
        }
        Err(e) => Err(e.in_helper(h.name())),
    }
}

fn invoke_helper<'rc>(
    def: &(dyn HelperDef + Send + Sync + 'rc),
    h: &Helper<'rc>,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    def.call(h, registry, ctx, rc, out)
        .map_err(|e| e.in_helper(h.name()))
}

fn write_value(
    value: &ScopedJson<'_>,
    escaped: bool,
    registry: &Registry,
    rc: &RenderContext<'_>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let rendered = value.render();
    if escaped && !rc.is_disable_escape() && !value.is_safe() {
        out.write(&registry.get_escape_fn()(&rendered))?;
    } else {
        out.write(&rendered)?;
    }
    Ok(())
}

fn render_expression<'rc>(
    e: &'rc ExpressionNode,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let call = &e.call;

    if let Some(def) = helper_or_missing(call, registry, rc) {
        let h = Helper::try_from_call(call, None, None, false, registry, ctx, rc)?;
        let disable_escape = rc.is_disable_escape();
        if !e.escaped {
            rc.set_disable_escape(true);
        }
        let result = invoke_helper(def.as_ref(), &h, registry, ctx, rc, out);
        rc.set_disable_escape(disable_escape);
        return result;
    }

    let value = call.name.expand(registry, ctx, rc)?.into_scoped();
    if value.is_missing() && registry.strict_mode() {
        return Err(RenderErrorReason::MissingVariable(Some(call.name.name())).into());
    }
    write_value(&value, e.escaped, registry, rc, out)
}

fn render_block<'rc>(
    b: &'rc BlockNode,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let call = &b.call;
    let body = b.body.as_ref();
    let inverse = b.inverse.as_ref();

    if let Some(def) = helper_for(call, registry, rc) {
        let h = Helper::try_from_call(call, body, inverse, true, registry, ctx, rc)?;
        return invoke_helper(def.as_ref(), &h, registry, ctx, rc, out);
    }

    if b.raw {
        return match body {
            Some(t) => t.render(registry, ctx, rc, out),
            None => Ok(()),
        };
    }

    if let Some(def) = find_helper("blockHelperMissing", registry, rc) {
        let h = Helper::try_from_call(call, body, inverse, true, registry, ctx, rc)?;
        return invoke_helper(def.as_ref(), &h, registry, ctx, rc, out);
    }

    let value = call.name.expand(registry, ctx, rc)?;
    implicit_block(value, b, registry, ctx, rc, out)
}

/// A block whose name is no helper: iterate sequences, branch on
/// booleans and missing values, push anything else as `this`.
fn implicit_block<'rc>(
    value: PathAndJson<'rc>,
    b: &'rc BlockNode,
    registry: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let body = b.body.as_ref();
    let inverse = b.inverse.as_ref();

    enum Shape {
        Iterate,
        Body,
        Inverse,
        Scope,
    }
    let shape = match value.value() {
        Json::Array(items) if !items.is_empty() => Shape::Iterate,
        Json::Array(_) | Json::Null | Json::Bool(false) => Shape::Inverse,
        Json::Bool(true) => Shape::Body,
        _ => Shape::Scope,
    };

    match shape {
        Shape::Iterate => {
            let h = Helper {
                name: "each".to_owned(),
                params: vec![value],
                hash: BTreeMap::new(),
                block_param: b.call.block_param.as_ref(),
                template: body,
                inverse,
                block: true,
            };
            EACH_HELPER.call(&h, registry, ctx, rc, out)
        }
        Shape::Inverse => match inverse {
            Some(t) => t.render(registry, ctx, rc, out),
            None => Ok(()),
        },
        Shape::Body => match body {
            Some(t) => t.render(registry, ctx, rc, out),
            None => Ok(()),
        },
        Shape::Scope => {
            let Some(t) = body else {
                return Ok(());
            };
            let this = value.into_scoped();
            let mut block = BlockContext::with_value(this.clone());
            if let Some(BlockParam::Single(name)) = &b.call.block_param {
                let mut params = BlockParams::new();
                params.add_value(name, this);
                block.set_block_params(params);
            }
            rc.push_block(block);
            let result = t.render(registry, ctx, rc, out);
            rc.pop_block();
            result
        }
    }
}

impl Template {
    fn locate(&self, mut e: RenderError, idx: usize) -> RenderError {
        if e.line_no.is_none() {
            if let Some(&TemplateMapping(line, col)) = self.mapping.get(idx) {
                e.line_no = Some(line);
                e.column_no = Some(col);
            }
        }
        if e.template_name.is_none() {
            e.template_name = self.name.clone();
        }
        e
    }

    fn render_elements<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
        has_decorators: bool,
    ) -> Result<(), RenderError> {
        if has_decorators {
            self.eval(registry, ctx, rc)?;
        }
        for (idx, node) in self.elements.iter().enumerate() {
            node.render(registry, ctx, rc, out)
                .map_err(|e| self.locate(e, idx))?;
        }
        Ok(())
    }
}

impl Renderable for Template {
    fn render<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> Result<(), RenderError> {
        if self.name.is_some() {
            rc.set_current_template_name(self.name.as_ref());
        }

        // decorators only affect the template that holds them
        if self.elements.iter().any(Node::is_decorator) {
            let saved = rc.save_scope();
            let result = self.render_elements(registry, ctx, rc, out, true);
            rc.restore_scope(saved);
            result
        } else {
            self.render_elements(registry, ctx, rc, out, false)
        }
    }
}

impl Evaluable for Template {
    fn eval<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<(), RenderError> {
        for (idx, node) in self.elements.iter().enumerate() {
            if let Node::Decorator(d) = node {
                d.eval(registry, ctx, rc)
                    .map_err(|e| self.locate(e, idx))?;
            }
        }
        Ok(())
    }
}

impl Renderable for Node {
    fn render<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> Result<(), RenderError> {
        match self {
            Node::Text(v) => {
                out.write(v)?;
                Ok(())
            }
            Node::Comment(_) | Node::Decorator(_) => Ok(()),
            Node::Expression(e) => render_expression(e, registry, ctx, rc, out),
            Node::Block(b) => render_block(b, registry, ctx, rc, out),
            Node::Partial(p) => partial::expand_partial(p, None, registry, ctx, rc, out),
            Node::PartialBlock(pb) => {
                partial::expand_partial(&pb.partial, Some(&pb.body), registry, ctx, rc, out)
            }
        }
    }
}

impl Evaluable for DecoratorNode {
    fn eval<'rc>(
        &'rc self,
        registry: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<(), RenderError> {
        let name = self.call.name.name();
        let def: &'rc (dyn DecoratorDef + Send + Sync) = registry
            .get_decorator(&name)
            .map(|d| d.as_ref())
            .ok_or(RenderErrorReason::DecoratorNotFound(name))?;
        let d = Decorator::try_from_node(self, registry, ctx, rc)?;
        def.call(&d, registry, ctx, rc)
    }
}
