use std::collections::BTreeMap;

use crate::block::BlockContext;
use crate::context::{merge_json, Context};
use crate::error::{RenderError, RenderErrorReason};
use crate::json::value::ScopedJson;
use crate::output::Output;
use crate::registry::Registry;
use crate::render::{Evaluable, RenderContext, Renderable};
use crate::support::str::with_indent;
use crate::template::{PartialNode, Template};

const PARTIAL_BLOCK: &str = "@partial-block";

/// Render `{{> name}}` or, with `block`, `{{#> name}}block{{/name}}`.
///
/// Inline partials defined while the partial runs are dropped when it
/// returns.
pub(crate) fn expand_partial<'rc>(
    p: &'rc PartialNode,
    block: Option<&'rc Template>,
    r: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let saved = rc.save_scope();
    let result = render_partial(p, block, r, ctx, rc, out);
    rc.restore_scope(saved);
    result
}

fn render_partial<'rc>(
    p: &'rc PartialNode,
    block: Option<&'rc Template>,
    r: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    // inline partials of the block body are visible to the partial
    if let Some(t) = block {
        t.eval(r, ctx, rc)?;
    }

    let name = match p.static_name() {
        Some(n) => n.to_owned(),
        None => p.name.expand(r, ctx, rc)?.render(),
    };

    if name == PARTIAL_BLOCK {
        let Some(body) = rc.pop_partial_block() else {
            return Err(RenderErrorReason::PartialNotFound(name).into());
        };
        // the body may itself refer to an outer partial block
        let result = render_with_frame(body, p, r, ctx, rc, out);
        rc.push_partial_block(body);
        return result;
    }

    let depth = rc.partial_stack().len();
    if depth >= r.max_partial_depth()
        || (!r.recursive_partials() && rc.partial_stack().iter().any(|n| *n == name))
    {
        return Err(RenderErrorReason::RecursionLimitExceeded { name, depth }.into());
    }

    let template = rc
        .get_partial(&name)
        .or_else(|| r.get_template(&name))
        .or(block);
    let Some(t) = template else {
        return Err(RenderErrorReason::PartialNotFound(name).into());
    };
    debug!("rendering partial {name:?} at depth {depth}");

    rc.push_partial(name);
    if let Some(b) = block {
        rc.push_partial_block(b);
    }

    let result = render_with_frame(t, p, r, ctx, rc, out);

    if block.is_some() {
        rc.pop_partial_block();
    }
    rc.pop_partial();
    result
}

/// Render a partial body under the frame its context param and hash
/// describe, indenting the output when the tag stood alone on its line.
fn render_with_frame<'rc>(
    t: &'rc Template,
    p: &'rc PartialNode,
    r: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let frame = partial_frame(p, r, ctx, rc)?;
    let pushed = frame.is_some();
    if let Some(f) = frame {
        rc.push_block(f);
    }

    let current = rc.get_current_template_name();
    let result = match &p.indent {
        Some(indent) if !r.prevent_indent() => t
            .renders(r, ctx, rc)
            .and_then(|s| out.write(&with_indent(&s, indent)).map_err(RenderError::from)),
        _ => t.render(r, ctx, rc, out),
    };
    rc.set_current_template_name(current);

    if pushed {
        rc.pop_block();
    }
    result
}

fn partial_frame<'rc>(
    p: &'rc PartialNode,
    r: &'rc Registry,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
) -> Result<Option<BlockContext<'rc>>, RenderError> {
    let base = match &p.context {
        Some(param) => Some(param.expand(r, ctx, rc)?.into_scoped()),
        None => None,
    };

    if p.hash.is_empty() {
        return Ok(base.map(BlockContext::with_value));
    }

    let mut hash = BTreeMap::new();
    for (k, v) in &p.hash {
        hash.insert(k.clone(), v.expand(r, ctx, rc)?.value().clone());
    }
    let base = base.unwrap_or_else(|| rc.this(ctx));
    let merged = merge_json(base.as_json(), &hash);
    Ok(Some(BlockContext::with_value(ScopedJson::Derived(merged))))
}
