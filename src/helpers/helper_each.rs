use serde_json::value::Value as Json;

use crate::block::{BlockContext, BlockParams};
use crate::context::Context;
use crate::error::RenderErrorReason;
use crate::helpers::{HelperDef, HelperResult};
use crate::json::value::{to_json, JsonTruthy, ScopedJson};
use crate::output::Output;
use crate::registry::Registry;
use crate::render::{Helper, RenderContext, Renderable};

/// Children of an iterable value with their key, or `None` as key for
/// sequence items. Items of borrowed values stay borrowed.
fn children<'rc>(value: &ScopedJson<'rc>) -> Vec<(Option<String>, ScopedJson<'rc>)> {
    match value {
        ScopedJson::Context(j) | ScopedJson::Constant(j) => {
            let j: &'rc Json = j;
            match j {
                Json::Array(list) => list.iter().map(|v| (None, ScopedJson::Context(v))).collect(),
                Json::Object(obj) => obj
                    .iter()
                    .map(|(k, v)| (Some(k.clone()), ScopedJson::Context(v)))
                    .collect(),
                _ => Vec::new(),
            }
        }
        other => match other.as_json() {
            Json::Array(list) => list
                .iter()
                .map(|v| (None, ScopedJson::Derived(v.clone())))
                .collect(),
            Json::Object(obj) => obj
                .iter()
                .map(|(k, v)| (Some(k.clone()), ScopedJson::Derived(v.clone())))
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn set_block_params<'rc>(
    block: &mut BlockContext<'rc>,
    h: &Helper<'rc>,
    value: &ScopedJson<'rc>,
    key: Json,
) {
    let mut params = BlockParams::new();
    if let Some(name) = h.block_param() {
        params.add_value(name, value.clone());
    } else if let Some((value_name, key_name)) = h.block_param_pair() {
        params.add_value(value_name, value.clone());
        params.add_value(key_name, ScopedJson::Derived(key));
    } else {
        return;
    }
    block.set_block_params(params);
}

#[derive(Clone, Copy)]
pub struct EachHelper;

impl HelperDef for EachHelper {
    fn call<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("each", 0))?;

        let template = h.template();

        match template {
            Some(t) => {
                debug!("each value {:?}", value.value());
                let items = if value.value().is_truthy(false) {
                    children(value.scoped())
                } else {
                    Vec::new()
                };

                if items.is_empty() {
                    if let Some(else_template) = h.inverse() {
                        else_template.render(r, ctx, rc, out)?;
                    }
                    return Ok(());
                }

                let len = items.len();
                rc.push_block(BlockContext::new());

                let mut result = Ok(());
                for (i, (key, v)) in items.into_iter().enumerate() {
                    let Some(block) = rc.block_mut() else {
                        break;
                    };
                    block.set_local_var("first", to_json(i == 0));
                    block.set_local_var("last", to_json(i == len - 1));
                    block.set_local_var("index", to_json(i));

                    let key_json = match key {
                        Some(k) => {
                            let k = Json::String(k);
                            block.set_local_var("key", k.clone());
                            k
                        }
                        None => to_json(i),
                    };
                    set_block_params(block, h, &v, key_json);
                    block.set_base_value(v);

                    result = t.render(r, ctx, rc, out);
                    if result.is_err() {
                        break;
                    }
                }

                rc.pop_block();
                result
            }
            None => Ok(()),
        }
    }
}

pub static EACH_HELPER: EachHelper = EachHelper;
