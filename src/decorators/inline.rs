use crate::context::Context;
use crate::decorators::{DecoratorDef, DecoratorResult};
use crate::error::{RenderError, RenderErrorReason};
use crate::registry::Registry;
use crate::render::{Decorator, RenderContext};

#[derive(Clone, Copy)]
pub struct InlineDecorator;

fn get_name<'a>(d: &'a Decorator<'_>) -> Result<&'a str, RenderError> {
    d.param(0)
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("inline", 0))
        .and_then(|v| {
            v.value()
                .as_str()
                .ok_or(RenderErrorReason::InvalidParamType("string"))
        })
        .map_err(RenderError::from)
}

impl DecoratorDef for InlineDecorator {
    fn call<'rc>(
        &self,
        d: &Decorator<'rc>,
        _: &'rc Registry,
        _: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> DecoratorResult {
        let name = get_name(d)?;

        let template = d
            .template()
            .ok_or_else(|| RenderError::new("inline should have a block"))?;

        debug!("registering inline partial {name:?}");
        rc.set_partial(name.to_owned(), template);
        Ok(())
    }
}

pub static INLINE_DECORATOR: InlineDecorator = InlineDecorator;
