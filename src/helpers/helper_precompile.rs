use crate::context::Context;
use crate::error::{RenderError, RenderErrorReason};
use crate::helpers::HelperDef;
use crate::json::value::ScopedJson;
use crate::precompile::{Revision, Wrapper};
use crate::registry::Registry;
use crate::render::{Helper, RenderContext};

/// `{{precompile "name" revision=4 wrapper="amd"}}` writes the registered
/// template as a JavaScript snippet. The output is never escaped.
#[derive(Clone, Copy)]
pub struct PrecompileHelper;

impl HelperDef for PrecompileHelper {
    fn call_inner<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        _: &'rc Context,
        _: &mut RenderContext<'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let name = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("precompile", 0))?;
        let name = name
            .value()
            .as_str()
            .ok_or(RenderErrorReason::InvalidParamType("string"))?;

        let revision = match h.hash_get("revision") {
            Some(v) => v
                .value()
                .as_u64()
                .and_then(Revision::from_number)
                .ok_or(RenderErrorReason::InvalidParamType("revision between 1 and 4"))?,
            None => Revision::V4,
        };
        let wrapper = match h.hash_get("wrapper") {
            Some(v) => v
                .value()
                .as_str()
                .ok_or(RenderErrorReason::InvalidParamType("string"))?
                .parse::<Wrapper>()
                .map_err(RenderErrorReason::Other)?,
            None => Wrapper::default(),
        };

        let js = r.precompile(name, revision, wrapper)?;
        Ok(ScopedJson::safe(js))
    }
}

pub static PRECOMPILE_HELPER: PrecompileHelper = PrecompileHelper;
