use serde_json::value::Value as Json;

use crate::context::Context;
use crate::error::{RenderError, RenderErrorReason};
use crate::helpers::HelperDef;
use crate::json::value::ScopedJson;
use crate::registry::Registry;
use crate::render::{Helper, RenderContext};

/// `{{i18n "key" arg0 arg1 locale="fr_CA"}}`
#[derive(Clone, Copy)]
pub struct I18nHelper;

impl HelperDef for I18nHelper {
    fn call_inner<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        _: &'rc Context,
        _: &mut RenderContext<'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let key = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("i18n", 0))?
            .render();
        let locale = h.hash_get("locale").map(|l| l.render());
        let args: Vec<String> = h.params().iter().skip(1).map(|p| p.render()).collect();

        let message = match r.get_message_source() {
            Some(source) => source.format(locale.as_deref(), &key, &args),
            None => key,
        };
        Ok(ScopedJson::Derived(Json::String(message)))
    }
}

pub static I18N_HELPER: I18nHelper = I18nHelper;
