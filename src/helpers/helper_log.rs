use std::str::FromStr;

use log::Level;

use crate::context::Context;
use crate::helpers::{HelperDef, HelperResult};
use crate::json::value::JsonRender;
use crate::output::Output;
use crate::registry::Registry;
use crate::render::{Helper, RenderContext};

#[derive(Clone, Copy)]
pub struct LogHelper;

impl HelperDef for LogHelper {
    fn call<'rc>(
        &self,
        h: &Helper<'rc>,
        _: &'rc Registry,
        _: &'rc Context,
        _: &mut RenderContext<'rc>,
        _: &mut dyn Output,
    ) -> HelperResult {
        let param_to_log = h
            .params()
            .iter()
            .map(|p| {
                if let Some(relative_path) = p.relative_path() {
                    format!("{}: {}", relative_path, p.value().render())
                } else {
                    p.value().render()
                }
            })
            .collect::<Vec<String>>()
            .join(", ");

        let level = h
            .hash_get("level")
            .and_then(|v| v.value().as_str())
            .unwrap_or("info");

        if let Ok(log_level) = Level::from_str(level) {
            log!(log_level, "{}", param_to_log)
        } else {
            warn!("Unsupported logging level {level}, expected one of: trace, debug, info, warn, error");
        }

        Ok(())
    }
}

pub static LOG_HELPER: LogHelper = LogHelper;
