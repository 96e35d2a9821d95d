use crate::block::{BlockContext, BlockParams};
use crate::context::Context;
use crate::error::RenderErrorReason;
use crate::helpers::{HelperDef, HelperResult};
use crate::json::value::JsonTruthy;
use crate::output::Output;
use crate::registry::Registry;
use crate::render::{Helper, RenderContext, Renderable};

#[derive(Clone, Copy)]
pub struct WithHelper;

impl HelperDef for WithHelper {
    fn call<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let param = h
            .param(0)
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("with", 0))?;

        if !param.value().is_truthy(false) {
            return match h.inverse() {
                Some(t) => t.render(r, ctx, rc, out),
                None => Ok(()),
            };
        }

        let Some(t) = h.template() else {
            return Ok(());
        };

        let mut block = BlockContext::with_value(param.scoped().clone());
        if let Some(block_param) = h.block_param() {
            let mut params = BlockParams::new();
            params.add_value(block_param, param.scoped().clone());
            block.set_block_params(params);
        }

        rc.push_block(block);
        let result = t.render(r, ctx, rc, out);
        rc.pop_block();
        result
    }
}

pub static WITH_HELPER: WithHelper = WithHelper;

#[cfg(test)]
mod test {
    use crate::registry::Registry;
    use serde_json::json;

    #[test]
    fn test_with() {
        let addr = json!({"city": "Beijing", "country": "China"});
        let person = json!({
            "name": "Ning Sun",
            "age": 27,
            "addr": addr,
            "titles": ["programmer", "cartographier"]
        });

        let mut handlebars = Registry::new();
        assert!(handlebars
            .register_template_string("t0", "{{#with addr}}{{city}}{{/with}}")
            .is_ok());
        assert!(handlebars
            .register_template_string("t1", "{{#with notfound}}hello{{else}}world{{/with}}")
            .is_ok());
        assert!(handlebars
            .register_template_string("t2", "{{#with addr/country}}{{this}}{{/with}}")
            .is_ok());

        let r0 = handlebars.render("t0", &person);
        assert_eq!(r0.ok().unwrap(), "Beijing".to_string());

        let r1 = handlebars.render("t1", &person);
        assert_eq!(r1.ok().unwrap(), "world".to_string());

        let r2 = handlebars.render("t2", &person);
        assert_eq!(r2.ok().unwrap(), "China".to_string());
    }

    #[test]
    fn test_with_block_param() {
        let person = json!({"name": "Ning Sun", "addr": {"city": "Beijing"}});

        let mut handlebars = Registry::new();
        assert!(handlebars
            .register_template_string("t0", "{{#with addr as |a|}}{{a.city}}{{/with}}")
            .is_ok());
        assert!(handlebars
            .register_template_string(
                "t1",
                "{{#with addr as |a|}}{{#with ../name as |n|}}{{n}} @ {{a.city}}{{/with}}{{/with}}"
            )
            .is_ok());

        assert_eq!(handlebars.render("t0", &person).unwrap(), "Beijing");
        assert_eq!(handlebars.render("t1", &person).unwrap(), "Ning Sun @ Beijing");
    }

    #[test]
    fn test_with_in_each() {
        let people = json!([
            {"name": "Ann", "addr": {"city": "Oslo"}},
            {"name": "Bo", "addr": {"city": "Rome"}}
        ]);

        let handlebars = Registry::new();
        let t = "{{#each this}}{{#with addr}}{{../name}}:{{city}}:{{@../index}} {{/with}}{{/each}}";
        assert_eq!(
            handlebars.render_template(t, &people).unwrap(),
            "Ann:Oslo:0 Bo:Rome:1 "
        );
    }

    #[test]
    fn test_with_empty_mapping() {
        let handlebars = Registry::new();
        let data = json!({"a": {}, "c": "C"});
        assert_eq!(
            handlebars
                .render_template("{{#with a}}[{{../c}}]{{else}}none{{/with}}", &data)
                .unwrap(),
            "[C]"
        );
        assert_eq!(
            handlebars
                .render_template("{{#with missing}}[{{../c}}]{{else}}none{{/with}}", &data)
                .unwrap(),
            "none"
        );
    }
}
