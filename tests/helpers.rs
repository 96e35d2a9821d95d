use std::sync::Arc;

use hbskit::*;
use serde_json::json;

handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(upper: |s: str| s.to_uppercase());

#[test]
fn test_macro_helper() {
    let mut hbs = Handlebars::new();

    hbs.register_helper("lower", Box::new(lower));
    hbs.register_helper("upper", Box::new(upper));

    let data = json!("Teixeira");

    assert_eq!(
        hbs.render_template("{{lower this}}", &data).unwrap(),
        "teixeira"
    );
    assert_eq!(
        hbs.render_template("{{upper this}}", &data).unwrap(),
        "TEIXEIRA"
    );
    assert_eq!(
        hbs.render_template("{{upper (lower this)}}", &data).unwrap(),
        "TEIXEIRA"
    );
}

fn ifcond<'rc>(
    h: &Helper<'rc>,
    handle: &'rc Handlebars,
    ctx: &'rc Context,
    render_ctx: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> Result<(), RenderError> {
    let cond = h
        .param(0)
        .and_then(|v| v.value().as_bool())
        .ok_or_else(|| RenderError::new("Ifcond takes a boolean !"))?;
    let temp = if cond { h.template() } else { h.inverse() };
    match temp {
        Some(t) => t.render(handle, ctx, render_ctx, out),
        None => Ok(()),
    }
}

#[test]
fn test_function_helper() {
    let mut handlebars = Handlebars::new();
    handlebars.register_helper("ifcond", Box::new(ifcond));

    assert_eq!(
        "yes",
        handlebars
            .render_template("{{#ifcond this}}yes{{else}}no{{/ifcond}}", &true)
            .unwrap()
    );
    assert_eq!(
        "no",
        handlebars
            .render_template("{{#ifcond this}}yes{{else}}no{{/ifcond}}", &false)
            .unwrap()
    );

    let err = handlebars
        .render_template("{{#ifcond this}}yes{{/ifcond}}", &"x")
        .unwrap_err();
    assert!(matches!(
        err.reason(),
        RenderErrorReason::HelperInvocation { name, .. } if name == "ifcond"
    ));
}

fn dump<'rc>(
    h: &Helper<'rc>,
    _: &'rc Handlebars,
    _: &'rc Context,
    _: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let result = h
        .params()
        .iter()
        .map(|p| p.value().render())
        .collect::<Vec<String>>()
        .join(", ");
    out.write(&result)?;

    Ok(())
}

#[test]
fn test_helper_with_space_param() {
    let mut r = Handlebars::new();
    r.register_helper("echo", Box::new(dump));

    let s = r
        .render_template(
            "Output: {{echo \"Mozilla Firefox\" \"Google Chrome\"}}",
            &json!({}),
        )
        .unwrap();
    assert_eq!(s, "Output: Mozilla Firefox, Google Chrome".to_owned());
}

struct HelperWithSharedData(Arc<String>);

impl HelperDef for HelperWithSharedData {
    fn call<'rc>(
        &self,
        _: &Helper<'rc>,
        _: &'rc Handlebars,
        _: &'rc Context,
        _: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        out.write(&self.0).map_err(RenderError::from)
    }
}

#[test]
fn test_helper_with_shared_data() {
    let mut r = Handlebars::new();
    let s = Arc::new("hello helper".to_owned());
    r.register_helper("hello", Box::new(HelperWithSharedData(s.clone())));

    let out = r.render_template("Output: {{hello}}", &json!({})).unwrap();
    assert_eq!(out, format!("Output: {s}"));
}

#[test]
fn test_helper_overwrite_on_duplicate() {
    let mut r = Handlebars::new();
    r.register_helper("greet", Box::new(lower));
    r.register_helper("greet", Box::new(upper));
    assert_eq!(r.render_template("{{greet \"Hi\"}}", &()).unwrap(), "HI");
}

#[test]
fn test_helper_missing_hook() {
    let mut r = Handlebars::new();
    assert_eq!(r.render_template("[{{nope 1}}]", &json!({})).unwrap(), "[]");

    r.register_helper(
        "helperMissing",
        Box::new(
            |h: &Helper<'_>,
             _: &Handlebars,
             _: &Context,
             _: &mut RenderContext<'_>,
             out: &mut dyn Output|
             -> HelperResult {
                out.write(&format!("missing {}", h.name()))?;
                Ok(())
            },
        ),
    );
    assert_eq!(
        r.render_template("[{{nope 1}}]", &json!({})).unwrap(),
        "[missing nope]"
    );
}
