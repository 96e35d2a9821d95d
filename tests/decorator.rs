use hbskit::*;
use serde_json::json;

fn tag_frame(
    d: &Decorator<'_>,
    _: &Handlebars,
    _: &Context,
    rc: &mut RenderContext<'_>,
) -> Result<(), RenderError> {
    let tag = d
        .param(0)
        .map(|p| p.value().clone())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("tag", 0))?;
    match rc.block_mut() {
        Some(block) => {
            block.set_local_var("tag", tag);
            Ok(())
        }
        None => Err(RenderError::new("no frame to tag")),
    }
}

#[test]
fn test_deep_decorator() {
    let mut r = Handlebars::new();
    r.register_decorator("tag", Box::new(tag_frame));
    let root = json!({"child": {"inner_child": {"list": ["list"]}}});

    // the inner partial tags its own frame, the outer one never sees it
    let template = r#"{{#*inline "child"}}{{> innerchild inner_child}}[{{@tag}}]{{/inline}}{{#*inline "innerchild"}}{{*tag "value"}}{{list}}:{{@tag}}{{/inline}}{{> child child}}"#;
    assert_eq!(
        "list:value[]",
        &r.render_template(template, &root).unwrap()
    );
}

#[test]
fn test_decorator_errors_abort_render() {
    let mut r = Handlebars::new();
    r.register_decorator("tag", Box::new(tag_frame));

    let err = r.render_template("before {{*tag}}", &json!({})).unwrap_err();
    assert!(matches!(
        err.reason(),
        RenderErrorReason::ParamNotFoundForIndex("tag", 0)
    ));
}

#[test]
fn test_decorator_registers_local_helper() {
    let mut r = Handlebars::new();
    r.register_decorator(
        "shout",
        Box::new(
            |_: &Decorator<'_>,
             _: &Handlebars,
             _: &Context,
             rc: &mut RenderContext<'_>|
             -> Result<(), RenderError> {
                rc.register_local_helper(
                    "say",
                    Box::new(
                        |h: &Helper<'_>,
                         _: &Handlebars,
                         _: &Context,
                         _: &mut RenderContext<'_>,
                         out: &mut dyn Output|
                         -> HelperResult {
                            let word = h.param(0).map(|p| p.render()).unwrap_or_default();
                            out.write(&format!("{}!", word.to_uppercase()))?;
                            Ok(())
                        },
                    ),
                );
                Ok(())
            },
        ),
    );

    assert_eq!(
        r.render_template("{{*shout}}{{say word}}", &json!({"word": "hey"}))
            .unwrap(),
        "HEY!"
    );
}
