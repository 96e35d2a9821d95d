use crate::context::Context;
use crate::error::RenderError;
use crate::registry::Registry;
use crate::render::{Decorator, RenderContext};

pub use self::inline::INLINE_DECORATOR;

pub type DecoratorResult = Result<(), RenderError>;

/// Decorator Definition
///
/// Implement this trait to define your own decorators. A decorator runs
/// before the template that holds it renders, and what it changes lasts
/// until the end of that template.
///
/// ## Updating frame data
///
/// In decorator, you can set `@` data variables for the current frame.
///
/// ```
/// use hbskit::*;
///
/// fn set_env<'rc>(
///     d: &Decorator<'rc>,
///     _: &'rc Handlebars,
///     _: &'rc Context,
///     rc: &mut RenderContext<'rc>,
/// ) -> Result<(), RenderError> {
///     let env = d.param(0).map(|p| p.value().clone()).unwrap_or_default();
///     if let Some(block) = rc.block_mut() {
///         block.set_local_var("env", env);
///     }
///     Ok(())
/// }
/// ```
///
/// ## Define local helper
///
/// You can override behavior of a helper from position of decorator to the end of template.
///
/// ```
/// use hbskit::*;
///
/// fn override_helper<'rc>(
///     _: &Decorator<'rc>,
///     _: &'rc Handlebars,
///     _: &'rc Context,
///     rc: &mut RenderContext<'rc>,
/// ) -> Result<(), RenderError> {
///     let new_helper = |h: &Helper<'_>, _: &Handlebars, _: &Context, rc: &mut RenderContext<'_>, out: &mut dyn Output|
///             -> Result<(), RenderError> {
///         // your helper logic
///         Ok(())
///     };
///     rc.register_local_helper("distance", Box::new(new_helper));
///     Ok(())
/// }
/// ```
///
pub trait DecoratorDef {
    fn call<'rc>(
        &self,
        d: &Decorator<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> DecoratorResult;
}

/// Implement DecoratorDef for bare function so we can use function as decorator
impl<
        F: for<'rc> Fn(&Decorator<'rc>, &'rc Registry, &'rc Context, &mut RenderContext<'rc>)
            -> DecoratorResult,
    > DecoratorDef for F
{
    fn call<'rc>(
        &self,
        d: &Decorator<'rc>,
        reg: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> DecoratorResult {
        (*self)(d, reg, ctx, rc)
    }
}

mod inline;

#[cfg(test)]
mod test {
    use crate::context::Context;
    use crate::error::{RenderError, RenderErrorReason};
    use crate::json::value::{as_string, to_json};
    use crate::output::Output;
    use crate::registry::Registry;
    use crate::render::{Decorator, Helper, RenderContext};

    #[test]
    fn test_register_decorator() {
        let mut handlebars = Registry::new();
        handlebars
            .register_template_string("t0", "{{*foo}}")
            .unwrap();

        let data = btreemap! {
            "hello".to_string() => "world".to_string()
        };

        let err = handlebars.render("t0", &data).unwrap_err();
        assert!(matches!(
            err.reason(),
            RenderErrorReason::DecoratorNotFound(name) if name == "foo"
        ));

        handlebars.register_decorator(
            "foo",
            Box::new(
                |_: &Decorator<'_>,
                 _: &Registry,
                 _: &Context,
                 _: &mut RenderContext<'_>|
                 -> Result<(), RenderError> { Ok(()) },
            ),
        );
        assert_eq!(handlebars.render("t0", &data).ok().unwrap(), "".to_string());
    }

    #[test]
    fn test_local_variable_decorator() {
        let mut handlebars = Registry::new();
        handlebars
            .register_template_string("t0", "{{*set_var \"production\"}}{{@env}}:{{hello}}")
            .unwrap();

        handlebars.register_decorator(
            "set_var",
            Box::new(
                |d: &Decorator<'_>,
                 _: &Registry,
                 _: &Context,
                 rc: &mut RenderContext<'_>|
                 -> Result<(), RenderError> {
                    let env = d.param(0).map(|p| p.value().clone()).unwrap_or_default();
                    if let Some(block) = rc.block_mut() {
                        block.set_local_var("env", env);
                    }
                    Ok(())
                },
            ),
        );

        let data = btreemap! {
            "hello".to_string() => "world".to_string()
        };
        assert_eq!(handlebars.render("t0", &data).unwrap(), "production:world");
    }

    #[test]
    fn test_local_helper_override() {
        let mut handlebars = Registry::new();
        handlebars.register_helper(
            "distance",
            Box::new(
                |h: &Helper<'_>,
                 _: &Registry,
                 _: &Context,
                 _: &mut RenderContext<'_>,
                 out: &mut dyn Output|
                 -> Result<(), RenderError> {
                    let s = format!(
                        "{}m",
                        h.param(0)
                            .as_ref()
                            .map(|v| v.value())
                            .unwrap_or(&to_json(0))
                    );
                    out.write(s.as_ref())?;
                    Ok(())
                },
            ),
        );
        handlebars.register_decorator(
            "foo",
            Box::new(
                |d: &Decorator<'_>,
                 _: &Registry,
                 _: &Context,
                 rc: &mut RenderContext<'_>|
                 -> Result<(), RenderError> {
                    let new_unit = d
                        .param(0)
                        .and_then(|v| as_string(v.value()))
                        .unwrap_or("")
                        .to_owned();
                    let new_helper = move |h: &Helper<'_>,
                                           _: &Registry,
                                           _: &Context,
                                           _: &mut RenderContext<'_>,
                                           out: &mut dyn Output|
                          -> Result<(), RenderError> {
                        let s = format!(
                            "{}{}",
                            h.param(0)
                                .as_ref()
                                .map(|v| v.value())
                                .unwrap_or(&to_json(0)),
                            new_unit
                        );
                        out.write(s.as_ref())?;
                        Ok(())
                    };

                    rc.register_local_helper("distance", Box::new(new_helper));
                    Ok(())
                },
            ),
        );
        handlebars
            .register_template_string(
                "t0",
                "{{distance 4.5}},{{*foo \"miles\"}}{{distance 10.1}},{{*bar}}{{distance 3.4}}",
            )
            .unwrap();

        handlebars.register_decorator(
            "bar",
            Box::new(
                |_: &Decorator<'_>,
                 _: &Registry,
                 _: &Context,
                 rc: &mut RenderContext<'_>|
                 -> Result<(), RenderError> {
                    rc.unregister_local_helper("distance");
                    Ok(())
                },
            ),
        );
        // decorators run before the template body, in order
        assert_eq!(
            handlebars.render("t0", &0).ok().unwrap(),
            "4.5m,10.1m,3.4m".to_owned()
        );
    }

    #[test]
    fn test_local_helper_is_scoped_to_block() {
        let mut handlebars = Registry::new();
        handlebars.register_decorator(
            "shout",
            Box::new(
                |_: &Decorator<'_>,
                 _: &Registry,
                 _: &Context,
                 rc: &mut RenderContext<'_>|
                 -> Result<(), RenderError> {
                    rc.register_local_helper(
                        "greet",
                        Box::new(
                            |_: &Helper<'_>,
                             _: &Registry,
                             _: &Context,
                             _: &mut RenderContext<'_>,
                             out: &mut dyn Output|
                             -> Result<(), RenderError> {
                                out.write("HI")?;
                                Ok(())
                            },
                        ),
                    );
                    Ok(())
                },
            ),
        );

        let t = "{{#if true}}{{*shout}}{{greet}}{{/if}}|{{greet}}";
        assert_eq!(
            handlebars.render_template(t, &btreemap! {"greet" => "hi"}).unwrap(),
            "HI|hi"
        );
    }
}
