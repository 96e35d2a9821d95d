//! Helpers written in rhai.
//!
//! A script helper sees the current context, positional params, hash
//! arguments and an `options` object. `options.render()` and
//! `options.inverse()` render the block bodies, optionally against another
//! context, and return plain strings. Returning `safe(text)` marks the
//! result as pre-escaped.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rhai::{Array, Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use serde_json::value::Value as Json;

use crate::block::BlockContext;
use crate::context::Context;
use crate::error::{RenderError, RenderErrorReason, ScriptError};
use crate::helpers::{HelperDef, HelperResult};
use crate::json::value::ScopedJson;
use crate::output::Output;
use crate::registry::Registry;
use crate::render::{FrameSnapshot, Helper, RenderContext, Renderable};
use crate::support::str::escape_html;
use crate::template::Template;

/// Text the script has already escaped.
#[derive(Debug, Clone)]
pub struct SafeText(pub String);

/// Everything a block continuation needs once the render borrow is gone.
struct Continuation {
    registry: Registry,
    root: Json,
    frames: Vec<FrameSnapshot>,
    partials: BTreeMap<String, Template>,
    partial_stack: Vec<String>,
    partial_blocks: Vec<Template>,
    current_template: Option<String>,
    template: Option<Template>,
    inverse: Option<Template>,
    /// first render failure, raised again once the script unwinds
    failure: Mutex<Option<RenderError>>,
}

impl Continuation {
    fn capture<'rc>(
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &RenderContext<'rc>,
    ) -> Continuation {
        Continuation {
            registry: r.clone(),
            root: ctx.data().clone(),
            frames: rc.snapshot_frames(),
            partials: rc
                .inline_partials()
                .iter()
                .map(|(k, t)| (k.clone(), (*t).clone()))
                .collect(),
            partial_stack: rc.partial_stack().to_vec(),
            partial_blocks: rc.partial_blocks().iter().map(|t| (*t).clone()).collect(),
            current_template: rc.get_current_template_name().cloned(),
            template: h.template().cloned(),
            inverse: h.inverse().cloned(),
            failure: Mutex::new(None),
        }
    }

    fn render(&self, inverse: bool, ctx: Option<Json>) -> Result<String, RenderError> {
        let body = if inverse { &self.inverse } else { &self.template };
        let Some(t) = body else {
            return Ok(String::new());
        };

        let context = Context::from(self.root.clone());
        let mut rc = RenderContext::new(None);
        rc.restore_frames(&self.frames);
        rc.restore_partials(&self.partial_stack, &self.partial_blocks);
        rc.set_current_template_name(self.current_template.as_ref());
        for (name, p) in &self.partials {
            rc.set_partial(name.clone(), p);
        }
        if let Some(c) = ctx {
            rc.push_block(BlockContext::with_value(ScopedJson::Derived(c)));
        }
        t.renders(&self.registry, &context, &mut rc)
    }

    /// Keep the first failure for the helper to report. rhai only sees its
    /// message.
    fn fail(&self, e: RenderError) -> Box<EvalAltResult> {
        let message = e.to_string();
        if let Ok(mut slot) = self.failure.lock() {
            if slot.is_none() {
                *slot = Some(e);
            }
        }
        message.into()
    }

    fn take_failure(&self) -> Option<RenderError> {
        self.failure.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// The `options` object handed to scripts.
#[derive(Clone)]
pub struct ScriptOptions {
    name: String,
    params: Array,
    hash: Map,
    continuation: Option<Arc<Continuation>>,
}

impl ScriptOptions {
    fn render(&mut self, inverse: bool, ctx: Option<Dynamic>) -> Result<String, Box<EvalAltResult>> {
        let Some(cont) = &self.continuation else {
            return Ok(String::new());
        };
        let ctx = match ctx {
            Some(d) => Some(rhai::serde::from_dynamic::<Json>(&d)?),
            None => None,
        };
        cont.render(inverse, ctx).map_err(|e| cont.fail(e))
    }
}

/// The engine every script helper of a registry runs on.
pub(crate) fn new_engine() -> Engine {
    let mut engine = Engine::new();

    engine
        .register_type_with_name::<SafeText>("SafeString")
        .register_fn("safe", |s: &str| SafeText(s.to_owned()))
        .register_fn("to_string", |s: &mut SafeText| s.0.clone())
        .register_fn("escape", |s: &str| escape_html(s));

    engine
        .register_type_with_name::<ScriptOptions>("Options")
        .register_get("name", |o: &mut ScriptOptions| o.name.clone())
        .register_get("params", |o: &mut ScriptOptions| o.params.clone())
        .register_get("hash", |o: &mut ScriptOptions| o.hash.clone())
        .register_fn("render", |o: &mut ScriptOptions| o.render(false, None))
        .register_fn("render", |o: &mut ScriptOptions, ctx: Dynamic| {
            o.render(false, Some(ctx))
        })
        .register_fn("inverse", |o: &mut ScriptOptions| o.render(true, None))
        .register_fn("inverse", |o: &mut ScriptOptions, ctx: Dynamic| {
            o.render(true, Some(ctx))
        });

    engine
}

enum Entry {
    /// the whole script is the helper body
    Body,
    /// a named `fn name(context, options)` of the script
    Function(String),
}

pub(crate) struct ScriptHelper {
    engine: Arc<Engine>,
    ast: Arc<AST>,
    entry: Entry,
}

impl ScriptHelper {
    pub(crate) fn body(engine: Arc<Engine>, source: &str) -> Result<ScriptHelper, ScriptError> {
        let ast = engine.compile(source)?;
        Ok(ScriptHelper {
            engine,
            ast: Arc::new(ast),
            entry: Entry::Body,
        })
    }

    /// One helper per two-argument function the script defines.
    pub(crate) fn functions(
        engine: Arc<Engine>,
        source: &str,
    ) -> Result<Vec<(String, ScriptHelper)>, ScriptError> {
        let ast = Arc::new(engine.compile(source)?);
        let mut helpers = Vec::new();
        for f in ast.iter_functions() {
            if f.params.len() != 2 {
                debug!("skipping script function {} with {} params", f.name, f.params.len());
                continue;
            }
            helpers.push((
                f.name.to_owned(),
                ScriptHelper {
                    engine: engine.clone(),
                    ast: ast.clone(),
                    entry: Entry::Function(f.name.to_owned()),
                },
            ));
        }
        if helpers.is_empty() {
            return Err(ScriptError::NoHelperFunction);
        }
        Ok(helpers)
    }

    fn eval<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        let this = to_dynamic(rc.this(ctx).as_json())?;
        let mut params = Array::new();
        for p in h.params() {
            params.push(to_dynamic(p.value())?);
        }
        let mut hash = Map::new();
        for (k, v) in h.hash() {
            hash.insert((*k).into(), to_dynamic(v.value())?);
        }

        let continuation = h
            .is_block()
            .then(|| Arc::new(Continuation::capture(h, r, ctx, rc)));
        let options = ScriptOptions {
            name: h.name().to_owned(),
            params: params.clone(),
            hash: hash.clone(),
            continuation: continuation.clone(),
        };

        let mut scope = Scope::new();
        let result = match &self.entry {
            Entry::Body => {
                scope.push("context", this);
                scope.push("params", params);
                scope.push("hash", hash);
                scope.push("options", options);
                self.engine
                    .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            }
            Entry::Function(name) => {
                self.engine
                    .call_fn::<Dynamic>(&mut scope, &self.ast, name, (this, options))
            }
        };

        match result {
            Ok(d) => from_dynamic(d),
            Err(e) => {
                // a failed body render is reported as it is, not as a script fault
                if let Some(nested) = continuation.as_ref().and_then(|c| c.take_failure()) {
                    debug!("script helper {} stopped on a body render error", h.name());
                    return Err(nested);
                }
                warn!("script helper {} failed: {e}", h.name());
                Err(RenderErrorReason::ScriptError(e.to_string()).into())
            }
        }
    }
}

fn to_dynamic(j: &Json) -> Result<Dynamic, RenderError> {
    rhai::serde::to_dynamic(j).map_err(|e| RenderErrorReason::ScriptError(e.to_string()).into())
}

fn from_dynamic<'rc>(d: Dynamic) -> Result<ScopedJson<'rc>, RenderError> {
    if d.is::<SafeText>() {
        return Ok(ScopedJson::safe(d.cast::<SafeText>().0));
    }
    let j = rhai::serde::from_dynamic::<Json>(&d)
        .map_err(|e| RenderErrorReason::ScriptError(e.to_string()))?;
    Ok(ScopedJson::Derived(j))
}

impl HelperDef for ScriptHelper {
    fn call_inner<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.eval(h, r, ctx, rc)
    }

    fn call<'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'rc Registry,
        ctx: &'rc Context,
        rc: &mut RenderContext<'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let value = self.eval(h, r, ctx, rc)?;
        if r.strict_mode() && value.is_missing() {
            return Err(RenderErrorReason::MissingVariable(None).into());
        }
        // block results are markup built from rendered bodies
        let text = value.render();
        if h.is_block() || value.is_safe() || rc.is_disable_escape() {
            out.write(&text)?;
        } else {
            out.write(&r.get_escape_fn()(&text))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::context::Context;
    use crate::error::{RenderError, RenderErrorReason};
    use crate::helpers::HelperResult;
    use crate::output::Output;
    use crate::registry::Registry;
    use crate::render::{Helper, RenderContext};
    use serde_json::json;

    #[test]
    fn test_script_helper_value() {
        let mut hbs = Registry::new();
        hbs.register_script_helper("plus", "params[0] + params[1]")
            .unwrap();
        hbs.register_script_helper("shout", "params[0].to_upper() + hash.mark")
            .unwrap();

        let data = json!({"a": 2, "b": 3, "word": "hi"});
        assert_eq!(hbs.render_template("{{plus a b}}", &data).unwrap(), "5");
        assert_eq!(
            hbs.render_template("{{shout word mark=\"<!>\"}}", &data).unwrap(),
            "HI&lt;!&gt;"
        );
        assert_eq!(
            hbs.render_template("{{#if (plus a b)}}yes{{/if}}", &data).unwrap(),
            "yes"
        );
    }

    #[test]
    fn test_script_sees_context_and_structures() {
        let mut hbs = Registry::new();
        hbs.register_script_helper("names", r#"
            let out = [];
            for p in params[0] { out.push(p.name); }
            out.len().to_string() + ":" + context.title
        "#)
        .unwrap();
        let data = json!({"title": "t", "people": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(
            hbs.render_template("{{names people}}", &data).unwrap(),
            "2:t"
        );
    }

    fn native_link(
        h: &Helper<'_>,
        _: &Registry,
        _: &Context,
        _: &mut RenderContext<'_>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let v = h.param(0).map(|p| p.value().clone()).unwrap_or_default();
        let name = v["name"].as_str().unwrap_or("");
        let url = v["url"].as_str().unwrap_or("");
        out.write(&format!(
            "<a href=\"{}\">{}</a>",
            crate::support::str::escape_html(url),
            crate::support::str::escape_html(name)
        ))?;
        Ok(())
    }

    #[test]
    fn test_script_link_matches_native() {
        let mut hbs = Registry::new();
        hbs.register_helper("native", Box::new(native_link));
        hbs.register_script_helper(
            "scripted",
            r#"safe("<a href=\"" + escape(params[0].url) + "\">" + escape(params[0].name) + "</a>")"#,
        )
        .unwrap();

        let data = json!({"link": {"name": "R&D", "url": "/r?d=1"}});
        let native = hbs.render_template("{{native link}}", &data).unwrap();
        let scripted = hbs.render_template("{{scripted link}}", &data).unwrap();
        assert_eq!(native, "<a href=\"/r?d&#x3D;1\">R&amp;D</a>");
        assert_eq!(native, scripted);
    }

    #[test]
    fn test_script_block_continuations() {
        let mut hbs = Registry::new();
        hbs.register_script_helpers(
            r#"
            fn list(context, options) {
                let items = options.params[0];
                if items.len() == 0 {
                    return options.inverse();
                }
                let out = "<ul>";
                for item in items {
                    out += "<li>" + options.render(item) + "</li>";
                }
                out + "</ul>"
            }

            fn unused(x) { x }
            "#,
        )
        .unwrap();

        let t = "{{#list items}}{{.}}{{else}}<p>empty</p>{{/list}}";
        assert_eq!(
            hbs.render_template(t, &json!({"items": []})).unwrap(),
            "<p>empty</p>"
        );
        assert_eq!(
            hbs.render_template(t, &json!({"items": ["x"]})).unwrap(),
            "<ul><li>x</li></ul>"
        );
        assert!(hbs.get_helper("unused").is_none());
    }

    #[test]
    fn test_continuation_keeps_frames() {
        let mut hbs = Registry::new();
        hbs.register_script_helpers(
            "fn twice(context, options) { options.render() + options.render() }",
        )
        .unwrap();
        let t = "{{#each rows}}{{#twice}}{{@index}}{{../sep}}{{name}}{{/twice}}{{/each}}";
        let data = json!({"sep": "-", "rows": [{"name": "a"}, {"name": "b"}]});
        assert_eq!(hbs.render_template(t, &data).unwrap(), "0-a0-a1-b1-b");
    }

    #[test]
    fn test_script_errors() {
        let mut hbs = Registry::new();
        assert!(hbs.register_script_helper("bad", "let = ;").is_err());
        assert!(hbs.register_script_helpers("let x = 1;").is_err());

        hbs.register_script_helper("boom", "throw \"kaput\"").unwrap();
        let err = hbs.render_template("{{boom}}", &json!({})).unwrap_err();
        match err.reason() {
            RenderErrorReason::HelperInvocation { name, cause } => {
                assert_eq!(name, "boom");
                assert!(matches!(
                    cause.reason(),
                    RenderErrorReason::ScriptError(msg) if msg.contains("kaput")
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    fn wrapping_registry() -> Registry {
        let mut hbs = Registry::new();
        hbs.register_script_helpers("fn wrap(context, options) { options.render() }")
            .unwrap();
        hbs
    }

    #[test]
    fn test_self_inclusion_through_script_block() {
        let mut hbs = wrapping_registry();
        hbs.register_partial("self", "x{{#wrap}}{{> self}}{{/wrap}}")
            .unwrap();
        let err = hbs.render_template("{{> self}}", &json!({})).unwrap_err();
        assert!(matches!(
            err.reason(),
            RenderErrorReason::RecursionLimitExceeded { name, depth: 1 } if name == "self"
        ));

        // the depth ceiling holds across continuations as well
        hbs.set_recursive_partials(true);
        hbs.set_max_partial_depth(4);
        let err = hbs.render_template("{{> self}}", &json!({})).unwrap_err();
        assert!(matches!(
            err.reason(),
            RenderErrorReason::RecursionLimitExceeded { depth: 4, .. }
        ));
    }

    #[test]
    fn test_partial_block_inside_script_block() {
        let mut hbs = wrapping_registry();
        hbs.register_partial("layout", "<{{#wrap}}{{> @partial-block}}{{/wrap}}>")
            .unwrap();
        assert_eq!(
            hbs.render_template("{{#> layout}}body{{/layout}}", &json!({}))
                .unwrap(),
            "<body>"
        );
    }

    #[test]
    fn test_body_errors_pass_through_script_block() {
        let hbs = wrapping_registry();
        let err = hbs
            .render_template("{{#wrap}}{{> nowhere}}{{/wrap}}", &json!({}))
            .unwrap_err();
        assert!(matches!(
            err.reason(),
            RenderErrorReason::PartialNotFound(name) if name == "nowhere"
        ));

        // a failing native helper in the body keeps its own name
        let mut hbs = wrapping_registry();
        hbs.register_helper(
            "fail",
            Box::new(
                |_: &Helper<'_>,
                 _: &Registry,
                 _: &Context,
                 _: &mut RenderContext<'_>,
                 _: &mut dyn Output|
                 -> HelperResult { Err(RenderError::new("out of stock")) },
            ),
        );
        let err = hbs
            .render_template("{{#wrap}}{{fail}}{{/wrap}}", &json!({}))
            .unwrap_err();
        match err.reason() {
            RenderErrorReason::HelperInvocation { name, cause } => {
                assert_eq!(name, "fail");
                assert!(matches!(
                    cause.reason(),
                    RenderErrorReason::Other(msg) if msg == "out of stock"
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_omitted_params_are_absent() {
        let mut hbs = Registry::new();
        hbs.register_script_helper("count", "params.len()").unwrap();
        let data = json!({"a": null});
        assert_eq!(hbs.render_template("{{count}}", &data).unwrap(), "0");
        assert_eq!(hbs.render_template("{{count a}}", &data).unwrap(), "1");
    }
}
