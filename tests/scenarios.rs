use hbskit::*;
use serde_json::{json, Value as Json};

fn list<'rc>(
    h: &Helper<'rc>,
    r: &'rc Handlebars,
    ctx: &'rc Context,
    rc: &mut RenderContext<'rc>,
    out: &mut dyn Output,
) -> HelperResult {
    let items = h.param(0).map(|p| p.value().clone()).unwrap_or(Json::Null);
    match items {
        Json::Array(items) if !items.is_empty() => {
            out.write("<ul>")?;
            for item in items {
                let li = h.render_fn(r, ctx, rc, Some(ScopedJson::Derived(item)))?;
                out.write(&li)?;
            }
            out.write("</ul>")?;
        }
        _ => {
            let inverse = h.render_inverse(r, ctx, rc, None)?;
            out.write(&inverse)?;
        }
    }
    Ok(())
}

#[test]
fn test_hello_world() {
    let mut hbs = Handlebars::new();
    hbs.register_template_string("root", "Hello {{.}}!").unwrap();
    assert_eq!(hbs.render("root", &"world").unwrap(), "Hello world!");
}

#[test]
fn test_list_block_helper_branches() {
    let mut hbs = Handlebars::new();
    hbs.register_helper("list", Box::new(list));
    let t = "{{#list items}}<li>{{.}}</li>{{else}}<p>empty</p>{{/list}}";

    assert_eq!(
        hbs.render_template(t, &json!({"items": []})).unwrap(),
        "<p>empty</p>"
    );
    assert_eq!(
        hbs.render_template(t, &json!({"items": ["x"]})).unwrap(),
        "<ul><li>x</li></ul>"
    );
    assert_eq!(
        hbs.render_template(t, &json!({"items": ["<b>", "y"]})).unwrap(),
        "<ul><li>&lt;b&gt;</li><li>y</li></ul>"
    );
}

#[test]
fn test_each_fires_exactly_one_branch() {
    let hbs = Handlebars::new();
    let t = "{{#each xs}}[main {{@index}}]{{else}}[inverse]{{/each}}";
    for (data, expected) in [
        (json!({"xs": []}), "[inverse]"),
        (json!({}), "[inverse]"),
        (json!({"xs": {}}), "[inverse]"),
        (json!({"xs": [1]}), "[main 0]"),
        (json!({"xs": [1, 2]}), "[main 0][main 1]"),
        (json!({"xs": {"a": 1}}), "[main 0]"),
    ] {
        assert_eq!(hbs.render_template(t, &data).unwrap(), expected, "{data}");
    }
}

#[test]
fn test_path_ascension() {
    let hbs = Handlebars::new();
    let data = json!({
        "name": "root",
        "a": {"name": "A", "b": {"name": "B"}}
    });
    let t = "{{#with a}}{{#with b}}{{name}}|{{../name}}|{{../../name}}|{{../../../name}}{{/with}}{{/with}}";
    assert_eq!(hbs.render_template(t, &data).unwrap(), "B|A|root|");
    assert_eq!(
        hbs.render_template("{{#with a}}{{@root.name}}:{{this.name}}{{/with}}", &data)
            .unwrap(),
        "root:A"
    );
}

#[test]
fn test_parent_scope_lookup() {
    let mut hbs = Handlebars::new();
    let data = json!({"title": "T", "items": [{"n": 1}]});
    let t = "{{#each items}}{{n}}{{title}}{{/each}}";
    assert_eq!(hbs.render_template(t, &data).unwrap(), "1");

    hbs.set_parent_scope_lookup(true);
    assert_eq!(hbs.render_template(t, &data).unwrap(), "1T");
}

#[test]
fn test_partial_self_inclusion() {
    let mut hbs = Handlebars::new();
    hbs.register_partial("direct", "x{{> direct}}").unwrap();
    hbs.register_partial("ping", "{{> pong}}").unwrap();
    hbs.register_partial("pong", "{{> ping}}").unwrap();

    for t in ["{{> direct}}", "{{> ping}}"] {
        let err = hbs.render_template(t, &json!({})).unwrap_err();
        assert!(
            matches!(err.reason(), RenderErrorReason::RecursionLimitExceeded { .. }),
            "{t}: {err}"
        );
    }
}

#[test]
fn test_recursion_through_block_helper_is_not_wrapped() {
    let mut hbs = Handlebars::new();
    hbs.register_partial("loop", "{{#each xs}}{{> loop}}{{/each}}").unwrap();
    let err = hbs
        .render_template("{{> loop}}", &json!({"xs": [1]}))
        .unwrap_err();
    assert!(matches!(
        err.reason(),
        RenderErrorReason::RecursionLimitExceeded { name, .. } if name == "loop"
    ));
}

#[test]
fn test_missing_partial_in_partial_block_uses_default() {
    let mut hbs = Handlebars::new();
    assert_eq!(
        hbs.render_template("{{#> missing}}fallback{{/missing}}", &json!({}))
            .unwrap(),
        "fallback"
    );
    assert!(matches!(
        hbs.render_template("{{> missing}}", &json!({})).unwrap_err().reason(),
        RenderErrorReason::PartialNotFound(name) if name == "missing"
    ));

    hbs.register_partial("layout", "<main>{{> @partial-block}}</main>")
        .unwrap();
    assert_eq!(
        hbs.render_template("{{#> layout}}{{body}}{{/layout}}", &json!({"body": "hi"}))
            .unwrap(),
        "<main>hi</main>"
    );
}

#[test]
fn test_render_is_deterministic() {
    let hbs = Handlebars::new();
    let t = "{{#each m}}{{@key}}={{this}};{{/each}}";
    let data = json!({"m": {"b": 2, "a": 1, "c": [1, 2]}});
    let first = hbs.render_template(t, &data).unwrap();
    for _ in 0..10 {
        assert_eq!(hbs.render_template(t, &data).unwrap(), first);
    }
}

#[test]
fn test_syntax_errors_are_fatal() {
    let mut hbs = Handlebars::new();
    let err = hbs
        .register_template_string("bad", "line one\n{{#if x}}never closed")
        .unwrap_err();
    assert_eq!(err.template_name.as_deref(), Some("bad"));
    assert!(matches!(err.reason(), TemplateErrorReason::UnclosedBlock(_)));
    assert!(!hbs.has_template("bad"));

    let err = hbs.render_template("{{#if}}{{/each}}", &json!({})).unwrap_err();
    assert!(matches!(err.reason(), RenderErrorReason::TemplateError(_)));
}

#[test]
fn test_raw_block_and_comments() {
    let hbs = Handlebars::new();
    assert_eq!(
        hbs.render_template(
            "{{{{raw}}}}{{not parsed}}{{{{/raw}}}}{{! short }}{{!-- long }} --}}!",
            &json!({})
        )
        .unwrap(),
        "{{not parsed}}!"
    );
}

#[test]
fn test_chained_else() {
    let hbs = Handlebars::new();
    let t = "{{#if a}}A{{else if b}}B{{else each c}}{{this}}{{else}}none{{/if}}";
    assert_eq!(hbs.render_template(t, &json!({"a": 1})).unwrap(), "A");
    assert_eq!(hbs.render_template(t, &json!({"b": 1})).unwrap(), "B");
    assert_eq!(hbs.render_template(t, &json!({"c": [1, 2]})).unwrap(), "12");
    assert_eq!(hbs.render_template(t, &json!({})).unwrap(), "none");
}

#[test]
fn test_partial_in_each_with_block_param_context() {
    let mut hbs = Handlebars::new();
    hbs.register_partial("line", "{{sku}}x{{qty}};").unwrap();
    let data = json!({"orders": [{"sku": "a1", "qty": 2}, {"sku": "b2", "qty": 1}]});
    assert_eq!(
        hbs.render_template("{{#each orders as |o|}}{{> line o}}{{/each}}", &data)
            .unwrap(),
        "a1x2;b2x1;"
    );
}

#[test]
fn test_root_inside_partial_inside_each() {
    let mut hbs = Handlebars::new();
    hbs.register_partial("price", "{{amount}}{{@root.currency}} ")
        .unwrap();
    let data = json!({"currency": "EUR", "items": [{"amount": 3}, {"amount": 5}]});
    assert_eq!(
        hbs.render_template("{{#each items}}{{> price}}{{/each}}", &data)
            .unwrap(),
        "3EUR 5EUR "
    );
}

#[test]
fn test_block_param_pairs() {
    let hbs = Handlebars::new();
    assert_eq!(
        hbs.render_template(
            "{{#each scores as |v k|}}{{k}}={{v}};{{/each}}",
            &json!({"scores": {"a": 1, "b": 2}})
        )
        .unwrap(),
        "a=1;b=2;"
    );
    assert_eq!(
        hbs.render_template(
            "{{#each rows as |r i|}}{{#each r as |c j|}}{{i}}.{{j}}={{c}} {{/each}}{{/each}}",
            &json!({"rows": [["x", "y"], ["z"]]})
        )
        .unwrap(),
        "0.0=x 0.1=y 1.0=z "
    );
}

#[test]
fn test_inline_override_is_scoped_to_partial_block() {
    let mut hbs = Handlebars::new();
    hbs.register_partial("card", "[{{#> title}}default{{/title}}]")
        .unwrap();
    let t = r#"{{> card}}{{#> card}}{{#*inline "title"}}custom{{/inline}}{{/card}}{{> card}}"#;
    assert_eq!(
        hbs.render_template(t, &json!({})).unwrap(),
        "[default][custom][default]"
    );
}

