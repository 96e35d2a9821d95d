use hbskit::{Delimiters, Handlebars, TemplateErrorReason};
use serde_json::json;

#[test]
fn test_inline_delimiter_switch() {
    let hbs = Handlebars::new();
    let data = json!({"a": "<1>", "b": "2"});

    assert_eq!(
        hbs.render_template("{{a}} {{=<% %>=}}<% b %> {{b}} <%{ a }%> <%& a %>", &data)
            .unwrap(),
        "&lt;1&gt; 2 {{b}} <1> <1>"
    );
    assert_eq!(
        hbs.render_template("{{=[ ]=}}[b][={{ }}=]{{b}}", &data)
            .unwrap(),
        "22"
    );
}

#[test]
fn test_standalone_delimiter_switch() {
    let hbs = Handlebars::new();
    assert_eq!(
        hbs.render_template("a\n  {{=| |=}}\n|b|\n", &json!({"b": 1}))
            .unwrap(),
        "a\n1\n"
    );
}

#[test]
fn test_registry_delimiters() {
    let mut hbs = Handlebars::new();
    hbs.set_delimiters(Delimiters::new("[[", "]]").unwrap());
    hbs.register_template_string("t", "[[#each xs]][[this]]{{this}}[[/each]]")
        .unwrap();
    assert_eq!(
        hbs.render("t", &json!({"xs": [1, 2]})).unwrap(),
        "1{{this}}2{{this}}"
    );

    let default = Delimiters::default();
    let t = hbs
        .compile_with_delimiters("{{x}}", &default)
        .unwrap();
    assert!(!std::sync::Arc::ptr_eq(&t, &hbs.compile("{{x}}").unwrap()));
}

#[test]
fn test_invalid_delimiters() {
    let hbs = Handlebars::new();
    let err = hbs.compile("{{=<%=}}").unwrap_err();
    assert!(matches!(err.reason(), TemplateErrorReason::InvalidDelimiters(_)));
    assert!(Delimiters::new("", "}}").is_none());
}
