//! Comparison, boolean and length helpers
use std::cmp::Ordering;

use serde_json::Value as Json;

use crate::json::value::JsonTruthy;

handlebars_helper!(eq: |x: Json, y: Json| x == y);
handlebars_helper!(ne: |x: Json, y: Json| x != y);
handlebars_helper!(gt: |x: Json, y: Json| ordered(x, y, |o| o.is_gt()));
handlebars_helper!(gte: |x: Json, y: Json| ordered(x, y, |o| o.is_ge()));
handlebars_helper!(lt: |x: Json, y: Json| ordered(x, y, |o| o.is_lt()));
handlebars_helper!(lte: |x: Json, y: Json| ordered(x, y, |o| o.is_le()));
handlebars_helper!(and: |x: Json, y: Json| x.is_truthy(false) && y.is_truthy(false));
handlebars_helper!(or: |x: Json, y: Json| x.is_truthy(false) || y.is_truthy(false));
handlebars_helper!(not: |x: Json| !x.is_truthy(false));
handlebars_helper!(len: |x: Json| match x {
    Json::Array(a) => a.len(),
    Json::Object(m) => m.len(),
    Json::String(s) => s.chars().count(),
    _ => 0,
});

/// Values without an order between them compare false in every direction.
fn ordered(x: &Json, y: &Json, test: impl Fn(Ordering) -> bool) -> bool {
    compare_json(x, y).is_some_and(test)
}

fn compare_json(x: &Json, y: &Json) -> Option<Ordering> {
    // numeric strings compare as numbers against numbers
    let numeric = |j: &Json| match j {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match (x, y) {
        (Json::String(a), Json::String(b)) => Some(a.cmp(b)),
        (Json::Bool(a), Json::Bool(b)) => Some(a.cmp(b)),
        (Json::Number(_), _) | (_, Json::Number(_)) => numeric(x)?.partial_cmp(&numeric(y)?),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::registry::Registry;

    fn check(cases: &[(&str, bool)]) {
        let hbs = Registry::new();
        for (condition, expected) in cases {
            let t = format!("{{{{#if {condition}}}}}T{{{{else}}}}F{{{{/if}}}}");
            let out = hbs.render_template(&t, &json!({"n": 4, "s": "x"})).unwrap();
            assert_eq!(out == "T", *expected, "{condition}");
        }
    }

    #[test]
    fn test_equality() {
        check(&[
            ("(eq 5 5)", true),
            ("(eq 5 6)", false),
            (r#"(eq "foo" "foo")"#, true),
            (r#"(eq "foo" "Foo")"#, false),
            (r#"(eq 5 "5")"#, false),
            ("(eq missing null)", true),
            ("(eq n 4)", true),
            ("(ne 5 6)", true),
            (r#"(ne s "x")"#, false),
        ]);
    }

    #[test]
    fn test_ordering() {
        check(&[
            ("(gt 5 3)", true),
            ("(gt 3 5)", false),
            ("(gte 5 5)", true),
            ("(lt 3.3 5.5)", true),
            ("(lte 5.5 5.5)", true),
            (r#"(gt "b" "a")"#, true),
            (r#"(gte "a" "a")"#, true),
            (r#"(gt 53 "35")"#, true),
            (r#"(lt "35" 53)"#, true),
            (r#"(gte "53" 53)"#, true),
            ("(gt true false)", true),
            // no order between a string and a boolean
            (r#"(gt "a" false)"#, false),
            (r#"(lte "a" false)"#, false),
        ]);
    }

    #[test]
    fn test_boolean_ops() {
        check(&[
            ("(or (gt 3 5) (gt 5 3))", true),
            ("(and null 4)", false),
            ("(and n s)", true),
            ("(not missing)", true),
            ("(not (not n))", true),
        ]);
    }

    #[test]
    fn test_len() {
        let hbs = Registry::new();
        for (value, expected) in [
            (json!([1, 2, 3]), "3"),
            (json!({"a": 1, "b": 2}), "2"),
            (json!("tomcat"), "6"),
            (json!(3), "0"),
        ] {
            assert_eq!(
                hbs.render_template("{{len value}}", &json!({ "value": value }))
                    .unwrap(),
                expected
            );
        }
        assert_eq!(
            hbs.render_template("{{#if (gt (len xs) 1)}}many{{/if}}", &json!({"xs": [1, 2]}))
                .unwrap(),
            "many"
        );
    }
}
