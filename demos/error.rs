use std::error::Error;

use hbskit::{Handlebars, RenderErrorReason};
use serde_json::json;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    // an invalid template
    if let Err(e) = handlebars.register_template_string(
        "error",
        "<h1>{{title}}</h1>\n{{#each items}}\n  {{name}}\n{{/if}}\n",
    ) {
        println!("{e}");
    }

    // template not found
    if let Err(e) = handlebars.render("notfound", &json!({})) {
        println!("{e}");
    }

    // strict mode
    handlebars.set_strict_mode(true);
    if let Err(e) = handlebars.render_template("Hi {{user.name}}", &json!({"user": {}})) {
        println!("{e}");
    }
    handlebars.set_strict_mode(false);

    // a partial including itself
    handlebars.register_partial("again", "{{> again}}")?;
    match handlebars.render_template("{{> again}}", &json!({})) {
        Err(e) => match e.reason() {
            RenderErrorReason::RecursionLimitExceeded { name, depth } => {
                println!("partial {name} recursed at depth {depth}")
            }
            other => println!("{other}"),
        },
        Ok(s) => println!("unexpected output {s:?}"),
    }

    // a failing helper
    handlebars.register_helper(
        "fails",
        Box::new(
            |_: &hbskit::Helper<'_>,
             _: &Handlebars,
             _: &hbskit::Context,
             _: &mut hbskit::RenderContext<'_>,
             _: &mut dyn hbskit::Output|
             -> hbskit::HelperResult { Err(hbskit::RenderError::new("no luck")) },
        ),
    );
    if let Err(e) = handlebars.render_template("line 1\n  {{fails}}", &json!({})) {
        println!("{e}");
        if let Some(cause) = e.source() {
            println!("  caused by: {cause}");
        }
    }
    Ok(())
}
