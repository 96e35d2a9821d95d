use std::error::Error;

use hbskit::Handlebars;
use maplit::btreemap;

static BASE0: &str = r#"<html>
  <head>
    <title>{{title}}</title>
  </head>
  <body>
    <div class="page">
      {{> page}}
    </div>
    <footer>{{#> footer}}default footer{{/footer}}</footer>
  </body>
</html>
"#;

static BASE1: &str = r#"<html>
  <body>
    <h1>{{title}}</h1>
    {{#> frame}}{{> page}}{{/frame}}
  </body>
</html>
"#;

static FRAME: &str = "<section>{{> @partial-block}}</section>";

static TEMPLATE: &str = r#"{{#*inline "page"}}
<p>Rendered in partial, parent is {{parent}}</p>
<p>{{title}}</p>
{{/inline}}
{{#*inline "footer"}}footer from the page{{/inline}}
{{> (lookup this "parent")}}
"#;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    handlebars.register_partial("base0", BASE0)?;
    handlebars.register_partial("base1", BASE1)?;
    handlebars.register_partial("frame", FRAME)?;
    handlebars.register_template_string("template", TEMPLATE)?;

    let data0 = btreemap! {
        "title".to_string() => "example 0".to_string(),
        "parent".to_string() => "base0".to_string()
    };
    let data1 = btreemap! {
        "title".to_string() => "example 1".to_string(),
        "parent".to_string() => "base1".to_string()
    };

    println!("Page 0");
    println!(
        "{}",
        handlebars
            .render("template", &data0)
            .unwrap_or_else(|e| format!("{e}"))
    );
    println!("=======================================================");

    println!("Page 1");
    println!(
        "{}",
        handlebars
            .render("template", &data1)
            .unwrap_or_else(|e| format!("{e}"))
    );
    Ok(())
}
