use std::error::Error;

use hbskit::{Handlebars, Revision, Wrapper};
use serde_json::json;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    handlebars.register_template_string("a", "I'm template a.\nHello {{.}}!")?;
    handlebars.register_template_string(
        "nav",
        "<ul>{{#each links}}<li>{{> link}}</li>{{/each}}</ul>",
    )?;
    handlebars.register_partial("link", "<a href=\"{{url}}\">{{title}}</a>")?;

    println!("// native: {:?}", handlebars.render("a", &json!("world"))?);
    for revision in Revision::ALL {
        println!("// {revision}");
        println!("{}", handlebars.precompile("a", revision, Wrapper::Amd)?);
    }

    println!("// bundle");
    println!("{}", handlebars.precompile_all(Revision::V4, Wrapper::Anonymous)?);

    // constructs the external runtime cannot express are refused
    handlebars.register_template_string("layout", "{{#> base}}body{{/base}}")?;
    if let Err(e) = handlebars.precompile("layout", Revision::V4, Wrapper::None) {
        println!("// {e}");
    }
    Ok(())
}
