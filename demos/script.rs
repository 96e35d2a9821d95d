use std::error::Error;

use hbskit::Handlebars;
use serde_json::json;

static TEMPLATE: &str = r#"{{#each this}}
Round {{@index}}:
{{#each this}}
  {{name}} {{score goals}}{{#if @first}} - {{/if}}
{{/each}}
{{#goal_list this}}{{.}} {{else}}no goals{{/goal_list}}
{{/each}}
"#;

static HELPERS: &str = r#"
// every goal of both teams, flattened
fn goal_list(context, options) {
    let out = "";
    for team in options.params[0] {
        for g in team.goals {
            out += options.render(g);
        }
    }
    if out == "" { options.inverse() } else { out }
}
"#;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    handlebars.register_template_string("tpl", TEMPLATE)?;
    handlebars.register_script_helper("score", "params[0].len()")?;
    let names = handlebars.register_script_helpers(HELPERS)?;
    println!("script helpers: {names:?}");

    let data = json! {[
        [{
            "name": "Dortmund",
            "goals": ["Haaland", "Guerreiro", "Hazard", "Guerreiro"]
        }, {
            "name": "Schalke",
            "goals": []
        }],
        [{
            "name": "RB Leipzig",
            "goals": ["Poulsen"]
        }, {
            "name": "SC Feriburg",
            "goals": ["Gulde"]
        }],
        [{
            "name": "Mainz",
            "goals": []
        }, {
            "name": "Koeln",
            "goals": []
        }]
    ]};

    println!("{}", handlebars.render("tpl", &data)?);
    Ok(())
}
