use std::error::Error;

use hbskit::{
    to_json, Context, Decorator, Handlebars, Helper, HelperResult, JsonRender, Output,
    RenderContext, RenderError,
};
use serde_derive::Serialize;
use serde_json::value::{Map, Value as Json};

static TABLE: &str = r#"<table>
{{#each teams}}
  <tr><td>{{name}}</td><td>{{format pts}}</td></tr>
{{/each}}
</table>
{{*format_suffix "points"}}
<p>{{*locale "zh"}}{{@locale}}: {{format total}}</p>
"#;

// default format helper
fn format_helper(
    h: &Helper<'_>,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext<'_>,
    out: &mut dyn Output,
) -> HelperResult {
    let param = h
        .param(0)
        .ok_or_else(|| RenderError::new("Param 0 is required for format helper."))?;
    out.write(&format!("{} pts", param.value().render()))?;
    Ok(())
}

// swaps the format helper for the rest of the template
fn format_decorator(
    d: &Decorator<'_>,
    _: &Handlebars,
    _: &Context,
    rc: &mut RenderContext<'_>,
) -> Result<(), RenderError> {
    let suffix = d.param(0).map(|v| v.value().render()).unwrap_or_default();
    rc.register_local_helper(
        "format",
        Box::new(
            move |h: &Helper<'_>,
                  _: &Handlebars,
                  _: &Context,
                  _: &mut RenderContext<'_>,
                  out: &mut dyn Output|
                  -> HelperResult {
                let param = h
                    .param(0)
                    .ok_or_else(|| RenderError::new("Param 0 is required for format helper."))?;
                out.write(&format!("{} {}", param.value().render(), suffix))?;
                Ok(())
            },
        ),
    );
    Ok(())
}

fn locale_decorator(
    d: &Decorator<'_>,
    _: &Handlebars,
    _: &Context,
    rc: &mut RenderContext<'_>,
) -> Result<(), RenderError> {
    let locale = d.param(0).map(|v| v.value().clone()).unwrap_or(Json::Null);
    if let Some(block) = rc.block_mut() {
        block.set_local_var("locale", locale);
    }
    Ok(())
}

#[derive(Serialize)]
pub struct Team {
    name: String,
    pts: u16,
}

pub fn make_data() -> Map<String, Json> {
    let teams = vec![
        Team {
            name: "Jiangsu Suning".to_string(),
            pts: 43u16,
        },
        Team {
            name: "Shanghai SIPG".to_string(),
            pts: 39u16,
        },
        Team {
            name: "Hebei CFFC".to_string(),
            pts: 27u16,
        },
    ];
    let total: u16 = teams.iter().map(|t| t.pts).sum();

    let mut data = Map::new();
    data.insert("teams".to_string(), to_json(&teams));
    data.insert("total".to_string(), to_json(total));
    data
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    handlebars.register_template_string("table", TABLE)?;
    handlebars.register_helper("format", Box::new(format_helper));
    handlebars.register_decorator("format_suffix", Box::new(format_decorator));
    handlebars.register_decorator("locale", Box::new(locale_decorator));

    println!("{}", handlebars.render("table", &make_data())?);
    Ok(())
}
