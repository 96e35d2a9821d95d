use std::error::Error;

use hbskit::{to_json, Context, Handlebars, Helper, HelperResult, JsonRender, Output, RenderContext, RenderError};
use serde_derive::Serialize;
use serde_json::value::{Map, Value as Json};

static TABLE: &str = r#"<html>
  <head>
    <title>CSL {{year}}</title>
  </head>
  <body>
    <h1>CSL {{year}}</h1>
    <table>
    {{#each teams as |t|}}
      <tr class="{{ranking_label @index ../teams}}">
        <td>{{t.name}}</td><td>{{format t.pts}}</td>
      </tr>
    {{else}}
      <tr><td>no teams yet</td></tr>
    {{/each}}
    </table>
    <p>Rendered by {{engine}}, {{len teams}} teams</p>
  </body>
</html>
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

fn rank_helper(
    h: &Helper<'_>,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext<'_>,
    out: &mut dyn Output,
) -> HelperResult {
    let rank = h
        .param(0)
        .and_then(|v| v.value().as_u64())
        .ok_or_else(|| RenderError::new("Param 0 with u64 type is required for rank helper."))?
        as usize;
    let total = h
        .param(1)
        .and_then(|v| v.value().as_array())
        .map(|a| a.len())
        .ok_or_else(|| RenderError::new("Param 1 with array type is required for rank helper"))?;
    if rank == 0 {
        out.write("champion")?;
    } else if rank + 2 >= total {
        out.write("relegation")?;
    } else if rank <= 2 {
        out.write("acl")?;
    }
    Ok(())
}

#[derive(Serialize)]
pub struct Team {
    name: String,
    pts: u16,
}

pub fn make_data() -> Map<String, Json> {
    let mut data = Map::new();

    data.insert("year".to_string(), to_json("2015"));

    let teams: Vec<Team> = [
        ("Jiangsu Suning", 43u16),
        ("Shanghai SIPG", 39u16),
        ("Hebei CFFC", 27u16),
        ("Guangzhou Evergrand", 22u16),
        ("Shandong Luneng", 12u16),
        ("Beijing Guoan", 7u16),
    ]
    .into_iter()
    .map(|(name, pts)| Team {
        name: name.to_owned(),
        pts,
    })
    .collect();

    data.insert("teams".to_string(), to_json(&teams));
    data.insert("engine".to_string(), to_json("hbskit"));
    data
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let mut handlebars = Handlebars::new();

    handlebars.register_template_string("table", TABLE)?;
    handlebars.register_helper("format", Box::new(format_helper));
    handlebars.register_helper("ranking_label", Box::new(rank_helper));

    println!("{}", handlebars.render("table", &make_data())?);
    Ok(())
}
