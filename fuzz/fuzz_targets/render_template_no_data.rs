#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let mut hbs = hbskit::Handlebars::new();
    hbs.set_max_partial_depth(8);

    let _ = hbs.render_template(data, &serde_json::json!({}));
    let _ = hbs.compile(data).map(|t| {
        hbskit::precompile::emit(
            "fuzz",
            &t,
            hbskit::Revision::V4,
        )
    });
});
