/// Macro that allows you to quickly define a handlebars helper by passing a
/// name and a closure.
///
/// The closure receives params by position, converted to the declared type.
/// Use `Json` for any value, or one of `str`, `i64`, `u64`, `f64`, `bool`,
/// `object`, `array` and `null` for a typed one. The value the closure
/// returns becomes the helper result, so these helpers compose in
/// sub-expressions.
///
/// # Examples
///
/// ```rust
/// use hbskit::{handlebars_helper, Handlebars};
/// use serde_json::json;
///
/// handlebars_helper!(is_above_10: |x: u64| x > 10);
///
/// let mut handlebars = Handlebars::new();
/// handlebars.register_helper("is-above-10", Box::new(is_above_10));
///
/// let result = handlebars
///     .render_template("{{#if (is-above-10 12)}}great!{{else}}okay{{/if}}", &json!({}))
///     .unwrap();
/// assert_eq!(&result, "great!");
/// ```
#[macro_export]
macro_rules! handlebars_helper {
    ($struct_name:ident: |$($name:ident: $tpe:tt),*| $body:expr ) => {
        #[allow(non_camel_case_types)]
        pub struct $struct_name;

        impl $crate::HelperDef for $struct_name {
            #[allow(unused_assignments)]
            fn call_inner<'rc>(
                &self,
                h: &$crate::Helper<'rc>,
                _: &'rc $crate::Handlebars,
                _: &'rc $crate::Context,
                _: &mut $crate::RenderContext<'rc>,
            ) -> Result<$crate::ScopedJson<'rc>, $crate::RenderError> {
                let mut param_idx = 0;

                $(
                    let $name = h.param(param_idx)
                        .map(|x| x.value())
                        .ok_or_else(|| $crate::RenderErrorReason::ParamNotFoundForIndex(
                            stringify!($struct_name), param_idx,
                        ))
                        .and_then(|x|
                            handlebars_helper!(@as_json_value x, $tpe)
                                .ok_or_else(|| $crate::RenderErrorReason::InvalidParamType(
                                    stringify!($tpe),
                                ))
                        )?;
                    param_idx += 1;
                )*

                let result = $body;
                Ok($crate::ScopedJson::Derived($crate::JsonValue::from(result)))
            }
        }
    };

    (@as_json_value $x:ident, object) => { $x.as_object() };
    (@as_json_value $x:ident, array) => { $x.as_array() };
    (@as_json_value $x:ident, str) => { $x.as_str() };
    (@as_json_value $x:ident, i64) => { $x.as_i64() };
    (@as_json_value $x:ident, u64) => { $x.as_u64() };
    (@as_json_value $x:ident, f64) => { $x.as_f64() };
    (@as_json_value $x:ident, bool) => { $x.as_bool() };
    (@as_json_value $x:ident, null) => { $x.as_null() };
    (@as_json_value $x:ident, Json) => { Some($x) };
}
