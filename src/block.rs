use std::collections::BTreeMap;

use serde_json::value::Value as Json;

use crate::json::value::ScopedJson;

/// A map holds block parameters bound by `as |x y|`.
#[derive(Clone, Debug, Default)]
pub struct BlockParams<'rc> {
    data: BTreeMap<String, ScopedJson<'rc>>,
}

impl<'rc> BlockParams<'rc> {
    /// Create a empty block parameter map.
    pub fn new() -> BlockParams<'rc> {
        BlockParams::default()
    }

    /// Add a value as parameter.
    pub fn add_value(&mut self, k: &str, v: ScopedJson<'rc>) {
        self.data.insert(k.to_owned(), v);
    }

    /// Get a block parameter by its name.
    pub fn get(&self, k: &str) -> Option<&ScopedJson<'rc>> {
        self.data.get(k)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn to_json_map(&self) -> BTreeMap<String, Json> {
        self.data
            .iter()
            .map(|(k, v)| (k.clone(), v.as_json().clone()))
            .collect()
    }
}

/// One frame of the scope stack: the value `this` refers to, the block
/// params and the `@` data variables of this level.
#[derive(Debug, Clone, Default)]
pub struct BlockContext<'rc> {
    /// `None` on the root frame, which refers to the render data itself
    base_value: Option<ScopedJson<'rc>>,
    block_params: BlockParams<'rc>,
    local_variables: BTreeMap<String, Json>,
}

impl<'rc> BlockContext<'rc> {
    /// create a new `BlockContext` with default data
    pub fn new() -> BlockContext<'rc> {
        BlockContext::default()
    }

    /// A frame whose `this` is `value`.
    pub fn with_value(value: ScopedJson<'rc>) -> BlockContext<'rc> {
        BlockContext {
            base_value: Some(value),
            ..Default::default()
        }
    }

    pub fn base_value(&self) -> Option<&ScopedJson<'rc>> {
        self.base_value.as_ref()
    }

    pub fn set_base_value(&mut self, value: ScopedJson<'rc>) {
        self.base_value = Some(value);
    }

    /// set a local variable into current scope, `name` without the `@`
    pub fn set_local_var(&mut self, name: &str, value: Json) {
        self.local_variables.insert(name.to_owned(), value);
    }

    /// get a local variable from current scope
    pub fn get_local_var(&self, name: &str) -> Option<&Json> {
        self.local_variables.get(name)
    }

    pub fn local_variables(&self) -> &BTreeMap<String, Json> {
        &self.local_variables
    }

    /// Get a block parameter from this block.
    /// Block parameters needed to be supported by the block helper.
    /// The typical syntax for block parameter is:
    ///
    /// ```skip
    /// {{#myblock param1 as |block_param1|}}
    ///    ...
    /// {{/myblock}}
    /// ```
    ///
    pub fn get_block_param(&self, block_param_name: &str) -> Option<&ScopedJson<'rc>> {
        self.block_params.get(block_param_name)
    }

    pub(crate) fn block_params_json(&self) -> BTreeMap<String, Json> {
        self.block_params.to_json_map()
    }

    /// Set a block parameter into this block.
    pub fn set_block_params(&mut self, block_params: BlockParams<'rc>) {
        self.block_params = block_params;
    }
}
