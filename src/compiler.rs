use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::template::{Binding, Call, Node, Parameter, References, Template};

/// Helper and partial names registered when a template is compiled.
#[derive(Debug, Clone, Default)]
pub struct KnownNames {
    pub helpers: BTreeSet<String>,
    pub partials: BTreeSet<String>,
}

impl KnownNames {
    /// Stable hash over every known name. Two registries with the same
    /// names produce the same value.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.helpers.hash(&mut hasher);
        self.partials.hash(&mut hasher);
        hasher.finish()
    }
}

/// Bind every call site of a parsed template against the known names and
/// record what it references.
///
/// A simple name that matches a helper binds to it. Dotted paths, `this`,
/// `../` ascents and literals never name a helper and bind as values. Any
/// other simple name stays deferred so a helper registered later can still
/// claim it.
pub fn compile(mut template: Template, known: &KnownNames) -> Template {
    let mut refs = References::default();

    {
        let mut pending: Vec<&mut Vec<Node>> = vec![&mut template.elements];
        let mut calls: Vec<&mut Call> = Vec::new();

        while let Some(nodes) = pending.pop() {
            for node in nodes {
                match node {
                    Node::Text(_) | Node::Comment(_) => {}
                    Node::Expression(e) => calls.push(&mut e.call),
                    Node::Block(b) => {
                        let b = &mut **b;
                        calls.push(&mut b.call);
                        if let Some(body) = &mut b.body {
                            pending.push(&mut body.elements);
                        }
                        if let Some(inverse) = &mut b.inverse {
                            pending.push(&mut inverse.elements);
                        }
                    }
                    Node::Partial(p) => {
                        let p = &mut **p;
                        if let Some(name) = p.static_name() {
                            if known.partials.contains(name) {
                                refs.partials.insert(name.to_owned());
                            }
                        }
                        collect_partial_calls(&mut p.name, &mut p.context, &mut p.hash, &mut calls);
                    }
                    Node::PartialBlock(pb) => {
                        let pb = &mut **pb;
                        if let Some(name) = pb.partial.static_name() {
                            if known.partials.contains(name) {
                                refs.partials.insert(name.to_owned());
                            }
                        }
                        let p = &mut pb.partial;
                        collect_partial_calls(&mut p.name, &mut p.context, &mut p.hash, &mut calls);
                        pending.push(&mut pb.body.elements);
                    }
                    Node::Decorator(d) => {
                        let d = &mut **d;
                        calls.push(&mut d.call);
                        if let Some(body) = &mut d.body {
                            pending.push(&mut body.elements);
                        }
                    }
                }
            }
        }

        while let Some(call) = calls.pop() {
            let binding = bind(call, known, &mut refs);
            let Call {
                name,
                params,
                hash,
                binding: slot,
                ..
            } = call;
            *slot = binding;

            if let Parameter::Subexpression(sub) = name {
                calls.push(&mut **sub);
            }
            for p in params.iter_mut().chain(hash.values_mut()) {
                if let Parameter::Subexpression(sub) = p {
                    calls.push(&mut **sub);
                }
            }
        }
    }

    let mut hasher = DefaultHasher::new();
    refs.hash(&mut hasher);
    template.fingerprint = hasher.finish();
    template.references = refs;
    template
}

fn collect_partial_calls<'t>(
    name: &'t mut Parameter,
    context: &'t mut Option<Parameter>,
    hash: &'t mut std::collections::BTreeMap<String, Parameter>,
    calls: &mut Vec<&'t mut Call>,
) {
    if let Parameter::Subexpression(sub) = name {
        calls.push(&mut **sub);
    }
    for p in context.iter_mut().chain(hash.values_mut()) {
        if let Parameter::Subexpression(sub) = p {
            calls.push(&mut **sub);
        }
    }
}

fn bind(call: &Call, known: &KnownNames, refs: &mut References) -> Binding {
    match &call.name {
        Parameter::Path(p) => match p.simple_name() {
            Some(name) if known.helpers.contains(name) => {
                refs.helpers.insert(name.to_owned());
                Binding::Helper
            }
            Some(_) => Binding::Deferred,
            None => Binding::Value,
        },
        Parameter::Literal(_) | Parameter::Subexpression(_) => Binding::Value,
    }
}
