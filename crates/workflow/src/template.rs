// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template references in commands and predicates.
//!
//! A placeholder is `${namespace.key}` where the namespace is one of
//! `values`, `secret`, `params`, or `exports` (the latter addressed as
//! `exports.<task>.<output>`), or the environment fallback form
//! `${NAME:-default}`. [`scan`] classifies placeholders so the parser
//! can validate them; [`render`]/[`render_shell`] substitute them in a
//! single pass against the run's data.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Matches any `${...}` placeholder; classification happens on the
/// inner text so one pass handles every form.
// The pattern is a literal; a typo here would fail every template test
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^{}]+)\}").expect("literal placeholder pattern"));

/// The namespaces a reference may address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// User-supplied inputs from the values file / `--set`
    Values,
    /// Decrypted stack secrets (present only when a password was given)
    Secret,
    /// The task's own params block
    Params,
    /// Outputs published by an upstream task: `exports.<task>.<output>`
    Exports,
}

impl Namespace {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "values" => Some(Namespace::Values),
            "secret" => Some(Namespace::Secret),
            "params" => Some(Namespace::Params),
            "exports" => Some(Namespace::Exports),
            _ => None,
        }
    }
}

/// A namespaced reference such as `values.env` or `exports.build.artifact`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub namespace: Namespace,
    /// Everything after the namespace dot
    pub key: String,
}

impl TemplateRef {
    /// Split an exports reference into `(task, output)`.
    pub fn exports_parts(&self) -> Option<(&str, &str)> {
        if self.namespace != Namespace::Exports {
            return None;
        }
        self.key.split_once('.')
    }
}

/// One classified placeholder from a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// A namespaced reference
    Ref(TemplateRef),
    /// `${NAME:-default}`: process environment with a fallback
    EnvDefault { name: String, default: String },
    /// Text between `${` and `}` that fits neither form
    Invalid { raw: String },
}

fn classify(inner: &str) -> Placeholder {
    if let Some((name, default)) = inner.split_once(":-") {
        let env_like =
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if env_like {
            return Placeholder::EnvDefault {
                name: name.to_string(),
                default: default.to_string(),
            };
        }
    }

    match inner.split_once('.') {
        Some((ns, key)) if !key.is_empty() => match Namespace::parse(ns) {
            Some(namespace) => Placeholder::Ref(TemplateRef {
                namespace,
                key: key.to_string(),
            }),
            None => Placeholder::Invalid {
                raw: inner.to_string(),
            },
        },
        _ => Placeholder::Invalid {
            raw: inner.to_string(),
        },
    }
}

/// Classify every placeholder in a template.
///
/// Pure text analysis: no environment or run data is consulted, so the
/// parser can call this without breaking parse purity.
pub fn scan(template: &str) -> Vec<Placeholder> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| classify(&caps[1]))
        .collect()
}

/// The run data a template renders against.
#[derive(Debug, Clone, Default)]
pub struct RenderVars {
    pub values: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
    pub params: HashMap<String, String>,
    /// task name → output name → value
    pub exports: HashMap<String, HashMap<String, String>>,
}

impl RenderVars {
    fn resolve(&self, reference: &TemplateRef) -> Option<&str> {
        match reference.namespace {
            Namespace::Values => self.values.get(&reference.key).map(String::as_str),
            Namespace::Secret => self.secrets.get(&reference.key).map(String::as_str),
            Namespace::Params => self.params.get(&reference.key).map(String::as_str),
            Namespace::Exports => {
                let (task, output) = reference.exports_parts()?;
                self.exports.get(task)?.get(output).map(String::as_str)
            }
        }
    }
}

/// Render for non-shell contexts (env values, messages).
pub fn render(template: &str, vars: &RenderVars) -> String {
    render_inner(template, vars, false)
}

/// Render for shell commands.
///
/// Run data from outside the workflow file (values, secrets, exports)
/// is escaped so it reads as literal text inside double quotes. A
/// task's own `params` sit next to the command in the same file and
/// pass through untouched, so intentional shell syntax in them keeps
/// working.
pub fn render_shell(template: &str, vars: &RenderVars) -> String {
    render_inner(template, vars, true)
}

fn render_inner(template: &str, vars: &RenderVars, shell: bool) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            match classify(&caps[1]) {
                Placeholder::EnvDefault { name, default } => {
                    std::env::var(&name).unwrap_or(default)
                }
                Placeholder::Ref(reference) => match vars.resolve(&reference) {
                    Some(value) if shell && reference.namespace != Namespace::Params => {
                        escape_shell(value)
                    }
                    Some(value) => value.to_string(),
                    // An unresolved reference stays visible in the
                    // command instead of vanishing into empty text
                    None => caps[0].to_string(),
                },
                Placeholder::Invalid { .. } => caps[0].to_string(),
            }
        })
        .to_string()
}

/// Characters the shell would expand inside double quotes.
const SHELL_EXPANDERS: [char; 4] = ['\\', '$', '`', '"'];

/// Backslash-escape interpolated run data for double-quoted contexts.
///
/// Workflow commands conventionally quote their references (e.g.
/// `deploy --env "${values.env}"`), so escaping the expansion
/// characters keeps external data from being executed.
pub fn escape_shell(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    for ch in value.chars() {
        if SHELL_EXPANDERS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
