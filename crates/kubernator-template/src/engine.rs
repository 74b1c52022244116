//! The template engine: a delayed-rendering templating layer over MiniJinja with
//! custom delimiters and a double-evaluation finalizer.
//!
//! Delimiters are `{${` / `}$}` rather than MiniJinja's default `{{` / `}}`,
//! chosen (per the tool this was ported from) to avoid colliding with Helm/Go
//! template syntax and the `{{` that shows up in literal Kubernetes string
//! content. Every rendered value passes through a finalizer: if its stringified
//! form still contains the delimiter pair, it is treated as one more unresolved
//! template and rendered once more against the same context, giving values one
//! level of indirection (a value that itself names another template expression).
//! The same finalizer also counts lookups that resolved to an undefined value;
//! a non-zero count fails the render even though MiniJinja's lenient mode would
//! otherwise have let it through silently.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Value};
use serde_json::Value as JsonValue;

use crate::error::{EngineError, Result, TemplateError};
use crate::{filters, functions};

/// Opening delimiter for a substitution expression.
pub const DELIM_OPEN: &str = "{${";
/// Closing delimiter for a substitution expression.
pub const DELIM_CLOSE: &str = "}$}";

/// A template's compiled source plus its name, default variables and where it
/// came from — the unit the rest of the system passes around instead of a bare
/// string, so error messages can always point back at a source.
#[derive(Debug, Clone)]
pub struct Template {
    pub source: String,
    pub name: String,
    pub default_vars: Option<JsonValue>,
    pub provenance: String,
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        provenance: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            default_vars: None,
            provenance: provenance.into(),
        }
    }

    pub fn with_defaults(mut self, defaults: JsonValue) -> Self {
        self.default_vars = Some(defaults);
        self
    }
}

/// Outcome of a successful render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOutcome {
    pub text: String,
    /// Always zero on `Ok` — a non-zero count fails the render instead. Kept on
    /// the struct so callers that want to no-op on "rendered but touched
    /// nothing" can still inspect it via `render_allow_undefined`.
    pub undefined_count: usize,
}

fn configure_syntax(env: &mut Environment<'_>) {
    let syntax = SyntaxConfig::builder()
        .variable_delimiters(DELIM_OPEN, DELIM_CLOSE)
        .build()
        .expect("delimiter configuration is a compile-time constant");
    env.set_syntax(syntax);
}

fn register_builtins(env: &mut Environment<'static>) {
    env.add_filter("toyaml", filters::toyaml);
    env.add_filter("tojson", filters::tojson);
    env.add_filter("tojson_pretty", filters::tojson_pretty);
    env.add_filter("b64encode", filters::b64encode);
    env.add_filter("b64decode", filters::b64decode);
    env.add_filter("quote", filters::quote);
    env.add_filter("squote", filters::squote);
    env.add_filter("nindent", filters::nindent);
    env.add_filter("indent", filters::indent);
    env.add_filter("required", filters::required);
    env.add_filter("empty", filters::empty);
    env.add_filter("haskey", filters::haskey);
    env.add_filter("keys", filters::keys);
    env.add_filter("merge", filters::merge);
    env.add_filter("sha256", filters::sha256sum);
    env.add_filter("trunc", filters::trunc);
    env.add_filter("trimprefix", filters::trimprefix);
    env.add_filter("trimsuffix", filters::trimsuffix);
    env.add_filter("snakecase", filters::snakecase);
    env.add_filter("kebabcase", filters::kebabcase);
    env.add_filter("int", filters::int);
    env.add_filter("float", filters::float);

    env.add_function("fail", functions::fail);
    env.add_function("dict", functions::dict);
    env.add_function("list", functions::list);
    env.add_function("get", functions::get);
    env.add_function("set", functions::set);
    env.add_function("unset", functions::unset);
    env.add_function("dig", functions::dig);
    env.add_function("coalesce", functions::coalesce);
    env.add_function("ternary", functions::ternary);
    env.add_function("uuidv4", functions::uuidv4);
    env.add_function("tostring", functions::tostring);
    env.add_function("toint", functions::toint);
    env.add_function("tofloat", functions::tofloat);
    env.add_function("now", functions::now);
    env.add_function("printf", functions::printf);
    env.add_function("tpl", functions::tpl);
    env.add_function("tpl_ctx", functions::tpl_ctx);
    env.add_function("lookup", functions::lookup);
}

/// Build the one-shot environment the finalizer uses to resolve a single level
/// of indirection. Its own finalizer only counts undefined values — it never
/// re-expands delimiters again, which is what bounds resolution to one extra
/// pass regardless of how many `{$...}$}` sequences a value's string form
/// happens to embed.
fn build_inner_env(counter: Rc<Cell<usize>>) -> Environment<'static> {
    let mut env = Environment::new();
    configure_syntax(&mut env);
    register_builtins(&mut env);
    env.set_finalizer(move |_state, value| {
        if value.is_undefined() {
            counter.set(counter.get() + 1);
        }
        Ok(value.clone())
    });
    env
}

/// The template engine. Construction is cheap; one instance is typically
/// shared for the life of a directory walk so the intern cache accumulates
/// across every render it performs.
pub struct TemplateEngine {
    env: Environment<'static>,
    undefined_count: Rc<Cell<usize>>,
    current_context: Rc<RefCell<Value>>,
    /// Finalizer-expanded template sources, deduplicated by their raw text so
    /// repeated identical nested expressions share one canonical `Rc<str>`
    /// rather than being re-allocated on every occurrence.
    intern: Rc<RefCell<HashMap<String, Rc<str>>>>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let undefined_count = Rc::new(Cell::new(0usize));
        let current_context = Rc::new(RefCell::new(Value::UNDEFINED));
        let intern: Rc<RefCell<HashMap<String, Rc<str>>>> = Rc::new(RefCell::new(HashMap::new()));

        let mut env = Environment::new();
        configure_syntax(&mut env);
        register_builtins(&mut env);

        let counter = undefined_count.clone();
        let context = current_context.clone();
        let cache = intern.clone();
        env.set_finalizer(move |_state, value| {
            if value.is_undefined() {
                counter.set(counter.get() + 1);
                return Ok(value.clone());
            }
            let text = value.to_string();
            if !text.contains(DELIM_OPEN) || !text.contains(DELIM_CLOSE) {
                return Ok(value.clone());
            }
            let canonical = cache
                .borrow_mut()
                .entry(text.clone())
                .or_insert_with(|| Rc::from(text.as_str()))
                .clone();
            let ctx = context.borrow().clone();
            let inner = build_inner_env(counter.clone());
            match inner.render_str(&canonical, ctx) {
                Ok(rendered) => Ok(Value::from(rendered)),
                // A finalizer that errors would abort the outer render for a
                // cosmetic reason (e.g. the embedded text merely looks like a
                // template); leave the value untouched and let the outer
                // render's own undefined/error handling decide its fate.
                Err(_) => Ok(value.clone()),
            }
        });

        Self {
            env,
            undefined_count,
            current_context,
            intern,
        }
    }

    fn context_value(template: &Template, vars: &JsonValue) -> Value {
        let merged = match &template.default_vars {
            Some(JsonValue::Object(defaults)) => {
                let mut merged = defaults.clone();
                if let JsonValue::Object(overrides) = vars {
                    for (k, v) in overrides {
                        merged.insert(k.clone(), v.clone());
                    }
                }
                JsonValue::Object(merged)
            }
            _ => vars.clone(),
        };
        Value::from_serialize(&merged)
    }

    /// Render `template` against `vars`, merged over the template's own
    /// defaults (caller-supplied values win on key collision). Fails if any
    /// lookup anywhere in the render — including inside a finalizer-expanded
    /// nested template — resolved to undefined.
    pub fn render(&self, template: &Template, vars: &JsonValue) -> Result<RenderOutcome> {
        self.undefined_count.set(0);
        let ctx = Self::context_value(template, vars);
        *self.current_context.borrow_mut() = ctx.clone();

        let text = self.env.render_str(&template.source, ctx).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(
                e,
                &template.name,
                &template.source,
            ))
        })?;

        let undefined_count = self.undefined_count.get();
        if undefined_count > 0 {
            return Err(EngineError::Template(
                TemplateError::simple(format!(
                    "{undefined_count} undefined variable(s) encountered rendering `{}`",
                    template.name
                ))
                .with_context(template.provenance.clone()),
            ));
        }
        Ok(RenderOutcome {
            text,
            undefined_count,
        })
    }

    /// Render a bare template string with no name/provenance tracking, for
    /// one-off expansions such as a plugin substituting a single field value.
    pub fn render_str(&self, source: &str, vars: &JsonValue) -> Result<RenderOutcome> {
        let template = Template::new("<inline>", source, "<inline>");
        self.render(&template, vars)
    }

    /// Number of distinct finalizer-expanded template sources interned so far.
    pub fn intern_len(&self) -> usize {
        self.intern.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_with_custom_delimiters() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "replicas: {${ replicas }$}", "test");
        let out = engine.render(&tpl, &json!({"replicas": 3})).unwrap();
        assert_eq!(out.text, "replicas: 3");
    }

    #[test]
    fn default_braces_are_not_special() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "helm: {{ .Values.foo }}", "test");
        let out = engine.render(&tpl, &json!({})).unwrap();
        assert_eq!(out.text, "helm: {{ .Values.foo }}");
    }

    #[test]
    fn undefined_variable_fails_the_render() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "value: {${ missing }$}", "test");
        assert!(engine.render(&tpl, &json!({})).is_err());
    }

    #[test]
    fn defaults_are_overridden_by_caller_vars() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "ns: {${ namespace }$}", "test")
            .with_defaults(json!({"namespace": "default"}));
        let out = engine.render(&tpl, &json!({})).unwrap();
        assert_eq!(out.text, "ns: default");

        let out = engine
            .render(&tpl, &json!({"namespace": "team-a"}))
            .unwrap();
        assert_eq!(out.text, "ns: team-a");
    }

    #[test]
    fn finalizer_resolves_one_level_of_indirection() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "host: {${ host }$}", "test");
        let vars = json!({
            "host": "{${ name }$}.example.com",
            "name": "svc",
        });
        let out = engine.render(&tpl, &vars).unwrap();
        assert_eq!(out.text, "host: svc.example.com");
    }

    #[test]
    fn identical_nested_expressions_render_identically() {
        let engine = TemplateEngine::new();
        let tpl = Template::new(
            "t",
            "a: {${ a }$}\nb: {${ b }$}",
            "test",
        );
        let vars = json!({
            "a": "{${ shared }$}",
            "b": "{${ shared }$}",
            "shared": "value",
        });
        let out = engine.render(&tpl, &vars).unwrap();
        assert_eq!(out.text, "a: value\nb: value");
        assert_eq!(engine.intern_len(), 1);
    }

    #[test]
    fn filters_are_available() {
        let engine = TemplateEngine::new();
        let tpl = Template::new("t", "{${ name | upper }$}", "test");
        let out = engine.render(&tpl, &json!({"name": "svc"})).unwrap();
        assert_eq!(out.text, "SVC");
    }
}
