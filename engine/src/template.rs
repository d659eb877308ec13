//! Render templates.
//!
//! A template is either a caller-supplied pure function from attributes to
//! markup, or a source string with `{{ key }}` placeholders. Source strings
//! are compiled once at construction; rendering is a walk over the
//! compiled segments.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Attribute mapping handed to templates.
pub type Attributes = serde_json::Map<String, Value>;

/// Callable form of a template.
pub type RenderFn = dyn Fn(&Attributes) -> String + Send + Sync;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A compiled render template.
#[derive(Clone)]
pub struct Template {
    repr: Repr,
}

#[derive(Clone)]
enum Repr {
    Function(Arc<RenderFn>),
    Compiled(Vec<Segment>),
}

impl Template {
    /// Wrap a render function.
    pub fn function(f: impl Fn(&Attributes) -> String + Send + Sync + 'static) -> Self {
        Template {
            repr: Repr::Function(Arc::new(f)),
        }
    }

    /// Compile a `{{ key }}` placeholder source string.
    ///
    /// An unterminated `{{` is kept as literal text.
    pub fn source(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = source;
        while let Some(open) = rest.find("{{") {
            if let Some(close) = rest[open..].find("}}") {
                let literal = &rest[..open];
                if !literal.is_empty() {
                    segments.push(Segment::Literal(literal.to_string()));
                }
                let key = rest[open + 2..open + close].trim().to_string();
                segments.push(Segment::Placeholder(key));
                rest = &rest[open + close + 2..];
            } else {
                break;
            }
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Template {
            repr: Repr::Compiled(segments),
        }
    }

    /// Render `attributes` to markup.
    ///
    /// Missing keys render empty; non-string values render as their JSON
    /// form.
    pub fn render(&self, attributes: &Attributes) -> String {
        match &self.repr {
            Repr::Function(f) => f(attributes),
            Repr::Compiled(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Literal(text) => out.push_str(text),
                        Segment::Placeholder(key) => match attributes.get(key) {
                            Some(Value::String(s)) => out.push_str(s),
                            Some(other) => out.push_str(&other.to_string()),
                            None => {}
                        },
                    }
                }
                out
            }
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Function(_) => f.write_str("Template::function"),
            Repr::Compiled(segments) => f.debug_tuple("Template::source").field(segments).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn function_template() {
        let template = Template::function(|a| format!("<b>{}</b>", a["name"].as_str().unwrap()));
        let out = template.render(&attrs(json!({"name": "alice"})));
        assert_eq!(out, "<b>alice</b>");
    }

    #[test]
    fn compiled_placeholders() {
        let template = Template::source("<li>{{ name }} ({{id}})</li>");
        let out = template.render(&attrs(json!({"id": 3, "name": "alice"})));
        assert_eq!(out, "<li>alice (3)</li>");
    }

    #[test]
    fn missing_key_renders_empty() {
        let template = Template::source("[{{ missing }}]");
        assert_eq!(template.render(&attrs(json!({}))), "[]");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let template = Template::source("{{ tags }}");
        let out = template.render(&attrs(json!({"tags": [1, 2]})));
        assert_eq!(out, "[1,2]");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let template = Template::source("a {{ b");
        assert_eq!(template.render(&attrs(json!({"b": "x"}))), "a {{ b");
    }
}
