//! `{variable}` substitution for prompt templates.
//!
//! # Syntax
//!
//! - `{name}` - Substitutes the value of variable `name` (surrounding
//!   whitespace inside the braces is ignored)
//! - `{{` / `}}` - Render as literal `{` / `}`
//! - A lone `}` is kept as-is
//!
//! Undefined variables are an error rather than an empty substitution, so a
//! typo in a user template is caught before the agent ever sees the prompt.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("undefined variable '{name}' at position {position} in template")]
    UndefinedVariable { name: String, position: usize },

    #[error("unmatched '{{' at position {position} in template")]
    UnmatchedBrace { position: usize },

    #[error("empty variable name '{{}}' at position {position} in template")]
    EmptyVariableName { position: usize },
}

/// Render `template`, substituting every `{name}` from `variables`.
pub fn render_template(
    template: &str,
    variables: &HashMap<&str, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    let mut offset = 0;

    while let Some(idx) = rest.find(['{', '}']) {
        out.push_str(&rest[..idx]);
        let position = offset + idx;
        let tail = &rest[idx..];

        let consumed = if tail.starts_with("{{") {
            out.push('{');
            2
        } else if tail.starts_with("}}") {
            out.push('}');
            2
        } else if tail.starts_with('}') {
            out.push('}');
            1
        } else {
            let close = tail
                .find('}')
                .ok_or(TemplateError::UnmatchedBrace { position })?;
            let raw = &tail[1..close];
            if raw.is_empty() {
                return Err(TemplateError::EmptyVariableName { position });
            }
            let name = raw.trim();
            let value = variables
                .get(name)
                .ok_or_else(|| TemplateError::UndefinedVariable {
                    name: name.to_string(),
                    position,
                })?;
            out.push_str(value);
            close + 1
        };

        rest = &tail[consumed..];
        offset = position + consumed;
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars<'a>(pairs: &[(&'a str, &str)]) -> HashMap<&'a str, String> {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_substitution() {
        let vars = vars(&[("title", "Dark mode"), ("id", "f-7")]);
        let result = render_template("# {title} ({id})", &vars).unwrap();
        assert_eq!(result, "# Dark mode (f-7)");
    }

    #[test]
    fn test_plain_and_empty_templates() {
        let vars = HashMap::new();
        assert_eq!(render_template("", &vars).unwrap(), "");
        assert_eq!(render_template("no vars here", &vars).unwrap(), "no vars here");
    }

    #[test]
    fn test_escapes_and_lone_closing_brace() {
        let vars = vars(&[("x", "v")]);
        assert_eq!(
            render_template("{{literal}} {x} a }} b } c", &vars).unwrap(),
            "{literal} v a } b } c"
        );
    }

    #[test]
    fn test_whitespace_inside_braces_is_trimmed() {
        let vars = vars(&[("name", "Alice")]);
        assert_eq!(render_template("Hi { name }!", &vars).unwrap(), "Hi Alice!");
    }

    #[test]
    fn test_values_are_not_reinterpreted() {
        let vars = vars(&[("code", "fn main() { {x} }")]);
        assert_eq!(
            render_template("Code: {code}", &vars).unwrap(),
            "Code: fn main() { {x} }"
        );
    }

    #[test]
    fn test_unicode_positions() {
        let vars = vars(&[("emoji", "🎉")]);
        assert_eq!(render_template("日本 {emoji}", &vars).unwrap(), "日本 🎉");

        let err = render_template("日本 {missing}", &HashMap::new()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UndefinedVariable {
                name: "missing".to_string(),
                position: "日本 ".len()
            }
        );
    }

    #[test]
    fn test_errors() {
        let vars = HashMap::new();
        assert_eq!(
            render_template("Hello {name", &vars).unwrap_err(),
            TemplateError::UnmatchedBrace { position: 6 }
        );
        assert_eq!(
            render_template("Hello {}", &vars).unwrap_err(),
            TemplateError::EmptyVariableName { position: 6 }
        );
        assert_eq!(
            render_template("{a}{b}", &self::vars(&[("a", "1")])).unwrap_err(),
            TemplateError::UndefinedVariable {
                name: "b".to_string(),
                position: 3
            }
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            TemplateError::UnmatchedBrace { position: 5 }.to_string(),
            "unmatched '{' at position 5 in template"
        );
        assert_eq!(
            TemplateError::EmptyVariableName { position: 3 }.to_string(),
            "empty variable name '{}' at position 3 in template"
        );
    }
}
