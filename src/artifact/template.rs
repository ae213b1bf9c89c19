//! Command template rendering
//!
//! Substitutes `{field}` tokens in the external build tool's fixed
//! invocation template with values from the resolved configuration.
//! A referenced field missing from the configuration is an authoring
//! defect, reported as `TemplateFieldMissing`.

use serde_json::Value;

use crate::error::BuildError;

/// Render `template`, replacing each `{field}` token with the scalar
/// value under that key in `document`.
///
/// Strings are substituted verbatim; booleans as the literal tokens
/// `true`/`false`; numbers in their decimal form. Missing keys and
/// non-scalar values both fail.
pub fn render(template: &str, document: &Value) -> Result<String, BuildError> {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('}') else {
            // No closing brace; the remainder is literal
            result.push_str(&rest[open..]);
            return Ok(result);
        };
        let field = &after_open[..close];
        result.push_str(&scalar_token(document, field)?);
        rest = &after_open[close + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn scalar_token(document: &Value, field: &str) -> Result<String, BuildError> {
    let missing = || BuildError::TemplateFieldMissing(field.to_string());
    match document.get(field).ok_or_else(missing)? {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(missing()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_fields() {
        let document = json!({
            "architecture": "amd64",
            "updates": true,
            "depth": 3
        });
        let rendered = render(
            "--architecture {architecture} --updates {updates} --depth {depth}",
            &document,
        )
        .unwrap();
        assert_eq!(rendered, "--architecture amd64 --updates true --depth 3");
    }

    #[test]
    fn test_repeated_field() {
        let document = json!({"mirror": "http://m"});
        let rendered = render("{mirror} {mirror}", &document).unwrap();
        assert_eq!(rendered, "http://m http://m");
    }

    #[test]
    fn test_missing_field_fails() {
        let document = json!({"architecture": "amd64"});
        let err = render("--mirror {debian_mirror}", &document).unwrap_err();
        match err {
            BuildError::TemplateFieldMissing(field) => {
                assert_eq!(field, "debian_mirror");
            }
            other => panic!("expected TemplateFieldMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_non_scalar_field_fails() {
        let document = json!({"packages": ["a", "b"]});
        let err = render("{packages}", &document).unwrap_err();
        assert!(matches!(err, BuildError::TemplateFieldMissing(_)));
    }

    #[test]
    fn test_template_without_tokens_is_literal() {
        let document = json!({});
        let rendered = render("lb config noauto", &document).unwrap();
        assert_eq!(rendered, "lb config noauto");
    }

    #[test]
    fn test_unclosed_brace_kept_literal() {
        let document = json!({"a": "x"});
        let rendered = render("{a} {unclosed", &document).unwrap();
        assert_eq!(rendered, "x {unclosed");
    }
}
