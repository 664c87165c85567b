//! Balanced-brace extraction of a JSON object from free-form model output.
//!
//! Models routinely wrap the requested JSON in prose or code fences, so the
//! response cannot be fed to serde directly. The scan starts at the first `{`
//! and tracks brace depth outside string literals; it is a dedicated parsing
//! step rather than a regex because braces inside strings and escaped quotes
//! must not terminate the object early.

/// Extract the first balanced top-level `{...}` substring.
///
/// Returns `None` when the response contains no `{` or the object never
/// closes — both are treated by callers as "no JSON found".
pub fn first_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;

    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_object() {
        assert_eq!(first_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn prose_prefix_and_suffix() {
        let raw = r#"Sure! Here is the rule: {"a":1} Let me know if you need changes."#;
        assert_eq!(first_json_object(raw), Some(r#"{"a":1}"#));
    }

    #[test]
    fn nested_objects() {
        let raw = r#"{"outer":{"inner":{"deep":true}}} trailing"#;
        assert_eq!(first_json_object(raw), Some(r#"{"outer":{"inner":{"deep":true}}}"#));
    }

    #[test]
    fn braces_inside_strings_do_not_close() {
        let raw = r#"{"reason":"amounts like {1000} are suspicious","ok":true}"#;
        assert_eq!(first_json_object(raw), Some(raw));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let raw = r#"{"reason":"she said \"over {budget}\"","ok":true} extra"#;
        assert_eq!(
            first_json_object(raw),
            Some(r#"{"reason":"she said \"over {budget}\"","ok":true}"#)
        );
    }

    #[test]
    fn markdown_fenced_object() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(first_json_object(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn no_object_at_all() {
        assert_eq!(first_json_object("no json here"), None);
        assert_eq!(first_json_object(""), None);
    }

    #[test]
    fn unterminated_object() {
        assert_eq!(first_json_object(r#"{"a": {"b": 1}"#), None);
    }

    #[test]
    fn only_the_first_object_is_returned() {
        let raw = r#"{"first":1} {"second":2}"#;
        assert_eq!(first_json_object(raw), Some(r#"{"first":1}"#));
    }
}
