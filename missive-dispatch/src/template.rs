//! `{{ path.to.field }}` placeholder substitution.
//!
//! Rendering is total: unknown paths and unterminated tokens never fail, so a
//! single malformed contact record cannot stall a batch. There is no escaping,
//! no loops and no conditionals.

use std::collections::BTreeSet;

use missive_common::model::FieldMap;
use serde_json::Value;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every `{{ path }}` token in `template` with the value found at
/// `path` in `fields`, or with nothing if the path does not resolve.
#[must_use]
pub fn render(template: &str, fields: &FieldMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];

        let Some(end) = after_open.find(CLOSE) else {
            // Unterminated; emit the remainder verbatim
            out.push_str(&rest[start..]);
            return out;
        };

        if let Some(value) = resolve(fields, after_open[..end].trim()) {
            push_value(&mut out, value);
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    out.push_str(rest);
    out
}

/// Distinct token paths used by `template`, for validation outside the hot path
#[must_use]
pub fn extract_variables(template: &str) -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };

        let path = after_open[..end].trim();
        if !path.is_empty() {
            vars.insert(path.to_string());
        }
        rest = &after_open[end + CLOSE.len()..];
    }

    vars
}

fn resolve<'a>(fields: &'a FieldMap, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }

    // A flat key containing dots wins over a nested lookup
    if let Some(value) = fields.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.').map(str::trim);
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push_str(s),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            out.push_str(&value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            _ => FieldMap::new(),
        }
    }

    #[test]
    fn test_render_simple_substitution() {
        let f = fields(json!({ "first_name": "Ada" }));
        assert_eq!(render("Hi {{first_name}}", &f), "Hi Ada");
        assert_eq!(render("Hi {{ first_name }}!", &f), "Hi Ada!");
    }

    #[test]
    fn test_render_unresolved_path_is_empty() {
        assert_eq!(render("Hi {{x.y}}", &FieldMap::new()), "Hi ");
        assert_eq!(render("{{}}x", &FieldMap::new()), "x");
    }

    #[test]
    fn test_render_nested_paths_and_arrays() {
        let f = fields(json!({
            "company": { "name": "Analytical Engines", "address": { "city": "London" } },
            "tags": ["vip", "early"],
        }));

        assert_eq!(
            render("{{company.name}} in {{ company.address.city }}", &f),
            "Analytical Engines in London"
        );
        assert_eq!(render("{{tags.1}}", &f), "early");
        assert_eq!(render("{{tags.9}}{{company.name.x}}", &f), "");
    }

    #[test]
    fn test_render_non_string_values() {
        let f = fields(json!({ "n": 3, "ok": true, "none": null, "obj": { "a": 1 } }));
        assert_eq!(render("{{n}} {{ok}} [{{none}}] {{obj}}", &f), "3 true [] {\"a\":1}");
    }

    #[test]
    fn test_render_flat_dotted_key() {
        let f = fields(json!({ "a.b": "flat", "a": { "b": "nested" } }));
        assert_eq!(render("{{a.b}}", &f), "flat");
    }

    #[test]
    fn test_render_unterminated_token_is_literal() {
        let f = fields(json!({ "name": "Ada" }));
        assert_eq!(render("Hi {{name}} {{oops", &f), "Hi Ada {{oops");
        assert_eq!(render("no tokens }} here", &f), "no tokens }} here");
    }

    #[test]
    fn test_render_keeps_multibyte_text() {
        let f = fields(json!({ "name": "Zoë" }));
        assert_eq!(render("Grüße, {{name}} ✉", &f), "Grüße, Zoë ✉");
    }

    #[test]
    fn test_extract_variables_distinct() {
        let vars = extract_variables("{{a}} {{b}} {{a}}");
        assert_eq!(
            vars,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_extract_variables_trims_and_skips_empty() {
        let vars = extract_variables("{{ user.name }} {{}} {{ user.name}} {{tail");
        assert_eq!(vars, BTreeSet::from(["user.name".to_string()]));
    }
}
