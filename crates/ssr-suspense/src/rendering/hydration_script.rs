use cow_utils::CowUtils;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::SsrError;

/// Serializes `value` as JSON that is safe to inline in a `<script>` element.
pub fn escape_json(value: &JsonValue) -> Result<String, SsrError> {
    let json = serde_json::to_string(value).map_err(|e| SsrError::serialization(e.to_string()))?;

    Ok(json
        .cow_replace('<', "\\u003c")
        .cow_replace('>', "\\u003e")
        .cow_replace('&', "\\u0026")
        .cow_replace('\u{2028}', "\\u2028")
        .cow_replace('\u{2029}', "\\u2029")
        .into_owned())
}

pub(crate) fn escape_attr(s: &str) -> String {
    s.cow_replace('&', "&amp;")
        .cow_replace('<', "&lt;")
        .cow_replace('>', "&gt;")
        .cow_replace('"', "&quot;")
        .cow_replace('\'', "&#x27;")
        .into_owned()
}

pub(crate) fn script_tag(body: &str, nonce: Option<&str>) -> String {
    match nonce {
        Some(nonce) => format!("<script nonce=\"{}\">{body}</script>", escape_attr(nonce)),
        None => format!("<script>{body}</script>"),
    }
}

/// Renders resolved resources as one `_$HY.set(id, value)` call each, in id
/// order. Empty when there is nothing to hydrate.
pub fn hydration_script(
    resources: &BTreeMap<String, JsonValue>,
    nonce: Option<&str>,
) -> Result<String, SsrError> {
    if resources.is_empty() {
        return Ok(String::new());
    }

    let mut body = String::new();
    for (id, value) in resources {
        let id = escape_json(&JsonValue::String(id.clone()))?;
        body.push_str(&format!("_$HY.set({id}, {});", escape_json(value)?));
    }

    Ok(script_tag(&body, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_lists_resources_in_id_order() {
        let resources: BTreeMap<String, JsonValue> =
            [("0.1".to_string(), json!({"n": 2})), ("0.0".to_string(), json!("a"))].into();

        let script = hydration_script(&resources, None).unwrap();

        assert_eq!(script, "<script>_$HY.set(\"0.0\", \"a\");_$HY.set(\"0.1\", {\"n\":2});</script>");
    }

    #[test]
    fn test_script_cannot_be_closed_by_values() {
        let resources: BTreeMap<String, JsonValue> =
            [("0".to_string(), json!("</script><script>alert(1)</script>\u{2028}"))].into();

        let script = hydration_script(&resources, None).unwrap();

        assert_eq!(script.matches("</script>").count(), 1);
        assert!(script.contains("\\u003c/script\\u003e"));
        assert!(script.contains("\\u2028"));
    }

    #[test]
    fn test_nonce_is_attribute_escaped() {
        let resources: BTreeMap<String, JsonValue> = [("0".to_string(), json!(1))].into();

        let script = hydration_script(&resources, Some("abc\"x")).unwrap();

        assert!(script.starts_with("<script nonce=\"abc&quot;x\">"));
    }

    #[test]
    fn test_empty_resources_render_nothing() {
        assert_eq!(hydration_script(&BTreeMap::new(), None).unwrap(), "");
    }
}
