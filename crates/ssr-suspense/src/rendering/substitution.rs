use regex::Regex;
use rustc_hash::FxHashMap;
use std::sync::LazyLock;

use crate::error::SsrError;

static PLACEHOLDER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([0-9.]+)#>").expect("Valid regex pattern"));

/// Token left in the markup where a suspended boundary's fragment goes.
pub fn placeholder(boundary_id: &str) -> String {
    format!("<#{boundary_id}#>")
}

/// Boundary ids of every placeholder in `html`, in textual order.
pub fn find_placeholders(html: &str) -> Vec<&str> {
    PLACEHOLDER_PATTERN
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

fn next_placeholder(html: &str) -> Option<(usize, usize, String)> {
    let caps = PLACEHOLDER_PATTERN.captures(html)?;
    let token = caps.get(0)?;
    let id = caps.get(1)?;
    Some((token.start(), token.end(), id.as_str().to_string()))
}

/// Replaces placeholder tokens with their fragments.
///
/// Always splices the leftmost token and scans again from the start of the
/// assembled markup, so tokens inside a fragment, or formed where a fragment
/// meets the text around it, are resolved too.
pub fn substitute_fragments(
    root: &str,
    fragments: &FxHashMap<String, String>,
    max_passes: usize,
) -> Result<String, SsrError> {
    let mut html = root.to_string();
    let mut passes = 0;

    while let Some((start, end, id)) = next_placeholder(&html) {
        if passes == max_passes {
            return Err(SsrError::SubstitutionLimit(max_passes));
        }
        passes += 1;

        let fragment = fragments.get(&id).ok_or(SsrError::UnresolvedFragment(id))?;
        html.replace_range(start..end, fragment);
    }

    Ok(html)
}
