//! Fuzzy matching suggestions for template errors
//!
//! Uses Levenshtein distance to point at the closest known filter, function,
//! context variable or environment value key.

use serde_json::Value as JsonValue;

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Filters registered in the renderer, plus the common MiniJinja builtins
pub const AVAILABLE_FILTERS: &[&str] = &[
    "toyaml",
    "tojson",
    "b64encode",
    "b64decode",
    "quote",
    "squote",
    "nindent",
    "indent",
    "required",
    "sha256",
    "trimprefix",
    "trimsuffix",
    // MiniJinja builtins
    "default",
    "upper",
    "lower",
    "replace",
    "trim",
    "join",
    "first",
    "last",
    "length",
    "items",
    "int",
    "string",
    "urlencode",
];

/// Functions registered in the renderer
pub const AVAILABLE_FUNCTIONS: &[&str] = &["fail", "dict", "get", "env", "required_env", "range"];

/// Top-level context variables available in document templates
pub const CONTEXT_VARIABLES: &[&str] = &["environment", "values", "namespace", "document"];

/// A candidate correction
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub text: String,
    pub distance: usize,
}

/// Closest candidates to `input`, best first
pub fn find_closest_matches(input: &str, candidates: &[&str], max_results: usize) -> Vec<Suggestion> {
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance > 0 && distance <= MAX_SUGGESTION_DISTANCE).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    suggestions.sort_by_key(|s| s.distance);
    suggestions.truncate(max_results);
    suggestions
}

fn did_you_mean(matches: &[Suggestion]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }
    let quoted: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
    Some(format!("Did you mean {}?", quoted.join(" or ")))
}

/// Suggest a fix for an undefined variable path such as `values.replicsa`
///
/// Walks the path through `values` and proposes siblings of the first
/// missing key.
pub fn suggest_undefined_variable(variable: &str, values: Option<&JsonValue>) -> Option<String> {
    let mut parts = variable.split('.');
    let root = parts.next()?;

    if !CONTEXT_VARIABLES.contains(&root) {
        return did_you_mean(&find_closest_matches(root, CONTEXT_VARIABLES, 1))
            .or_else(|| Some(format!("`{}` is not defined. Available: {}", root, CONTEXT_VARIABLES.join(", "))));
    }

    let mut current = match root {
        "values" => values?,
        "environment" => {
            if parts.next()? != "values" {
                return None;
            }
            values?
        }
        _ => return None,
    };

    let mut walked = Vec::new();
    for part in parts {
        match current.get(part) {
            Some(next) => {
                walked.push(part);
                current = next;
            }
            None => {
                let available: Vec<&str> = current
                    .as_object()
                    .map(|m| m.keys().map(|k| k.as_str()).collect())
                    .unwrap_or_default();
                let hint = did_you_mean(&find_closest_matches(part, &available, 3));
                let location = if walked.is_empty() {
                    "environment values".to_string()
                } else {
                    format!("`{}`", walked.join("."))
                };
                return Some(match hint {
                    Some(hint) => format!("Key `{}` not found in {}. {}", part, location, hint),
                    None if available.is_empty() => {
                        format!("Key `{}` not found in {}. Use `| default(...)` for optional keys.", part, location)
                    }
                    None => format!(
                        "Key `{}` not found in {}. Available keys: {}",
                        part,
                        location,
                        available.join(", ")
                    ),
                });
            }
        }
    }
    None
}

/// Suggest a fix for an unknown filter
pub fn suggest_unknown_filter(filter_name: &str) -> Option<String> {
    did_you_mean(&find_closest_matches(filter_name, AVAILABLE_FILTERS, 3)).or_else(|| {
        Some(format!(
            "Unknown filter `{}`. Common filters: toyaml, tojson, quote, default, indent, nindent",
            filter_name
        ))
    })
}

/// Suggest a fix for an unknown function
pub fn suggest_unknown_function(func_name: &str) -> Option<String> {
    did_you_mean(&find_closest_matches(func_name, AVAILABLE_FUNCTIONS, 3)).or_else(|| {
        Some(format!(
            "Unknown function `{}`. Available functions: {}",
            func_name,
            AVAILABLE_FUNCTIONS.join(", ")
        ))
    })
}

/// Pull a quoted name out of a MiniJinja message such as "unknown filter: toyml"
pub fn extract_name_after(message: &str, marker: &str) -> Option<String> {
    let rest = &message[message.find(marker)? + marker.len()..];
    let name: String = rest
        .trim_start_matches([':', ' ', '`', '\'', '"'])
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!name.is_empty()).then_some(name)
}
