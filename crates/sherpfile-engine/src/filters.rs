//! Template filters for helmfile documents

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(invalid)
}

/// Convert a value to YAML
///
/// Usage: {{ environment.values.ingress | toyaml | nindent(4) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(invalid)?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to compact JSON
///
/// Usage: {{ values.labels | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(invalid)
}

/// Usage: {{ values.password | b64encode }}
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Usage: {{ encoded | b64decode }}
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;
    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn as_text(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

/// Wrap in double quotes
///
/// Usage: {{ environment.name | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    format!("\"{}\"", as_text(&value).replace('\\', "\\\\").replace('"', "\\\""))
}

/// Wrap in single quotes, YAML style
#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line
///
/// Usage: {{ block | indent(2) }}
#[must_use]
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("{}{}", pad, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Newline followed by the indented text
///
/// Usage: {{ block | toyaml | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Fail when the value is undefined, none or an empty string
///
/// Usage: {{ environment.values.domain | required("domain is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined() || value.is_none() || value.as_str().is_some_and(str::is_empty);
    if missing {
        Err(invalid(message.unwrap_or_else(|| "required value is missing".to_string())))
    } else {
        Ok(value)
    }
}

/// `required` for the first pass, where values are not resolved yet
pub fn required_tolerant(value: Value, _message: Option<String>) -> Value {
    value
}

/// Hex SHA-256 digest
#[must_use]
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(value.as_bytes()))
}

/// Usage: {{ version | trimprefix("v") }}
#[must_use]
pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

/// Usage: {{ file | trimsuffix(".yaml") }}
#[must_use]
pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({"host": "example.com", "port": 443}));
        assert_eq!(toyaml(value).unwrap(), "host: example.com\nport: 443");
    }

    #[test]
    fn test_tojson() {
        let value = Value::from_serialize(serde_json::json!({"a": [1, 2]}));
        assert_eq!(tojson(value).unwrap(), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn test_b64_roundtrip() {
        let encoded = b64encode("s3cr3t".to_string());
        assert_eq!(encoded, "czNjcjN0");
        assert_eq!(b64decode(encoded).unwrap(), "s3cr3t");
        assert!(b64decode("%%%".to_string()).is_err());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("prod")), "\"prod\"");
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
        assert_eq!(quote(Value::from(3)), "\"3\"");
    }

    #[test]
    fn test_indent_and_nindent() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("a\nb".to_string(), 4), "\n    a\n    b");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        assert!(required(Value::from(""), Some("need it".to_string())).is_err());
        assert!(required(Value::from(0), None).is_ok());
    }

    #[test]
    fn test_required_tolerant_passes_missing_values_through() {
        assert!(required_tolerant(Value::UNDEFINED, Some("need it".to_string())).is_undefined());
        assert_eq!(required_tolerant(Value::from("x"), None).as_str(), Some("x"));
    }

    #[test]
    fn test_sha256() {
        assert_eq!(
            sha256sum("abc".to_string()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_trim() {
        assert_eq!(trimprefix("v1.2.3".to_string(), "v".to_string()), "1.2.3");
        assert_eq!(trimsuffix("app.yaml".to_string(), ".yaml".to_string()), "app");
        assert_eq!(trimsuffix("app".to_string(), ".yaml".to_string()), "app");
    }
}
