//! Global template functions

use minijinja::{Error, ErrorKind, Value};

/// Fail with a custom error message
///
/// Usage: {{ fail("unsupported environment") }}
pub fn fail(message: String) -> Result<Value, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, message))
}

/// `fail` for the first pass: renders nothing
pub fn fail_tolerant(_message: String) -> Value {
    Value::from("")
}

/// Create a dict from key-value pairs
///
/// Usage: {{ dict("tier", "web", "replicas", 2) | toyaml }}
pub fn dict(args: Vec<Value>) -> Result<Value, Error> {
    if !args.len().is_multiple_of(2) {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "dict requires an even number of arguments (key-value pairs)",
        ));
    }

    let mut map = serde_json::Map::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "dict keys must be strings"))?;
        let value = serde_json::to_value(&pair[1])
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        map.insert(key.to_string(), value);
    }
    Ok(Value::from_serialize(serde_json::Value::Object(map)))
}

/// Look up a key, falling back to a default
///
/// Usage: {{ get(environment.values, "replicas", 1) }}
pub fn get(obj: Value, key: String, default: Option<Value>) -> Value {
    match obj.get_attr(&key) {
        Ok(v) if !v.is_undefined() => v,
        _ => default.unwrap_or(Value::UNDEFINED),
    }
}

/// Read a process environment variable, empty when unset
///
/// Usage: {{ env("IMAGE_TAG", "latest") }}
pub fn env(name: String, default: Option<String>) -> String {
    std::env::var(&name)
        .ok()
        .or(default)
        .unwrap_or_default()
}

/// Read a process environment variable that must be set and non-empty
///
/// Usage: {{ required_env("KUBE_TOKEN") }}
pub fn required_env(name: String) -> Result<String, Error> {
    match std::env::var(&name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("required environment variable {} is not set", name),
        )),
    }
}

/// `required_env` for the first pass: empty when unset
pub fn required_env_tolerant(name: String) -> String {
    std::env::var(&name).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict() {
        let result = dict(vec![
            Value::from("tier"),
            Value::from("web"),
            Value::from("replicas"),
            Value::from(2),
        ])
        .unwrap();
        assert_eq!(result.get_attr("tier").unwrap().as_str(), Some("web"));
        assert!(dict(vec![Value::from("odd")]).is_err());
        assert!(dict(vec![Value::from(1), Value::from(2)]).is_err());
    }

    #[test]
    fn test_get_with_default() {
        let obj = Value::from_serialize(serde_json::json!({"replicas": 3}));
        assert_eq!(get(obj.clone(), "replicas".to_string(), None).as_i64(), Some(3));
        assert_eq!(
            get(obj, "missing".to_string(), Some(Value::from(1))).as_i64(),
            Some(1)
        );
    }

    #[test]
    fn test_env_falls_back_to_default() {
        assert_eq!(
            env("SHERPFILE_TEST_SURELY_UNSET_VAR".to_string(), Some("dflt".to_string())),
            "dflt"
        );
        assert_eq!(env("SHERPFILE_TEST_SURELY_UNSET_VAR".to_string(), None), "");
    }

    #[test]
    fn test_required_env() {
        let err = required_env("SHERPFILE_TEST_SURELY_UNSET_VAR".to_string()).unwrap_err();
        assert!(err.to_string().contains("SHERPFILE_TEST_SURELY_UNSET_VAR"));

        // cargo sets this for every test binary it runs
        let name = required_env("CARGO_PKG_NAME".to_string()).unwrap();
        assert_eq!(name, "sherpfile-engine");
    }

    #[test]
    fn test_fail() {
        let err = fail("boom".to_string()).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_tolerant_variants_do_not_raise() {
        assert_eq!(fail_tolerant("boom".to_string()).as_str(), Some(""));
        assert_eq!(required_env_tolerant("SHERPFILE_TEST_SURELY_UNSET_VAR".to_string()), "");
    }
}
