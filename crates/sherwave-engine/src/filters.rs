//! Template filters
//!
//! Registered on every environment the engine builds, for values files and
//! pack templates alike.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Scalars in their YAML/JSON spelling (`true`, `8080`), strings as is
fn as_text(value: &Value) -> String {
    if let Some(s) = value.as_str() {
        return s.to_string();
    }
    if value.is_undefined() || value.is_none() {
        return String::new();
    }
    match to_json(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(json) => json.to_string(),
        Err(_) => value.to_string(),
    }
}

/// Usage: {{ values.resources | toyaml | nindent(10) }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Usage: {{ values.config | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("base64 decode error: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("UTF-8 decode error: {}", e)))
}

/// Double-quote a value, escaping backslashes and quotes
pub fn quote(value: Value) -> String {
    let s = as_text(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn squote(value: Value) -> String {
    format!("'{}'", as_text(&value).replace('\'', "''"))
}

/// Indent every non-empty line
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `indent` with a leading newline
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

/// Usage: {{ values.image.tag | required("image.tag is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    let missing = value.is_undefined()
        || value.is_none()
        || value.as_str().is_some_and(str::is_empty);
    if missing {
        let msg = message.unwrap_or_else(|| "required value is missing".to_string());
        return Err(Error::new(ErrorKind::InvalidOperation, msg));
    }
    Ok(value)
}

pub fn sha256sum(value: String) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toyaml() {
        let value = Value::from_serialize(serde_json::json!({ "cpu": "100m", "replicas": 2 }));
        let yaml = toyaml(value).unwrap();
        assert!(yaml.contains("cpu: 100m"));
        assert!(yaml.contains("replicas: 2"));
        assert!(!yaml.ends_with('\n'));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(Value::from("a\"b")), "\"a\\\"b\"");
        assert_eq!(quote(Value::from(8080)), "\"8080\"");
        assert_eq!(squote(Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_quote_scalars_use_yaml_spelling() {
        assert_eq!(quote(Value::from(true)), "\"true\"");
        assert_eq!(squote(Value::from(false)), "'false'");
        assert_eq!(quote(Value::from(2.5)), "\"2.5\"");
        assert_eq!(quote(Value::from(())), "\"\"");
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n\n  b");
        assert_eq!(nindent("a".to_string(), 4), "\n    a");
    }

    #[test]
    fn test_required() {
        assert!(required(Value::from("x"), None).is_ok());
        assert!(required(Value::UNDEFINED, None).is_err());
        let err = required(Value::from(""), Some("tag is required".into())).unwrap_err();
        assert!(err.to_string().contains("tag is required"));
    }

    #[test]
    fn test_b64() {
        assert_eq!(b64encode("admin".into()), "YWRtaW4=");
        assert_eq!(b64decode("YWRtaW4=".into()).unwrap(), "admin");
    }
}
