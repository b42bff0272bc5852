//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::environment::Environment;

/// Context available to document templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Selected environment
    pub environment: EnvironmentInfo,

    /// Alias of `environment.values`
    pub values: JsonValue,

    /// Namespace the document is rendered for
    pub namespace: String,

    /// Current document info
    pub document: DocumentInfo,
}

/// Environment information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Environment name
    pub name: String,

    /// Defaults overlaid with environment values
    pub values: JsonValue,
}

impl From<&Environment> for EnvironmentInfo {
    fn from(env: &Environment) -> Self {
        Self {
            name: env.name.clone(),
            values: env.merged_values().into_inner(),
        }
    }
}

/// Current document information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    /// Document file name
    pub name: String,

    /// Directory of the document
    pub base_path: String,

    /// 1-based index of the `---` part being rendered
    pub part: usize,
}

impl TemplateContext {
    /// Create a context for `env`
    pub fn new(env: &Environment, namespace: impl Into<String>) -> Self {
        let environment = EnvironmentInfo::from(env);
        Self {
            values: environment.values.clone(),
            environment,
            namespace: namespace.into(),
            document: DocumentInfo::default(),
        }
    }

    /// Context of a first pass: the environment name only, no values
    pub fn minimal(env_name: &str, namespace: impl Into<String>) -> Self {
        Self::new(&Environment::new(env_name), namespace)
    }

    /// Set the current document info
    pub fn with_document(mut self, name: &str, base_path: &str, part: usize) -> Self {
        self.document = DocumentInfo {
            name: name.to_string(),
            base_path: base_path.to_string(),
            part,
        };
        self
    }

    /// Convert to minijinja-compatible context
    pub fn to_json(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}
