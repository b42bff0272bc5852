//! Release definitions and identities

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};
use crate::values::ValuesEntry;

/// A release as declared in a document's `releases:` list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReleaseSpec {
    /// Release name
    pub name: String,

    /// Chart reference (path or repo/chart)
    #[serde(default)]
    pub chart: String,

    /// Chart version constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Target namespace
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Kube context override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_context: String,

    /// Tiller namespace override
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tiller_namespace: String,

    /// Whether the release should exist (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,

    /// Labels used for selector matching
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,

    /// Releases that must converge before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,

    /// Value files and inline values passed to the chart
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,

    /// Individual `--set` values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<SetValue>,

    /// Wait for resources to become ready
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Create the namespace if missing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_namespace: Option<bool>,
}

/// A single `--set name=value` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetValue {
    pub name: String,
    pub value: JsonValue,
}

impl SetValue {
    /// Render as a `name=value` argument
    pub fn to_arg(&self) -> String {
        let value = match &self.value {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        };
        format!("{}={}", self.name, value)
    }
}

impl ReleaseSpec {
    /// Create a release with a name and chart
    pub fn new(name: impl Into<String>, chart: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chart: chart.into(),
            ..Default::default()
        }
    }

    /// Whether the release should be present after converging
    pub fn desired(&self) -> bool {
        self.installed.unwrap_or(true)
    }

    /// Qualified identity of this release
    pub fn id(&self) -> ReleaseId {
        ReleaseId {
            kube_context: self.kube_context.clone(),
            tiller_namespace: self.tiller_namespace.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Declared labels plus the implicit `name`, `namespace` and `chart` labels
    pub fn selector_labels(&self) -> IndexMap<String, String> {
        let mut labels = self.labels.clone();
        labels
            .entry("name".to_string())
            .or_insert_with(|| self.name.clone());
        labels
            .entry("namespace".to_string())
            .or_insert_with(|| self.namespace.clone());
        labels
            .entry("chart".to_string())
            .or_insert_with(|| self.chart.clone());
        labels
    }

    /// Resolve each `needs` entry to a qualified identity
    pub fn resolved_needs(&self) -> Result<Vec<ReleaseId>> {
        self.needs
            .iter()
            .map(|need| ReleaseId::parse_need(self, need))
            .collect()
    }
}

/// Qualified release identity: kube context, tiller namespace, namespace, name
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReleaseId {
    pub kube_context: String,
    pub tiller_namespace: String,
    pub namespace: String,
    pub name: String,
}

impl ReleaseId {
    /// Normalize a `needs` entry relative to the release declaring it
    ///
    /// Accepted forms: `name`, `namespace/name`, `tillerNamespace/namespace/name`
    /// and `kubeContext/tillerNamespace/namespace/name`. Omitted leading parts
    /// are inherited from `from`.
    pub fn parse_need(from: &ReleaseSpec, need: &str) -> Result<ReleaseId> {
        let parts: Vec<&str> = need.trim().split('/').collect();
        if need.trim().is_empty() {
            return Err(CoreError::InvalidNeed {
                release: from.name.clone(),
                need: need.to_string(),
                message: "empty reference".to_string(),
            });
        }

        let mut id = from.id();
        match parts.as_slice() {
            [name] => {
                id.name = (*name).to_string();
            }
            [namespace, name] => {
                id.namespace = (*namespace).to_string();
                id.name = (*name).to_string();
            }
            [tiller_namespace, namespace, name] => {
                id.tiller_namespace = (*tiller_namespace).to_string();
                id.namespace = (*namespace).to_string();
                id.name = (*name).to_string();
            }
            [kube_context, tiller_namespace, namespace, name] => {
                id.kube_context = (*kube_context).to_string();
                id.tiller_namespace = (*tiller_namespace).to_string();
                id.namespace = (*namespace).to_string();
                id.name = (*name).to_string();
            }
            _ => {
                return Err(CoreError::InvalidNeed {
                    release: from.name.clone(),
                    need: need.to_string(),
                    message: "expected at most 4 '/'-separated parts".to_string(),
                });
            }
        }

        if id.name.is_empty() {
            return Err(CoreError::InvalidNeed {
                release: from.name.clone(),
                need: need.to_string(),
                message: "release name is empty".to_string(),
            });
        }

        Ok(id)
    }
}

impl std::fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in [&self.kube_context, &self.tiller_namespace, &self.namespace] {
            if !part.is_empty() {
                write!(f, "{}/", part)?;
            }
        }
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, namespace: &str) -> ReleaseSpec {
        ReleaseSpec {
            namespace: namespace.to_string(),
            ..ReleaseSpec::new(name, "charts/app")
        }
    }

    #[test]
    fn test_id_display_skips_empty_parts() {
        let mut r = release("api", "backend");
        assert_eq!(r.id().to_string(), "backend/api");

        r.kube_context = "prod".to_string();
        r.tiller_namespace = "kube-system".to_string();
        assert_eq!(r.id().to_string(), "prod/kube-system/backend/api");

        assert_eq!(ReleaseSpec::new("bare", "c").id().to_string(), "bare");
    }

    #[test]
    fn test_parse_need_bare_name_inherits_scope() {
        let mut r = release("frontend", "web");
        r.kube_context = "prod".to_string();

        let id = ReleaseId::parse_need(&r, "backend").unwrap();
        assert_eq!(id.name, "backend");
        assert_eq!(id.namespace, "web");
        assert_eq!(id.kube_context, "prod");
    }

    #[test]
    fn test_parse_need_qualified() {
        let r = release("frontend", "web");

        let id = ReleaseId::parse_need(&r, "data/postgres").unwrap();
        assert_eq!(id.namespace, "data");
        assert_eq!(id.name, "postgres");

        let id = ReleaseId::parse_need(&r, "tiller/data/postgres").unwrap();
        assert_eq!(id.tiller_namespace, "tiller");

        let id = ReleaseId::parse_need(&r, "ctx/tiller/data/postgres").unwrap();
        assert_eq!(id.kube_context, "ctx");
        assert_eq!(id.to_string(), "ctx/tiller/data/postgres");
    }

    #[test]
    fn test_parse_need_invalid() {
        let r = release("frontend", "web");
        assert!(ReleaseId::parse_need(&r, "").is_err());
        assert!(ReleaseId::parse_need(&r, "a/b/c/d/e").is_err());
        assert!(ReleaseId::parse_need(&r, "web/").is_err());
    }

    #[test]
    fn test_selector_labels_include_implicit() {
        let mut r = release("api", "backend");
        r.labels.insert("tier".to_string(), "app".to_string());

        let labels = r.selector_labels();
        assert_eq!(labels.get("tier").unwrap(), "app");
        assert_eq!(labels.get("name").unwrap(), "api");
        assert_eq!(labels.get("namespace").unwrap(), "backend");
        assert_eq!(labels.get("chart").unwrap(), "charts/app");
    }

    #[test]
    fn test_desired_defaults_to_true() {
        let mut r = release("api", "backend");
        assert!(r.desired());
        r.installed = Some(false);
        assert!(!r.desired());
    }

    #[test]
    fn test_deserialize_release() {
        let r: ReleaseSpec = serde_yaml::from_str(
            r#"
name: frontend
chart: ./charts/frontend
namespace: web
installed: false
labels:
  tier: web
needs: [backend]
values:
  - frontend.yaml
  - replicas: 2
set:
  - name: image.tag
    value: v2
"#,
        )
        .unwrap();

        assert_eq!(r.name, "frontend");
        assert!(!r.desired());
        assert_eq!(r.needs, vec!["backend"]);
        assert_eq!(r.values.len(), 2);
        assert_eq!(r.set[0].to_arg(), "image.tag=v2");
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: std::result::Result<ReleaseSpec, _> =
            serde_yaml::from_str("name: a\nchart: b\nchrat: typo\n");
        assert!(result.is_err());
    }
}
