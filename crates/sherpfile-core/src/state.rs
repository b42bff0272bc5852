//! Desired state documents
//!
//! A `DesiredState` is one rendered document: the declared fields parsed from
//! YAML plus the runtime attributes the loader attaches (file path, base
//! directory, resolved environment, active selectors).

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentSpec, MissingFileHandler};
use crate::release::ReleaseSpec;
use crate::values::ValuesEntry;

/// Default helm binary
pub const DEFAULT_HELM_BINARY: &str = "helm";

/// One rendered document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DesiredState {
    /// Documents layered underneath this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<String>,

    /// Named environments
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environments: IndexMap<String, EnvironmentSpec>,

    /// Defaults applied to every release
    #[serde(default, skip_serializing_if = "HelmDefaults::is_empty")]
    pub helm_defaults: HelmDefaults,

    /// Path to the helm binary
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub helm_binary: String,

    /// Namespace forced onto every release
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Policy for sub-helmfile patterns that match nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_file_handler: Option<MissingFileHandler>,

    /// Document default values, shadowed by environment values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<ValuesEntry>,

    /// Declared releases, in declaration order
    #[serde(default)]
    pub releases: Vec<ReleaseSpec>,

    /// Nested documents
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub helmfiles: Vec<SubHelmfileSpec>,

    /// Absolute path of the document file
    #[serde(skip)]
    pub file_path: PathBuf,

    /// Directory every relative path in the document resolves against
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Environment the document was rendered with
    #[serde(skip)]
    pub env: Environment,

    /// Selectors active for this document
    #[serde(skip)]
    pub selectors: Vec<String>,
}

impl DesiredState {
    /// Layer `overlay` on top of this document
    ///
    /// Per-field policy:
    /// - `bases`, `values`, `releases`, `helmfiles`: appended
    /// - `environments`: merged per name (value lists appended, handler overridden)
    /// - `helmDefaults`: merged field by field (`args` appended)
    /// - `helmBinary`, `namespace`, `missingFileHandler`: overridden when set
    ///
    /// Runtime attributes are left untouched; the loader owns them.
    pub fn merge(&mut self, overlay: &DesiredState) {
        self.bases.extend(overlay.bases.iter().cloned());

        for (name, spec) in &overlay.environments {
            match self.environments.get_mut(name) {
                Some(existing) => {
                    existing.values.extend(spec.values.iter().cloned());
                    if spec.missing_file_handler != MissingFileHandler::default() {
                        existing.missing_file_handler = spec.missing_file_handler;
                    }
                }
                None => {
                    self.environments.insert(name.clone(), spec.clone());
                }
            }
        }

        self.helm_defaults.merge(&overlay.helm_defaults);

        override_string(&mut self.helm_binary, &overlay.helm_binary);
        override_string(&mut self.namespace, &overlay.namespace);
        if overlay.missing_file_handler.is_some() {
            self.missing_file_handler = overlay.missing_file_handler;
        }

        self.values.extend(overlay.values.iter().cloned());
        self.releases.extend(overlay.releases.iter().cloned());
        self.helmfiles.extend(overlay.helmfiles.iter().cloned());
    }

    /// Push document-level settings down onto each release
    ///
    /// The document `namespace` always wins; `helmDefaults` only fill gaps.
    pub fn apply_release_defaults(&mut self) {
        let defaults = &self.helm_defaults;
        for release in &mut self.releases {
            if !self.namespace.is_empty() {
                release.namespace = self.namespace.clone();
            } else if release.namespace.is_empty() {
                release.namespace = defaults.namespace.clone();
            }
            if release.kube_context.is_empty() {
                release.kube_context = defaults.kube_context.clone();
            }
            if release.tiller_namespace.is_empty() {
                release.tiller_namespace = defaults.tiller_namespace.clone();
            }
            if release.wait.is_none() {
                release.wait = defaults.wait;
            }
            if release.timeout.is_none() {
                release.timeout = defaults.timeout;
            }
        }
    }

    /// Effective helm binary
    pub fn helm_binary(&self) -> &str {
        if self.helm_binary.is_empty() {
            DEFAULT_HELM_BINARY
        } else {
            &self.helm_binary
        }
    }

    /// Effective policy for unmatched sub-helmfile patterns
    pub fn missing_file_handler(&self) -> MissingFileHandler {
        self.missing_file_handler.unwrap_or_default()
    }

    /// Render the declared fields back to YAML
    pub fn to_yaml(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn override_string(target: &mut String, overlay: &str) {
    if !overlay.is_empty() {
        *target = overlay.to_string();
    }
}

/// `helmDefaults:` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HelmDefaults {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_context: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tiller_namespace: String,

    /// Namespace for releases that declare none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Extra arguments passed to every helm invocation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl HelmDefaults {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, overlay: &HelmDefaults) {
        override_string(&mut self.kube_context, &overlay.kube_context);
        override_string(&mut self.tiller_namespace, &overlay.tiller_namespace);
        override_string(&mut self.namespace, &overlay.namespace);
        self.args.extend(overlay.args.iter().cloned());
        if overlay.wait.is_some() {
            self.wait = overlay.wait;
        }
        if overlay.timeout.is_some() {
            self.timeout = overlay.timeout;
        }
    }
}

/// Reference to a nested document
///
/// Written either as a bare path/glob or as a mapping with selectors and
/// value overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSubHelmfile", into = "RawSubHelmfile")]
pub struct SubHelmfileSpec {
    /// Path or glob pattern, relative to the declaring document
    pub path: String,

    /// Own selectors; `None` when the key was absent
    pub selectors: Option<Vec<String>>,

    /// Use the parent's selectors
    pub selectors_inherited: bool,

    /// Override values passed down to the nested document
    pub values: Vec<ValuesEntry>,
}

impl SubHelmfileSpec {
    /// A bare path reference
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Selectors the nested document should run with
    ///
    /// With explicit inheritance only `selectorsInherited: true` passes the
    /// parent's selectors down; in legacy mode an entry without its own
    /// `selectors` inherits them too.
    pub fn effective_selectors(&self, parent: &[String], explicit_inheritance: bool) -> Vec<String> {
        let inherit = self.selectors_inherited || (!explicit_inheritance && self.selectors.is_none());
        if inherit {
            parent.to_vec()
        } else {
            self.selectors.clone().unwrap_or_default()
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawSubHelmfile {
    Path(String),
    Full(RawSubHelmfileMap),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSubHelmfileMap {
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    selectors_inherited: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<ValuesEntry>,
}

impl TryFrom<RawSubHelmfile> for SubHelmfileSpec {
    type Error = String;

    fn try_from(raw: RawSubHelmfile) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawSubHelmfile::Path(path) => Ok(Self::new(path)),
            RawSubHelmfile::Full(map) => {
                let has_own = map.selectors.as_ref().is_some_and(|s| !s.is_empty());
                if map.selectors_inherited && has_own {
                    return Err(format!(
                        "helmfile '{}': selectorsInherited: true cannot be combined with explicit selectors",
                        map.path
                    ));
                }
                Ok(Self {
                    path: map.path,
                    selectors: map.selectors,
                    selectors_inherited: map.selectors_inherited,
                    values: map.values,
                })
            }
        }
    }
}

impl From<SubHelmfileSpec> for RawSubHelmfile {
    fn from(spec: SubHelmfileSpec) -> Self {
        if spec.selectors.is_none() && !spec.selectors_inherited && spec.values.is_empty() {
            RawSubHelmfile::Path(spec.path)
        } else {
            RawSubHelmfile::Full(RawSubHelmfileMap {
                path: spec.path,
                selectors: spec.selectors,
                selectors_inherited: spec.selectors_inherited,
                values: spec.values,
            })
        }
    }
}
