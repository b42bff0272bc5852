//! Environment resolution for one document part
//!
//! A part may reference `environment.values` that are declared by the part
//! itself. Resolution is split into small steps that the loader chains:
//!
//! 1. [`render_first_pass`]: tolerant render with the carried environment
//! 2. [`extract_environments`]: lenient parse of `environments:`, `values:`
//!    and `bases:` only
//! 3. [`resolve_environment`]: fold value files and overrides into a new
//!    environment
//! 4. [`render_second_pass`]: strict render with the resolved environment

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use sherpfile_core::fs::{is_glob_pattern, resolve_path};
use sherpfile_core::{
    ArrayMerge, DEFAULT_ENVIRONMENT, Environment, FileSystem, MissingFileHandler, TemplateContext, Values,
    ValuesEntry,
};

use crate::error::{EngineError, Result};
use crate::renderer::TemplateRenderer;

/// Where the part being resolved lives
#[derive(Clone, Copy)]
pub struct PartLocation<'a> {
    /// The document file
    pub file: &'a Path,
    /// Directory relative paths resolve against
    pub base_dir: &'a Path,
    /// 1-based part index
    pub part: usize,
    /// Namespace exposed to templates
    pub namespace: &'a str,
}

impl PartLocation<'_> {
    fn template_name(&self) -> String {
        format!("{} (part {})", self.file.display(), self.part)
    }

    fn context(&self, env: &Environment) -> TemplateContext {
        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        TemplateContext::new(env, self.namespace).with_document(
            &name,
            &self.base_dir.to_string_lossy(),
            self.part,
        )
    }
}

/// The subset of a document the first pass looks at
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnvironmentsBlock {
    #[serde(default)]
    pub bases: Vec<String>,

    #[serde(default)]
    pub environments: IndexMap<String, LenientEnvironmentSpec>,

    /// Document defaults
    #[serde(default)]
    pub values: Vec<ValuesEntry>,
}

/// An `environments.<name>` entry, parsed without rejecting unknown keys
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LenientEnvironmentSpec {
    #[serde(default)]
    pub values: Vec<ValuesEntry>,

    #[serde(default)]
    pub missing_file_handler: MissingFileHandler,
}

impl EnvironmentsBlock {
    /// Layer `overlay` on top: value lists appended, handlers overridden
    pub fn merge(&mut self, overlay: &EnvironmentsBlock) {
        self.bases.extend(overlay.bases.iter().cloned());
        self.values.extend(overlay.values.iter().cloned());
        for (name, spec) in &overlay.environments {
            let entry = self.environments.entry(name.clone()).or_default();
            entry.values.extend(spec.values.iter().cloned());
            if spec.missing_file_handler != MissingFileHandler::default() {
                entry.missing_file_handler = spec.missing_file_handler;
            }
        }
    }
}

/// Tolerant render of a part
///
/// Returns `None` when the engine cannot produce output at all; the strict
/// pass reports the real error later.
pub fn render_first_pass(
    renderer: &TemplateRenderer,
    source: &str,
    env: &Environment,
    location: PartLocation<'_>,
) -> Option<String> {
    match renderer.render(source, &location.context(env), &location.template_name()) {
        Ok(rendered) => Some(rendered),
        Err(e) => {
            tracing::debug!(
                file = %location.file.display(),
                part = location.part,
                "first pass render failed, continuing with an empty environment: {}",
                e
            );
            None
        }
    }
}

/// Lenient extraction of the environment-related keys
pub fn extract_environments(rendered: &str) -> std::result::Result<EnvironmentsBlock, serde_yaml::Error> {
    let value: serde_yaml::Value = serde_yaml::from_str(rendered)?;
    if value.is_null() {
        return Ok(EnvironmentsBlock::default());
    }
    serde_yaml::from_value(value)
}

/// Build the environment for `name`
///
/// `carried` is the environment inherited from earlier parts (or a parent);
/// without one, an undeclared non-default name is an error. Overrides are
/// applied last and replace lists.
pub fn resolve_environment(
    fs: &dyn FileSystem,
    renderer: &TemplateRenderer,
    block: &EnvironmentsBlock,
    name: &str,
    carried: Option<&Environment>,
    overrides: &Values,
    location: PartLocation<'_>,
) -> Result<Environment> {
    let spec = block.environments.get(name);
    if spec.is_none() && carried.is_none() && name != DEFAULT_ENVIRONMENT {
        return Err(EngineError::UndefinedEnvironment {
            name: name.to_string(),
            file: location.file.to_path_buf(),
        });
    }

    let base = carried.cloned().unwrap_or_else(|| Environment::new(name));

    let defaults = load_values_entries(
        fs,
        renderer,
        &block.values,
        MissingFileHandler::Error,
        &base,
        location,
    )?;
    let mut layer = Environment {
        name: name.to_string(),
        values: Values::new(),
        defaults,
    };

    if let Some(spec) = spec {
        let so_far = base.merge(&layer, ArrayMerge::Append);
        layer.values = load_values_entries(
            fs,
            renderer,
            &spec.values,
            spec.missing_file_handler,
            &so_far,
            location,
        )?;
    }

    let resolved = base
        .merge(&layer, ArrayMerge::Append)
        .with_overrides(overrides, ArrayMerge::Replace);

    tracing::debug!(
        file = %location.file.display(),
        part = location.part,
        environment = %resolved.name,
        "resolved environment"
    );
    Ok(resolved)
}

/// Strict render of a part with the resolved environment
pub fn render_second_pass(
    renderer: &TemplateRenderer,
    source: &str,
    env: &Environment,
    location: PartLocation<'_>,
) -> Result<String> {
    renderer
        .render(source, &location.context(env), &location.template_name())
        .map_err(|source| EngineError::Render {
            file: location.file.to_path_buf(),
            part: location.part,
            source,
        })
}

/// Fold a `values:` list left to right
///
/// File entries resolve against the part's directory and may be globs;
/// files ending in `.j2` are rendered strictly with `env` first. Missing
/// files follow `handler`.
pub fn load_values_entries(
    fs: &dyn FileSystem,
    renderer: &TemplateRenderer,
    entries: &[ValuesEntry],
    handler: MissingFileHandler,
    env: &Environment,
    location: PartLocation<'_>,
) -> Result<Values> {
    let mut result = Values::new();
    for entry in entries {
        match entry {
            ValuesEntry::Inline(map) => {
                result.merge_with(&Values(serde_json::Value::Object(map.clone())), ArrayMerge::Append);
            }
            ValuesEntry::File(pattern) => {
                let files = match_values_files(fs, location.base_dir, pattern)?;
                if files.is_empty() {
                    let message = format!(
                        "environment values file matching '{}' does not exist in {}",
                        pattern,
                        location.base_dir.display()
                    );
                    if handler.should_fail(&message) {
                        return Err(EngineError::MissingValuesFile {
                            pattern: pattern.clone(),
                            file: location.file.to_path_buf(),
                        });
                    }
                    continue;
                }
                for file in files {
                    let values = load_values_file(fs, renderer, &file, env, location)?;
                    result.merge_with(&values, ArrayMerge::Append);
                }
            }
        }
    }
    Ok(result)
}

fn match_values_files(fs: &dyn FileSystem, base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let path = resolve_path(base_dir, pattern);
    if is_glob_pattern(pattern) {
        Ok(fs.glob(&path.to_string_lossy())?)
    } else if fs.file_exists_at(&path) {
        Ok(vec![path])
    } else {
        Ok(Vec::new())
    }
}

/// Read one values file, rendering it first when it is a template
pub fn load_values_file(
    fs: &dyn FileSystem,
    renderer: &TemplateRenderer,
    file: &Path,
    env: &Environment,
    location: PartLocation<'_>,
) -> Result<Values> {
    let content = fs.read_to_string(file)?;
    let content = if file.extension().is_some_and(|ext| ext == "j2") {
        let name = file.display().to_string();
        renderer
            .render(&content, &location.context(env), &name)
            .map_err(|source| EngineError::ValuesTemplate {
                file: file.to_path_buf(),
                source,
            })?
    } else {
        content
    };

    Values::from_yaml(&content).map_err(|e| EngineError::ValuesFile {
        file: file.to_path_buf(),
        message: e.to_string(),
    })
}
