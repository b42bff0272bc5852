//! Desired state loading
//!
//! Turns one document file into one [`DesiredState`]: splits it into
//! `---` parts, resolves each part's environment, renders and parses it,
//! layers bases underneath, and applies command-line overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sherpfile_core::fs::{is_glob_pattern, resolve_path};
use sherpfile_core::{
    CoreError, DEFAULT_ENVIRONMENT, DesiredState, Environment, FileSystem, MissingFileHandler, Settings, Values,
};

use crate::discovery;
use crate::environment::{
    EnvironmentsBlock, LenientEnvironmentSpec, PartLocation, extract_environments, load_values_entries,
    render_first_pass, render_second_pass, resolve_environment,
};
use crate::error::{EngineError, Result};
use crate::renderer::TemplateRenderer;

/// Per-load inputs
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Requested environment name
    pub environment: String,

    /// Values that override environment values (state values, parent overrides)
    pub overrides: Values,

    /// Namespace given on the command line
    pub namespace: String,

    /// Kube context given on the command line
    pub kube_context: String,

    /// Selectors active for this document
    pub selectors: Vec<String>,

    /// Reverse the order of nested documents
    pub reverse: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            overrides: Values::new(),
            namespace: String::new(),
            kube_context: String::new(),
            selectors: Vec::new(),
            reverse: false,
        }
    }
}

/// A nested document found through `helmfiles:`
#[derive(Debug, Clone, PartialEq)]
pub struct NestedDocument {
    /// Absolute path of the nested document
    pub path: PathBuf,

    /// Selectors it runs with
    pub selectors: Vec<String>,

    /// Values passed down by the parent's `helmfiles[].values`
    pub overrides: Values,
}

/// Loads documents through a [`FileSystem`]
pub struct DesiredStateLoader {
    fs: Arc<dyn FileSystem>,
    settings: Settings,
    tolerant: TemplateRenderer,
    strict: TemplateRenderer,
}

impl DesiredStateLoader {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Settings) -> Self {
        Self {
            fs,
            settings,
            tolerant: TemplateRenderer::tolerant(),
            strict: TemplateRenderer::strict(),
        }
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Load one document with its bases and command-line overrides applied
    pub fn load(&self, path: &Path, opts: &LoadOptions) -> Result<DesiredState> {
        let file = self.fs.abs(path)?;
        tracing::debug!(file = %file.display(), environment = %opts.environment, "loading document");

        let base_dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut state = self.load_file(&file, &base_dir, opts, None, true)?;

        if !opts.namespace.is_empty() {
            if !state.namespace.is_empty() {
                return Err(EngineError::ConflictingNamespace { file });
            }
            state.namespace = opts.namespace.clone();
        }
        if !opts.kube_context.is_empty() {
            if !state.helm_defaults.kube_context.is_empty() {
                return Err(EngineError::ConflictingKubeContext { file });
            }
            state.helm_defaults.kube_context = opts.kube_context.clone();
        }

        state.apply_release_defaults();
        state.selectors = opts.selectors.clone();
        if opts.reverse {
            state.helmfiles.reverse();
        }
        Ok(state)
    }

    fn load_file(
        &self,
        file: &Path,
        base_dir: &Path,
        opts: &LoadOptions,
        inherited: Option<&Environment>,
        evaluate_bases: bool,
    ) -> Result<DesiredState> {
        if !self.fs.file_exists_at(file) {
            if self.fs.directory_exists_at(file) {
                return Err(CoreError::DirectoryNotFound {
                    path: format!("{} is a directory, expected a file", file.display()),
                }
                .into());
            }
            return Err(CoreError::FileNotFound {
                path: file.display().to_string(),
            }
            .into());
        }
        let source = self.fs.read_to_string(file)?;
        self.load_source(&source, file, base_dir, opts, inherited, evaluate_bases)
    }

    /// Load a document from its raw text
    ///
    /// Parts are loaded in order; each part starts from the environment the
    /// previous parts resolved, and is merged into the running document.
    /// Relative paths resolve against `base_dir`, which for a base is the
    /// including document's directory.
    pub fn load_source(
        &self,
        source: &str,
        file: &Path,
        base_dir: &Path,
        opts: &LoadOptions,
        inherited: Option<&Environment>,
        evaluate_bases: bool,
    ) -> Result<DesiredState> {
        let base_dir = base_dir.to_path_buf();
        let mut document = DesiredState::default();
        let mut carried = inherited.cloned();

        for (index, part) in split_parts(source).into_iter().enumerate() {
            let location = PartLocation {
                file,
                base_dir: &base_dir,
                part: index + 1,
                namespace: &opts.namespace,
            };
            let loaded = self.load_part(part, location, opts, carried.as_ref(), evaluate_bases)?;
            carried = Some(loaded.env.clone());
            document.merge(&loaded);
            document.env = loaded.env;
        }

        document.file_path = file.to_path_buf();
        document.base_dir = base_dir;
        Ok(document)
    }

    fn load_part(
        &self,
        source: &str,
        location: PartLocation<'_>,
        opts: &LoadOptions,
        carried: Option<&Environment>,
        evaluate_bases: bool,
    ) -> Result<DesiredState> {
        let renders = self.settings.renders(location.file);

        let first = if renders {
            let first_env = carried
                .cloned()
                .unwrap_or_else(|| Environment::new(&opts.environment));
            render_first_pass(&self.tolerant, source, &first_env, location)
        } else {
            Some(source.to_string())
        };

        let mut block = match first.as_deref().map(extract_environments) {
            Some(Ok(block)) => block,
            Some(Err(e)) => {
                tracing::warn!(
                    file = %location.file.display(),
                    part = location.part,
                    "could not read environments from the first pass, using an empty environment: {}",
                    e
                );
                EnvironmentsBlock::default()
            }
            None => EnvironmentsBlock::default(),
        };

        let declared_bases = block.bases.clone();
        let mut bases = Vec::new();
        if evaluate_bases && !declared_bases.is_empty() {
            bases = self.load_bases(&declared_bases, location, opts, carried)?;
            let mut layered = EnvironmentsBlock::default();
            for base in &bases {
                layered.merge(&environments_of(base));
            }
            layered.merge(&block);
            block = layered;
        }

        let env = resolve_environment(
            self.fs.as_ref(),
            &self.strict,
            &block,
            &opts.environment,
            carried,
            &opts.overrides,
            location,
        )?;

        let rendered = if renders {
            render_second_pass(&self.strict, source, &env, location)?
        } else {
            source.to_string()
        };
        let mut state = parse_part(&rendered, location)?;

        for release in &state.releases {
            if release.chart.trim().is_empty() {
                return Err(EngineError::EmptyChart {
                    release: release.name.clone(),
                    part: location.part,
                    file: location.file.to_path_buf(),
                });
            }
        }

        if evaluate_bases {
            if state.bases != declared_bases {
                bases = self.load_bases(&state.bases, location, opts, carried)?;
            }
            if !bases.is_empty() {
                let mut layered = DesiredState::default();
                for base in &bases {
                    layered.merge(base);
                }
                layered.merge(&state);
                state = layered;
            }
        } else if !state.bases.is_empty() {
            return Err(EngineError::NestedBase {
                base: location.file.to_path_buf(),
            });
        }

        state.env = env;
        Ok(state)
    }

    /// Load each base without evaluating its own bases
    fn load_bases(
        &self,
        paths: &[String],
        location: PartLocation<'_>,
        opts: &LoadOptions,
        carried: Option<&Environment>,
    ) -> Result<Vec<DesiredState>> {
        // Bases share the including document's environment, declared or not
        let inherited = carried
            .cloned()
            .unwrap_or_else(|| Environment::new(&opts.environment));

        paths
            .iter()
            .map(|path| {
                let file = resolve_path(location.base_dir, path);
                tracing::debug!(base = %file.display(), "loading base");
                self.load_file(&file, location.base_dir, opts, Some(&inherited), false)
            })
            .collect()
    }

    /// Expand `helmfiles:` into concrete documents
    ///
    /// Patterns resolve against the document's directory and glob matches
    /// are sorted. A reference back to the document itself, or to its
    /// directory, is a recursion error.
    pub fn nested_documents(&self, state: &DesiredState) -> Result<Vec<NestedDocument>> {
        let mut nested = Vec::new();

        for spec in &state.helmfiles {
            let trimmed = spec.path.trim().trim_end_matches('/');
            if trimmed.is_empty() || trimmed == "." {
                return Err(EngineError::RecursiveHelmfile {
                    file: state.file_path.clone(),
                    pattern: spec.path.clone(),
                });
            }

            let pattern = resolve_path(&state.base_dir, &spec.path);
            let matches = if is_glob_pattern(&spec.path) {
                self.fs.glob(&pattern.to_string_lossy())?
            } else if self.fs.file_exists_at(&pattern) || self.fs.directory_exists_at(&pattern) {
                vec![pattern]
            } else {
                Vec::new()
            };

            if matches.is_empty() {
                let message = format!(
                    "no helmfile matches '{}' (referenced from {})",
                    spec.path,
                    state.file_path.display()
                );
                if state.missing_file_handler().should_fail(&message) {
                    return Err(EngineError::NoMatchingFiles {
                        pattern: spec.path.clone(),
                        file: state.file_path.clone(),
                    });
                }
                continue;
            }

            let selectors = spec.effective_selectors(&state.selectors, self.settings.explicit_selector_inheritance);
            let location = PartLocation {
                file: &state.file_path,
                base_dir: &state.base_dir,
                part: 1,
                namespace: &state.namespace,
            };
            let overrides = load_values_entries(
                self.fs.as_ref(),
                &self.strict,
                &spec.values,
                MissingFileHandler::Error,
                &state.env,
                location,
            )?;

            for matched in matches {
                let matched = self.fs.abs(&matched)?;
                if matched == state.file_path || matched == state.base_dir {
                    return Err(EngineError::RecursiveHelmfile {
                        file: state.file_path.clone(),
                        pattern: spec.path.clone(),
                    });
                }

                let documents = if self.fs.directory_exists_at(&matched) {
                    discovery::documents_in_dir(self.fs.as_ref(), &matched)?
                } else {
                    vec![matched]
                };
                for path in documents {
                    nested.push(NestedDocument {
                        path,
                        selectors: selectors.clone(),
                        overrides: overrides.clone(),
                    });
                }
            }
        }

        Ok(nested)
    }
}

/// Split a document on `---` separator lines
///
/// A separator may carry trailing whitespace or a CR. A leading separator
/// does not open an empty part.
fn split_parts(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in source.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line.trim_end() != "---" {
            continue;
        }
        if line_start > 0 {
            let part = &source[start..line_start];
            parts.push(part.strip_suffix('\n').map_or(part, |p| p.strip_suffix('\r').unwrap_or(p)));
        }
        start = offset;
    }

    parts.push(&source[start..]);
    parts
}

/// Strict parse of a rendered part
fn parse_part(rendered: &str, location: PartLocation<'_>) -> Result<DesiredState> {
    let parse_error = |e: serde_yaml::Error| EngineError::Parse {
        file: location.file.to_path_buf(),
        part: location.part,
        message: e.to_string(),
    };

    let value: serde_yaml::Value = serde_yaml::from_str(rendered).map_err(parse_error)?;
    if value.is_null() {
        return Ok(DesiredState::default());
    }
    serde_yaml::from_str(rendered).map_err(parse_error)
}

/// Environment-related keys of a loaded base
fn environments_of(state: &DesiredState) -> EnvironmentsBlock {
    EnvironmentsBlock {
        bases: Vec::new(),
        environments: state
            .environments
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    LenientEnvironmentSpec {
                        values: spec.values.clone(),
                        missing_file_handler: spec.missing_file_handler,
                    },
                )
            })
            .collect(),
        values: state.values.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherpfile_core::MemoryFileSystem;

    fn loader(fs: MemoryFileSystem) -> DesiredStateLoader {
        DesiredStateLoader::new(Arc::new(fs), Settings::default())
    }

    fn env_opts(name: &str) -> LoadOptions {
        LoadOptions {
            environment: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_parts() {
        assert_eq!(split_parts("a: 1\n---\nb: 2\n"), vec!["a: 1", "b: 2\n"]);
        assert_eq!(split_parts("---\na: 1\n"), vec!["a: 1\n"]);
        assert_eq!(split_parts(""), vec![""]);
    }

    #[test]
    fn test_split_parts_tolerates_crlf_and_trailing_space() {
        assert_eq!(split_parts("a: 1\r\n---\r\nb: 2\r\n"), vec!["a: 1", "b: 2\r\n"]);
        assert_eq!(split_parts("a: 1\n--- \nb: 2\n"), vec!["a: 1", "b: 2\n"]);
        assert_eq!(split_parts("a: 1\n---"), vec!["a: 1", ""]);
        assert_eq!(split_parts("a: '---'\nb: 2\n"), vec!["a: '---'\nb: 2\n"]);
    }

    #[test]
    fn test_load_renders_environment_values() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "helmfile.yaml",
                r#"
environments:
  production:
    values: [env/prod.yaml]
releases:
  - name: api
    chart: ./charts/api
    namespace: {{ values.ns }}
    labels:
      replicas: "{{ environment.values.replicas }}"
"#,
            )
            .with_file("env/prod.yaml", "ns: backend\nreplicas: 3\n");

        let state = loader(fs)
            .load(Path::new("helmfile.yaml"), &env_opts("production"))
            .unwrap();

        assert_eq!(state.env.name, "production");
        assert_eq!(state.releases[0].namespace, "backend");
        assert_eq!(state.releases[0].labels["replicas"], "3");
        assert_eq!(state.file_path, PathBuf::from("/work/helmfile.yaml"));
        assert_eq!(state.base_dir, PathBuf::from("/work"));
    }

    #[test]
    fn test_later_part_sees_earlier_environment() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "helmfile.yaml",
                r#"environments:
  default:
    values:
      - domain: example.com
---
releases:
  - name: web
    chart: charts/web
    labels:
      host: "{{ values.domain }}"
"#,
            );

        let state = loader(fs).load(Path::new("helmfile.yaml"), &LoadOptions::default()).unwrap();
        assert_eq!(state.releases[0].labels["host"], "example.com");
    }

    #[test]
    fn test_later_part_needs_no_declaration() {
        let fs = MemoryFileSystem::default().with_file(
            "helmfile.yaml",
            "environments:\n  staging: {}\n---\nreleases:\n  - name: a\n    chart: c\n",
        );
        let state = loader(fs).load(Path::new("helmfile.yaml"), &env_opts("staging")).unwrap();
        assert_eq!(state.releases.len(), 1);
        assert_eq!(state.env.name, "staging");
    }

    #[test]
    fn test_undefined_environment() {
        let fs = MemoryFileSystem::default().with_file("helmfile.yaml", "releases: []\n");
        let err = loader(fs)
            .load(Path::new("helmfile.yaml"), &env_opts("production"))
            .unwrap_err();
        assert!(err.is_undefined_environment());
    }

    #[test]
    fn test_strict_pass_error_names_part() {
        let fs = MemoryFileSystem::default().with_file(
            "helmfile.yaml",
            "releases: []\n---\nreleases:\n  - name: {{ values.missing }}\n    chart: c\n",
        );
        let err = loader(fs)
            .load(Path::new("helmfile.yaml"), &LoadOptions::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to render part 2 of /work/helmfile.yaml");
    }

    #[test]
    fn test_first_pass_keeps_environments_past_assertions() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "helmfile.yaml",
                r#"
environments:
  production:
    values: [prod.yaml]
releases:
  - name: db
    chart: charts/db
    labels:
      secret: "{{ values.password | required('password is required') }}"
      host: "{{ required_env('SHERPFILE_TEST_SURELY_UNSET_VAR') if values.external else 'local' }}"
"#,
            )
            .with_file("prod.yaml", "password: s3cret\nexternal: false\n");

        let state = loader(fs)
            .load(Path::new("helmfile.yaml"), &env_opts("production"))
            .unwrap();
        assert_eq!(state.releases[0].labels["secret"], "s3cret");
        assert_eq!(state.releases[0].labels["host"], "local");
    }

    #[test]
    fn test_unreadable_first_pass_degrades_to_empty_block() {
        // Without the override the first pass leaves an unterminated quote
        let fs = MemoryFileSystem::default().with_file("helmfile.yaml", "namespace: \"{{ values.q }}\n");
        let opts = LoadOptions {
            overrides: Values::from_yaml("q: 'apps\"'").unwrap(),
            ..Default::default()
        };
        let state = loader(fs).load(Path::new("helmfile.yaml"), &opts).unwrap();
        assert_eq!(state.namespace, "apps");
    }

    #[test]
    fn test_unparseable_part_reports_parse_error() {
        let fs = MemoryFileSystem::default().with_file("helmfile.yaml", "releases: []
---
releases: [
");
        let err = loader(fs)
            .load(Path::new("helmfile.yaml"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse { part: 2, .. }));
    }

    #[test]
    fn test_empty_chart_is_rejected() {
        let fs = MemoryFileSystem::default().with_file(
            "helmfile.yaml",
            "releases:\n  - name: a\n    chart: c\n---\nreleases:\n  - name: broken\n",
        );
        let err = loader(fs)
            .load(Path::new("helmfile.yaml"), &LoadOptions::default())
            .unwrap_err();
        match err {
            EngineError::EmptyChart { release, part, .. } => {
                assert_eq!(release, "broken");
                assert_eq!(part, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parts_merge_lists_and_scalars() {
        let fs = MemoryFileSystem::default().with_file(
            "helmfile.yaml",
            "helmBinary: helm2\nreleases:\n  - name: a\n    chart: c\n---\nhelmBinary: helm3\nreleases:\n  - name: b\n    chart: c\n",
        );
        let state = loader(fs).load(Path::new("helmfile.yaml"), &LoadOptions::default()).unwrap();
        let names: Vec<_> = state.releases.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(state.helm_binary(), "helm3");
    }

    #[test]
    fn test_bases_are_layered_under_the_document() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "common.yaml",
                "environments:\n  production:\n    values:\n      - replicas: 2\nhelmBinary: helm-base\nreleases:\n  - name: base-release\n    chart: c\n",
            )
            .with_file(
                "helmfile.yaml",
                "bases: [common.yaml]\nhelmBinary: helm-doc\nreleases:\n  - name: app\n    chart: c\n    labels:\n      replicas: \"{{ values.replicas }}\"\n",
            );

        let state = loader(fs)
            .load(Path::new("helmfile.yaml"), &env_opts("production"))
            .unwrap();

        let names: Vec<_> = state.releases.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["base-release", "app"]);
        assert_eq!(state.helm_binary(), "helm-doc");
        assert_eq!(state.releases[1].labels["replicas"], "2");
    }

    #[test]
    fn test_base_in_subdirectory_resolves_against_including_document() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "bases/common.yaml",
                "environments:\n  production:\n    values: [prod.yaml]\nreleases:\n  - name: shared\n    chart: charts/shared\n",
            )
            .with_file("prod.yaml", "replicas: 4\n")
            .with_file(
                "helmfile.yaml",
                "bases: [bases/common.yaml]\nreleases:\n  - name: app\n    chart: c\n    labels:\n      replicas: \"{{ values.replicas }}\"\n",
            );

        let state = loader(fs)
            .load(Path::new("helmfile.yaml"), &env_opts("production"))
            .unwrap();

        assert_eq!(state.releases[0].name, "shared");
        assert_eq!(state.releases[1].labels["replicas"], "4");
        assert_eq!(state.base_dir, PathBuf::from("/work"));
    }

    #[test]
    fn test_nested_bases_rejected() {
        let fs = MemoryFileSystem::default()
            .with_file("inner.yaml", "releases: []\n")
            .with_file("common.yaml", "bases: [inner.yaml]\n")
            .with_file("helmfile.yaml", "bases: [common.yaml]\n");

        let err = loader(fs)
            .load(Path::new("helmfile.yaml"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NestedBase { .. }));
    }

    #[test]
    fn test_namespace_override_conflict() {
        let fs = MemoryFileSystem::default()
            .with_file("helmfile.yaml", "namespace: apps\nreleases: []\n")
            .with_file("plain.yaml", "releases:\n  - name: a\n    chart: c\n");
        let loader = loader(fs);
        let opts = LoadOptions {
            namespace: "cli".to_string(),
            ..Default::default()
        };

        let err = loader.load(Path::new("helmfile.yaml"), &opts).unwrap_err();
        assert!(matches!(err, EngineError::ConflictingNamespace { .. }));

        let state = loader.load(Path::new("plain.yaml"), &opts).unwrap();
        assert_eq!(state.releases[0].namespace, "cli");
    }

    #[test]
    fn test_kube_context_override_conflict() {
        let fs = MemoryFileSystem::default()
            .with_file("helmfile.yaml", "helmDefaults:\n  kubeContext: prod\n");
        let opts = LoadOptions {
            kube_context: "dev".to_string(),
            ..Default::default()
        };
        let err = loader(fs).load(Path::new("helmfile.yaml"), &opts).unwrap_err();
        assert!(matches!(err, EngineError::ConflictingKubeContext { .. }));
    }

    #[test]
    fn test_missing_file_is_distinct_from_directory() {
        let fs = MemoryFileSystem::default().with_dir("somedir");
        let loader = loader(fs);

        let err = loader.load(Path::new("nope.yaml"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::FileNotFound { .. })));

        let err = loader.load(Path::new("somedir"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::Core(CoreError::DirectoryNotFound { .. })));
    }

    #[test]
    fn test_load_is_idempotent() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "helmfile.yaml",
                "environments:\n  default:\n    values: [v.yaml]\nreleases:\n  - name: a\n    chart: c\n    labels:\n      z: \"{{ values.z }}\"\n      a: \"{{ values.a }}\"\n",
            )
            .with_file("v.yaml", "z: last\na: first\n");
        let loader = loader(fs);

        let first = loader.load(Path::new("helmfile.yaml"), &LoadOptions::default()).unwrap();
        let second = loader.load(Path::new("helmfile.yaml"), &LoadOptions::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
    }

    #[test]
    fn test_loaded_state_yaml() {
        let fs = MemoryFileSystem::default().with_file(
            "helmfile.yaml",
            "releases:\n  - name: api\n    chart: ./charts/api\n    labels:\n      tier: \"{{ environment.name }}\"\n",
        );
        let opts = LoadOptions {
            namespace: "apps".to_string(),
            ..Default::default()
        };
        let state = loader(fs).load(Path::new("helmfile.yaml"), &opts).unwrap();

        insta::assert_snapshot!(state.to_yaml().unwrap(), @r"
        namespace: apps
        releases:
        - name: api
          chart: ./charts/api
          namespace: apps
          labels:
            tier: default
        ");
    }

    #[test]
    fn test_experimental_mode_renders_only_templates() {
        let fs = MemoryFileSystem::default()
            .with_file("plain.yaml", "releases:\n  - name: a\n    chart: c\n    labels:\n      raw: \"{{ x }}\"\n")
            .with_file("templated.yaml.j2", "releases:\n  - name: b\n    chart: c\n    labels:\n      env: \"{{ environment.name }}\"\n");
        let loader = DesiredStateLoader::new(
            Arc::new(fs),
            Settings {
                experimental: true,
                ..Default::default()
            },
        );

        let plain = loader.load(Path::new("plain.yaml"), &LoadOptions::default()).unwrap();
        assert_eq!(plain.releases[0].labels["raw"], "{{ x }}");

        let templated = loader
            .load(Path::new("templated.yaml.j2"), &LoadOptions::default())
            .unwrap();
        assert_eq!(templated.releases[0].labels["env"], "default");
    }

    #[test]
    fn test_nested_documents_are_globbed_and_sorted() {
        let fs = MemoryFileSystem::default()
            .with_file(
                "helmfile.yaml",
                "helmfiles:\n  - apps/*.yaml\n  - path: team/helmfile.yaml\n    selectors: [tier=web]\n    values:\n      - region: eu\n",
            )
            .with_file("apps/b.yaml", "")
            .with_file("apps/a.yaml", "")
            .with_file("team/helmfile.yaml", "");
        let loader = loader(fs);
        let opts = LoadOptions {
            selectors: vec!["name=api".to_string()],
            ..Default::default()
        };

        let state = loader.load(Path::new("helmfile.yaml"), &opts).unwrap();
        let nested = loader.nested_documents(&state).unwrap();

        let paths: Vec<_> = nested.iter().map(|n| n.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/work/apps/a.yaml"),
                PathBuf::from("/work/apps/b.yaml"),
                PathBuf::from("/work/team/helmfile.yaml"),
            ]
        );
        // Legacy inheritance: bare entries take the parent's selectors
        assert_eq!(nested[0].selectors, vec!["name=api"]);
        assert_eq!(nested[2].selectors, vec!["tier=web"]);
        assert_eq!(nested[2].overrides.get("region").unwrap(), "eu");
    }

    #[test]
    fn test_nested_reverse_order() {
        let fs = MemoryFileSystem::default()
            .with_file("helmfile.yaml", "helmfiles: [a.yaml, b.yaml]\n")
            .with_file("a.yaml", "")
            .with_file("b.yaml", "");
        let loader = loader(fs);
        let opts = LoadOptions {
            reverse: true,
            ..Default::default()
        };
        let state = loader.load(Path::new("helmfile.yaml"), &opts).unwrap();
        let nested = loader.nested_documents(&state).unwrap();
        assert_eq!(nested[0].path, PathBuf::from("/work/b.yaml"));
    }

    #[test]
    fn test_self_reference_is_recursion_error() {
        for reference in ["./*.yaml", "helmfile.yaml", ".", "./"] {
            let fs = MemoryFileSystem::default()
                .with_file("helmfile.yaml", format!("helmfiles: ['{}']\n", reference));
            let loader = loader(fs);
            let state = loader.load(Path::new("helmfile.yaml"), &LoadOptions::default()).unwrap();
            let err = loader.nested_documents(&state).unwrap_err();
            assert!(
                matches!(err, EngineError::RecursiveHelmfile { .. }),
                "{} gave {}",
                reference,
                err
            );
        }
    }

    #[test]
    fn test_unmatched_nested_pattern_policy() {
        let fs = MemoryFileSystem::default()
            .with_file("strict.yaml", "helmfiles: [missing/*.yaml]\n")
            .with_file("lenient.yaml", "missingFileHandler: Warn\nhelmfiles: [missing/*.yaml]\n");
        let loader = loader(fs);

        let state = loader.load(Path::new("strict.yaml"), &LoadOptions::default()).unwrap();
        assert!(matches!(
            loader.nested_documents(&state),
            Err(EngineError::NoMatchingFiles { .. })
        ));

        let state = loader.load(Path::new("lenient.yaml"), &LoadOptions::default()).unwrap();
        assert!(loader.nested_documents(&state).unwrap().is_empty());
    }
}
