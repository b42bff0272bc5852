//! Document traversal and command orchestration
//!
//! Every document is loaded (nested ones included) and planned before the
//! executor is called once. A load or plan error therefore aborts the run
//! with no partial work. Documents are then converged one after the other.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sherpfile_core::fs::resolve_path;
use sherpfile_core::{
    ArrayMerge, DEFAULT_ENVIRONMENT, DesiredState, FileSystem, Selector, Settings, Values, parse_set_values,
};
use sherpfile_engine::{DesiredStateLoader, EngineError, LoadOptions, discover};
use sherpfile_kube::{
    ConvergeEngine, ConvergeOptions, ConvergeReport, Executor, FailurePolicy, Group, HelmExecutor, Interrupt,
    NeedsPolicy, Operation, PlanSummary, ReleaseGraph, ReleaseOutcome, ReleaseResult,
};

use crate::error::{CliError, Result};

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Document or directory given with --file
    pub file: Option<PathBuf>,
    pub environment: String,
    /// `--state-values-set` assignments
    pub state_values_set: Vec<String>,
    /// `--state-values-file` files, merged in order
    pub state_values_files: Vec<PathBuf>,
    pub namespace: String,
    pub kube_context: String,
    pub selectors: Vec<String>,
    /// Overrides `helmBinary` of every document
    pub helm_binary: Option<String>,
    /// Treat "no release matched" as success
    pub allow_no_matching_release: bool,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            file: None,
            environment: DEFAULT_ENVIRONMENT.to_string(),
            state_values_set: Vec::new(),
            state_values_files: Vec::new(),
            namespace: String::new(),
            kube_context: String::new(),
            selectors: Vec::new(),
            helm_binary: None,
            allow_no_matching_release: false,
        }
    }
}

/// A loaded document and its nesting depth
#[derive(Debug, Clone)]
pub struct Document {
    pub state: DesiredState,
    pub depth: usize,
}

/// A document with its releases placed into groups
#[derive(Debug, Clone)]
pub struct DocumentPlan {
    pub state: DesiredState,
    pub groups: Vec<Group>,
    /// Releases matched by the document's selectors
    pub matched: usize,
}

impl DocumentPlan {
    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_groups(&self.groups)
    }

    fn skipped(&self, reason: &str) -> Vec<ReleaseResult> {
        let mut results: Vec<ReleaseResult> = self
            .groups
            .iter()
            .flat_map(|group| &group.releases)
            .map(|planned| {
                ReleaseResult::new(
                    planned.index,
                    planned.id.clone(),
                    ReleaseOutcome::Skipped(reason.to_string()),
                )
            })
            .collect();
        results.sort_by_key(|r| r.index);
        results
    }
}

/// Ties the loader, the planner and the converge engine together
pub struct App {
    loader: DesiredStateLoader,
    options: AppOptions,
    executor: Option<Arc<dyn Executor>>,
    interrupt: Interrupt,
}

impl App {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Settings, options: AppOptions) -> Self {
        Self {
            loader: DesiredStateLoader::new(fs, settings),
            options,
            executor: None,
            interrupt: Interrupt::new(),
        }
    }

    /// Use `executor` for every document instead of the helm binary
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// State value overrides: files in order, then `--state-values-set`
    pub fn state_overrides(&self) -> Result<Values> {
        let fs = self.loader.fs();
        let cwd = fs.getwd()?;

        let mut overrides = Values::new();
        for file in &self.options.state_values_files {
            let path = resolve_path(&cwd, &file.to_string_lossy());
            let values = Values::from_yaml(&fs.read_to_string(&path)?)?;
            overrides.merge_with(&values, ArrayMerge::Replace);
        }
        overrides.merge_with(&parse_set_values(&self.options.state_values_set)?, ArrayMerge::Replace);
        Ok(overrides)
    }

    /// Load every document reachable from the entry point
    ///
    /// Nested documents come before their parent, unless `reverse` is set,
    /// in which case the parent comes first and nested documents follow in
    /// reverse declaration order.
    pub fn documents(&self, reverse: bool) -> Result<Vec<Document>> {
        let opts = LoadOptions {
            environment: self.options.environment.clone(),
            overrides: self.state_overrides()?,
            namespace: self.options.namespace.clone(),
            kube_context: self.options.kube_context.clone(),
            selectors: self.options.selectors.clone(),
            reverse,
        };

        let mut documents = Vec::new();
        for path in discover(self.loader.fs(), self.options.file.as_deref())? {
            self.visit(&path, &opts, &mut Vec::new(), &mut documents)?;
        }
        Ok(documents)
    }

    fn visit(
        &self,
        path: &Path,
        opts: &LoadOptions,
        ancestors: &mut Vec<PathBuf>,
        out: &mut Vec<Document>,
    ) -> Result<()> {
        let state = match self.loader.load(path, opts) {
            Ok(state) => state,
            // Nested documents need not declare every environment
            Err(err) if err.is_undefined_environment() && !ancestors.is_empty() => {
                tracing::debug!(file = %path.display(), "skipping document: {}", err);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let nested = self.loader.nested_documents(&state)?;
        let file = state.file_path.clone();
        let mut pending = Some(Document {
            state,
            depth: ancestors.len(),
        });
        if opts.reverse {
            out.extend(pending.take());
        }

        ancestors.push(file.clone());
        for child in nested {
            if ancestors.contains(&child.path) {
                return Err(EngineError::RecursiveHelmfile {
                    file,
                    pattern: child.path.display().to_string(),
                }
                .into());
            }

            let mut overrides = opts.overrides.clone();
            overrides.merge_with(&child.overrides, ArrayMerge::Replace);
            let child_opts = LoadOptions {
                overrides,
                selectors: child.selectors,
                ..opts.clone()
            };
            self.visit(&child.path, &child_opts, ancestors, out)?;
        }
        ancestors.pop();

        out.extend(pending);
        Ok(())
    }

    /// Build each document's release graph and group it for `operation`
    pub fn plan(&self, documents: Vec<Document>, policy: NeedsPolicy, operation: Operation) -> Result<Vec<DocumentPlan>> {
        let mut plans = Vec::with_capacity(documents.len());
        for document in documents {
            let selector = Selector::parse(&document.state.selectors)?;
            let graph = ReleaseGraph::build(&document.state.releases, &selector, policy)?;
            let groups = graph.groups(operation.is_reverse())?;
            let matched = graph.nodes().iter().filter(|node| node.selected).count();

            tracing::debug!(
                file = %document.state.file_path.display(),
                depth = document.depth,
                releases = graph.len(),
                matched,
                groups = groups.len(),
                "planned document"
            );
            plans.push(DocumentPlan {
                state: document.state,
                groups,
                matched,
            });
        }
        Ok(plans)
    }

    /// Fail when no document had a matching release
    pub fn ensure_matched(&self, plans: &[DocumentPlan]) -> Result<()> {
        if plans.iter().any(|plan| plan.matched > 0) {
            return Ok(());
        }
        if self.options.allow_no_matching_release {
            tracing::warn!("no release matched the given selectors");
            return Ok(());
        }
        Err(CliError::NoMatchingRelease {
            selectors: self.options.selectors.join(","),
            environment: self.options.environment.clone(),
        })
    }

    /// Converge every planned document in order
    ///
    /// `args` are appended after each document's `helmDefaults.args`.
    pub async fn converge(&self, plans: &[DocumentPlan], options: &ConvergeOptions, args: &[String]) -> ConvergeReport {
        let mut report = ConvergeReport::default();
        let mut halted = false;

        for plan in plans {
            if halted {
                report.results.extend(plan.skipped("an earlier helmfile failed"));
                continue;
            }

            let mut document_args = plan.state.helm_defaults.args.clone();
            document_args.extend(args.iter().cloned());

            tracing::debug!(file = %plan.state.file_path.display(), "converging document");
            let engine = ConvergeEngine::new(self.executor_for(&plan.state), options.clone())
                .with_interrupt(self.interrupt.clone());
            let pass = engine
                .converge(&plan.groups, &plan.state.base_dir, &document_args)
                .await;

            halted = pass.has_failures() && options.failure_policy == FailurePolicy::FailFast;
            report.append(pass);
        }
        report
    }

    fn executor_for(&self, state: &DesiredState) -> Arc<dyn Executor> {
        match &self.executor {
            Some(executor) => Arc::clone(executor),
            None => {
                let binary = self
                    .options
                    .helm_binary
                    .clone()
                    .unwrap_or_else(|| state.helm_binary().to_string());
                Arc::new(HelmExecutor::new(binary))
            }
        }
    }
}
