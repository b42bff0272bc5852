//! Document template renderer based on MiniJinja

use minijinja::{Environment, UndefinedBehavior};
use sherpfile_core::TemplateContext;

use crate::error::TemplateError;
use crate::filters;
use crate::functions;

/// How undefined values are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Any undefined reference is an error
    Strict,
    /// Undefined values and their attributes render as empty
    Tolerant,
}

/// Renderer builder
pub struct RendererBuilder {
    mode: RenderMode,
}

impl Default for RendererBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererBuilder {
    pub fn new() -> Self {
        Self {
            mode: RenderMode::Strict,
        }
    }

    /// Set the undefined-value behaviour
    pub fn mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(self) -> TemplateRenderer {
        TemplateRenderer::new(self.mode)
    }
}

/// Renders one document part or values file
#[derive(Debug, Clone, Copy)]
pub struct TemplateRenderer {
    mode: RenderMode,
}

impl TemplateRenderer {
    pub fn new(mode: RenderMode) -> Self {
        Self { mode }
    }

    /// Renderer for the second pass
    pub fn strict() -> Self {
        Self::new(RenderMode::Strict)
    }

    /// Renderer for the first pass
    pub fn tolerant() -> Self {
        Self::new(RenderMode::Tolerant)
    }

    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        env.set_undefined_behavior(match self.mode {
            RenderMode::Strict => UndefinedBehavior::Strict,
            RenderMode::Tolerant => UndefinedBehavior::Chainable,
        });
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trimprefix", filters::trimprefix);
        env.add_filter("trimsuffix", filters::trimsuffix);

        env.add_function("dict", functions::dict);
        env.add_function("get", functions::get);
        env.add_function("env", functions::env);

        // The first pass sees unresolved values, so assertions stay quiet
        match self.mode {
            RenderMode::Strict => {
                env.add_filter("required", filters::required);
                env.add_function("fail", functions::fail);
                env.add_function("required_env", functions::required_env);
            }
            RenderMode::Tolerant => {
                env.add_filter("required", filters::required_tolerant);
                env.add_function("fail", functions::fail_tolerant);
                env.add_function("required_env", functions::required_env_tolerant);
            }
        }

        env
    }

    /// Render `source` with `context`
    ///
    /// `name` identifies the source in diagnostics.
    pub fn render(&self, source: &str, context: &TemplateContext, name: &str) -> Result<String, TemplateError> {
        let mut env = self.create_environment();
        let values = &context.values;

        env.add_template_owned(name.to_string(), source.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, name, source, Some(values)))?;
        let tmpl = env
            .get_template(name)
            .map_err(|e| TemplateError::from_minijinja(e, name, source, Some(values)))?;

        let ctx = minijinja::context! {
            environment => &context.environment,
            values => &context.values,
            namespace => &context.namespace,
            document => &context.document,
        };

        tmpl.render(ctx)
            .map_err(|e| TemplateError::from_minijinja(e, name, source, Some(values)))
    }
}
