//! The engine facade: options, builder, file lookup, and compiled-template
//! caching around the `runnel-core` pipeline.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use runnel_core::parser::Parser;
use runnel_core::render::{Renderer, TemplateLoader};
use runnel_core::{
    filters, syntax, tags, FilterHandler, FilterRegistry, Scope, TagHandler, TagRegistry,
    Template, TemplateError,
};

/// Engine configuration.
///
/// `roots` are probed in order when a template is looked up by name;
/// `extension` is appended to extensionless names; `cache` memoizes compiled
/// templates by resolved file path for the engine's lifetime.
#[derive(Debug, Clone)]
pub struct Options {
    pub roots: Vec<PathBuf>,
    pub extension: String,
    pub cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from(".")],
            extension: ".runnel".to_string(),
            cache: false,
        }
    }
}

/// Builds an [`Engine`]: options plus tag/filter registration.
///
/// Registration happens here, before the engine exists, so a built engine's
/// registries are immutable — concurrent renders never race registration.
/// The built-in tag and filter libraries are pre-registered; registering a
/// conflicting name fails with a validation error.
pub struct EngineBuilder {
    options: Options,
    tags: TagRegistry,
    filters: FilterRegistry,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        let mut tag_registry = TagRegistry::new();
        let mut filter_registry = FilterRegistry::new();
        // Fresh registries never collide with the built-in names.
        tags::register_defaults(&mut tag_registry).expect("built-in tags register");
        filters::register_defaults(&mut filter_registry).expect("built-in filters register");
        Self {
            options: Options::default(),
            tags: tag_registry,
            filters: filter_registry,
        }
    }

    /// Replaces the root directory list with a single root.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.roots = vec![root.into()];
        self
    }

    /// Appends another root directory; lookup probes roots in order.
    pub fn add_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.roots.push(root.into());
        self
    }

    /// Default file extension for extensionless template names, dot
    /// included (`".runnel"`).
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.options.extension = extension.into();
        self
    }

    /// Enables compiled-template caching keyed by resolved file path.
    pub fn cache(mut self, cache: bool) -> Self {
        self.options.cache = cache;
        self
    }

    /// Registers a custom tag. Fails on a name conflict or a malformed
    /// handler contract.
    pub fn register_tag(
        mut self,
        name: impl Into<String>,
        handler: Box<dyn TagHandler>,
    ) -> Result<Self, TemplateError> {
        self.tags.register(name, handler)?;
        Ok(self)
    }

    /// Registers a custom filter handler (possibly asynchronous).
    pub fn register_filter(
        mut self,
        name: impl Into<String>,
        handler: Box<dyn FilterHandler>,
    ) -> Result<Self, TemplateError> {
        self.filters.register(name, handler)?;
        Ok(self)
    }

    /// Registers a synchronous filter from a closure.
    pub fn register_filter_fn<F>(
        mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<Self, TemplateError>
    where
        F: Fn(Value, &[Value]) -> Result<Value, TemplateError> + Send + Sync + 'static,
    {
        self.filters.register_fn(name, f)?;
        Ok(self)
    }

    pub fn build(self) -> Engine {
        Engine {
            inner: EngineInner {
                options: self.options,
                tags: self.tags,
                filters: self.filters,
                cache: RwLock::new(HashMap::new()),
            },
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured template engine.
///
/// Owns one tag registry, one filter registry, and the template cache; every
/// render call gets a fresh [`Scope`]. The engine itself doubles as the
/// loader capability behind `include` and `layout`, so templates loaded from
/// files see the same registered extensions.
pub struct Engine {
    inner: EngineInner,
}

struct EngineInner {
    options: Options,
    tags: TagRegistry,
    filters: FilterRegistry,
    cache: RwLock<HashMap<PathBuf, Arc<Template>>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// An engine with default options and the built-in libraries.
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Compiles template source into a reusable [`Template`].
    pub fn parse(&self, source: &str) -> Result<Template, TemplateError> {
        Parser::new(&self.inner.tags).parse(source)
    }

    /// Renders a compiled template against a fresh scope seeded from
    /// `context`.
    pub async fn render<T: Serialize>(
        &self,
        template: &Template,
        context: &T,
    ) -> Result<String, TemplateError> {
        let mut scope = Scope::new(context_value(context)?);
        self.renderer().render_template(template, &mut scope).await
    }

    /// Compiles and renders in one step.
    pub async fn parse_and_render<T: Serialize>(
        &self,
        source: &str,
        context: &T,
    ) -> Result<String, TemplateError> {
        let template = self.parse(source)?;
        self.render(&template, context).await
    }

    /// Looks the template up across the configured roots, compiles it
    /// (through the cache when enabled), and renders it. Errors coming out
    /// of the file are annotated with its path.
    pub async fn render_file<T: Serialize>(
        &self,
        name: &str,
        context: &T,
    ) -> Result<String, TemplateError> {
        let path = self.inner.resolve(name).await?;
        let template = self.inner.load_compiled(&path).await?;
        let mut scope = Scope::new(context_value(context)?);
        self.renderer()
            .render_template(&template, &mut scope)
            .await
            .map_err(|e| e.with_file(path))
    }

    /// Evaluates a standalone expression (filters included) the way an
    /// output node would, returning the value instead of rendered text.
    pub async fn evaluate<T: Serialize>(
        &self,
        expression: &str,
        context: &T,
    ) -> Result<Value, TemplateError> {
        let scope = Scope::new(context_value(context)?);
        syntax::evaluate(expression, &scope, &self.inner.filters).await
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.inner.tags, &self.inner.filters).with_loader(&self.inner)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn context_value<T: Serialize>(context: &T) -> Result<Value, TemplateError> {
    serde_json::to_value(context)
        .map_err(|e| TemplateError::render(format!("context is not serializable: {}", e)))
}

impl EngineInner {
    /// Probes each root in order for the named template, appending the
    /// default extension to extensionless names. The first existing file
    /// wins.
    async fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let file_name = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}{}", name, self.options.extension)
        };
        for root in &self.options.roots {
            let candidate = root.join(&file_name);
            if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
                if metadata.is_file() {
                    return Ok(candidate);
                }
            }
        }
        let roots = self
            .options
            .roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(TemplateError::not_found(format!(
            "failed to look up '{}' in: {}",
            name, roots
        )))
    }

    /// Reads and compiles a template file, memoized by path when caching is
    /// enabled. The lock is never held across an await.
    async fn load_compiled(&self, path: &Path) -> Result<Arc<Template>, TemplateError> {
        if self.options.cache {
            let cache = self.cache.read().unwrap_or_else(|p| p.into_inner());
            if let Some(template) = cache.get(path) {
                return Ok(Arc::clone(template));
            }
        }
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TemplateError::from(e).with_file(path))?;
        let template = Arc::new(
            Parser::new(&self.tags)
                .parse(&source)
                .map_err(|e| e.with_file(path))?,
        );
        if self.options.cache {
            let mut cache = self.cache.write().unwrap_or_else(|p| p.into_inner());
            cache.insert(path.to_path_buf(), Arc::clone(&template));
        }
        Ok(template)
    }
}

impl TemplateLoader for EngineInner {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<Template>, TemplateError>> {
        Box::pin(async move {
            let path = self.resolve(name).await?;
            self.load_compiled(&path).await
        })
    }
}
