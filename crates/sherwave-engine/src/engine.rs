//! Template engine based on MiniJinja

use minijinja::Environment;
use serde::Serialize;
use sherwave_core::{LoadedPack, PackMetadata, Templater, Values};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;
use crate::manifest::RenderedManifestSet;

/// `release` object visible to pack templates
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
}

impl ReleaseInfo {
    /// Release info for revision `revision`, where 1 means a first install
    pub fn for_revision(name: impl Into<String>, namespace: impl Into<String>, revision: u32) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision,
            is_install: revision <= 1,
            is_upgrade: revision > 1,
        }
    }
}

/// Context a values file is rendered with
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValuesContext {
    /// Process environment
    pub env: BTreeMap<String, String>,

    pub release: ValuesRelease,
}

/// `release` object visible to values templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValuesRelease {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub context: String,
}

impl ValuesContext {
    /// Context for a release, capturing the current process environment
    pub fn for_release(id: &sherwave_core::ReleaseId) -> Self {
        Self {
            env: std::env::vars().collect(),
            release: ValuesRelease {
                id: id.to_string(),
                name: id.name().to_string(),
                namespace: id.namespace().to_string(),
                context: id.context().to_string(),
            },
        }
    }
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The template engine
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("squote", filters::squote);
        env.add_filter("indent", filters::indent);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("required", filters::required);
        env.add_filter("sha256", filters::sha256sum);

        env
    }

    /// Render a single template string against any serializable context
    pub fn render_string<S: Serialize>(
        &self,
        template: &str,
        context: S,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        let tmpl = env
            .get_template(template_name)
            .map_err(|e| TemplateError::from_minijinja(e, template_name, template))?;

        tmpl.render(context)
            .map_err(|e| EngineError::Template(TemplateError::from_minijinja(e, template_name, template)))
    }

    /// Materialize one values file into `dest`, creating parent directories
    pub fn render_values(
        &self,
        src: &Path,
        dest: &Path,
        context: &ValuesContext,
        templater: Templater,
    ) -> Result<()> {
        if !src.is_file() {
            return Err(EngineError::MissingValues {
                path: src.display().to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match templater {
            Templater::Copy => {
                std::fs::copy(src, dest)?;
            }
            Templater::Minijinja => {
                let source = std::fs::read_to_string(src)?;
                let rendered = self.render_string(&source, context, &src.display().to_string())?;
                std::fs::write(dest, rendered)?;
            }
        }

        tracing::debug!(src = %src.display(), dest = %dest.display(), %templater, "rendered values");
        Ok(())
    }

    /// Render every template of a pack
    ///
    /// The pack's `values.yaml` is the base; `values` is merged over it.
    /// Templates whose file name starts with `_` are loaded as helpers but
    /// produce no output.
    pub fn render_pack(
        &self,
        pack: &LoadedPack,
        values: &Values,
        release: &ReleaseInfo,
    ) -> Result<RenderedManifestSet> {
        let mut merged = pack.default_values()?;
        merged.merge(values);

        let template_files = pack.template_files()?;
        let mut env = self.create_environment();
        let mut sources = Vec::with_capacity(template_files.len());

        for file_path in &template_files {
            let name = file_path
                .strip_prefix(&pack.templates_dir)
                .unwrap_or(file_path)
                .to_string_lossy()
                .to_string();
            let content = std::fs::read_to_string(file_path)?;
            env.add_template_owned(name.clone(), content.clone())
                .map_err(|e| TemplateError::from_minijinja(e, &name, &content))?;
            sources.push((name, content));
        }

        let ctx = minijinja::context! {
            values => merged.inner(),
            release => release,
            pack => &PackContext::from(&pack.pack.metadata),
        };

        let mut rendered = Vec::new();
        for (name, content) in &sources {
            let is_helper = Path::new(name)
                .file_name()
                .is_some_and(|f| f.to_string_lossy().starts_with('_'));
            if is_helper {
                continue;
            }

            let tmpl = env
                .get_template(name)
                .map_err(|e| TemplateError::from_minijinja(e, name, content))?;
            let output = tmpl
                .render(&ctx)
                .map_err(|e| TemplateError::from_minijinja(e, name, content))?;
            rendered.push((name.as_str(), output));
        }

        let set = RenderedManifestSet::from_documents(
            rendered.iter().map(|(n, o)| (*n, o.as_str())),
            &release.namespace,
        )?;
        tracing::debug!(
            pack = %pack.pack.metadata.name,
            release = %release.name,
            templates = rendered.len(),
            workloads = set.specs.len(),
            "rendered pack"
        );
        Ok(set)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PackContext {
    name: String,
    version: String,
    app_version: Option<String>,
}

impl From<&PackMetadata> for PackContext {
    fn from(meta: &PackMetadata) -> Self {
        Self {
            name: meta.name.clone(),
            version: meta.version.to_string(),
            app_version: meta.app_version.clone(),
        }
    }
}
