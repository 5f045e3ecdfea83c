//! One materialization run: acquire, extract, materialize.

use std::path::Path;

use crate::acquire::{Acquirer, EmbeddedResources};
use crate::archive::ArchiveExtractor;
use crate::context::Context;
use crate::materialize::{MaterializeSummary, TreeMaterializer, DEFAULT_TEMPLATE_SUFFIX};
use crate::render::VelocityRenderer;
use crate::Result;

/// Builder for [`Generator`]
#[derive(Debug, Clone)]
pub struct GeneratorBuilder {
    template_suffix: String,
    strict: bool,
    embedded: EmbeddedResources,
    checksum: Option<String>,
    user_agent: Option<String>,
    strip_components: usize,
}

impl Default for GeneratorBuilder {
    fn default() -> Self {
        Self {
            template_suffix: DEFAULT_TEMPLATE_SUFFIX.to_string(),
            strict: false,
            embedded: &[],
            checksum: None,
            user_agent: None,
            strip_components: 0,
        }
    }
}

impl GeneratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filename suffix marking files to render
    pub fn template_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.template_suffix = suffix.into();
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn embedded(mut self, resources: EmbeddedResources) -> Self {
        self.embedded = resources;
        self
    }

    /// Expected hex digest of the package archive
    pub fn checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn strip_components(mut self, n: usize) -> Self {
        self.strip_components = n;
        self
    }

    pub fn build(self) -> Generator {
        let mut acquirer = Acquirer::new().with_embedded(self.embedded);
        if let Some(user_agent) = self.user_agent {
            acquirer = acquirer.with_user_agent(user_agent);
        }

        let renderer = VelocityRenderer::new().strict(self.strict);
        let materializer =
            TreeMaterializer::with_renderer(renderer).template_suffix(self.template_suffix);

        Generator {
            acquirer,
            extractor: ArchiveExtractor::with_strip_components(self.strip_components),
            materializer,
            checksum: self.checksum,
        }
    }
}

/// Generates a project tree from a template package
#[derive(Debug)]
pub struct Generator {
    acquirer: Acquirer,
    extractor: ArchiveExtractor,
    materializer: TreeMaterializer<VelocityRenderer>,
    checksum: Option<String>,
}

impl Default for Generator {
    fn default() -> Self {
        GeneratorBuilder::new().build()
    }
}

impl Generator {
    pub fn builder() -> GeneratorBuilder {
        GeneratorBuilder::new()
    }

    /// Acquire the package behind `locator` and materialize it into `dest`.
    ///
    /// Temporary staging files are removed when the run finishes, whether
    /// or not it succeeded.
    pub fn run(&self, locator: &str, dest: &Path, context: &Context) -> Result<MaterializeSummary> {
        log::info!("Generating {} from {}", dest.display(), locator);

        let package = self
            .acquirer
            .acquire(locator, self.checksum.as_deref(), &self.extractor)?;
        log::debug!("Extracted package to {}", package.root().display());

        self.run_dir(package.root(), dest, context)
    }

    /// Materialize an already extracted template directory into `dest`
    pub fn run_dir(
        &self,
        source_dir: &Path,
        dest: &Path,
        context: &Context,
    ) -> Result<MaterializeSummary> {
        let summary = self.materializer.materialize(source_dir, dest, context)?;
        log::info!(
            "Created {} directories and {} files ({} rendered)",
            summary.directories,
            summary.files,
            summary.rendered
        );
        Ok(summary)
    }
}
