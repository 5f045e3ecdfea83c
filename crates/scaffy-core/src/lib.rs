pub mod acquire;
pub mod archive;
pub mod checksum;
pub mod context;
pub mod error;
pub mod expand;
pub mod generator;
pub mod materialize;
pub mod render;

pub use error::{ScaffoldError, Result};
pub use context::Context;
pub use acquire::{Acquirer, EmbeddedResources, Locator, StagedPackage, EMBEDDED_PREFIX};
pub use archive::{ArchiveExtractor, ArchiveType};
pub use expand::expand;
pub use render::{RenderError, TemplateRenderer, VelocityRenderer};
pub use materialize::{MaterializeSummary, TreeMaterializer, DEFAULT_TEMPLATE_SUFFIX};
pub use generator::{Generator, GeneratorBuilder};
