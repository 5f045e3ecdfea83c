//! Package acquisition: resolve a locator to a byte stream, stage it to a
//! temporary file and extract it into a temporary directory.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::{NamedTempFile, TempDir};
use url::Url;

use crate::archive::{ArchiveExtractor, ArchiveType};
use crate::checksum::{verify_checksum, ChecksumType};
use crate::{Result, ScaffoldError};

/// Locator prefix selecting a template archive bundled into the program
pub const EMBEDDED_PREFIX: &str = "embedded:";

/// Template archives compiled into the program, keyed by name
pub type EmbeddedResources = &'static [(&'static str, &'static [u8])];

/// Where a template package comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Embedded(String),
    Url(Url),
}

impl Locator {
    pub fn parse(locator: &str) -> Result<Self> {
        if let Some(name) = locator.strip_prefix(EMBEDDED_PREFIX) {
            return Ok(Locator::Embedded(name.trim_start_matches('/').to_string()));
        }

        Url::parse(locator)
            .map(Locator::Url)
            .map_err(|e| ScaffoldError::acquisition(locator, format!("invalid URL: {}", e)))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Embedded(name) => write!(f, "{}{}", EMBEDDED_PREFIX, name),
            Locator::Url(url) => write!(f, "{}", url),
        }
    }
}

/// An acquired package: the staged archive and its extracted tree.
///
/// Both temporaries are removed when this is dropped.
#[derive(Debug)]
pub struct StagedPackage {
    archive: NamedTempFile,
    root: TempDir,
}

impl StagedPackage {
    pub fn archive_path(&self) -> &Path {
        self.archive.path()
    }

    /// Directory holding the extracted template tree
    pub fn root(&self) -> &Path {
        self.root.path()
    }
}

/// Resolves locators and stages template packages
#[derive(Debug, Clone)]
pub struct Acquirer {
    embedded: EmbeddedResources,
    user_agent: String,
}

impl Default for Acquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl Acquirer {
    pub fn new() -> Self {
        Self {
            embedded: &[],
            user_agent: format!("scaffy/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Make bundled archives available under the `embedded:` prefix
    pub fn with_embedded(mut self, resources: EmbeddedResources) -> Self {
        self.embedded = resources;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Open the byte stream behind a locator
    pub fn open(&self, locator: &str) -> Result<Box<dyn Read>> {
        log::debug!("Opening {}", locator);

        match Locator::parse(locator)? {
            Locator::Embedded(name) => self
                .embedded
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, bytes)| Box::new(*bytes) as Box<dyn Read>)
                .ok_or(ScaffoldError::ResourceNotFound { name }),
            Locator::Url(url) => match url.scheme() {
                "http" | "https" => self.open_http(locator, url),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|_| ScaffoldError::acquisition(locator, "not a local file path"))?;
                    let file =
                        File::open(&path).map_err(|e| ScaffoldError::acquisition(locator, e))?;
                    Ok(Box::new(file))
                }
                scheme => Err(ScaffoldError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    locator: locator.to_string(),
                }),
            },
        }
    }

    fn open_http(&self, locator: &str, url: Url) -> Result<Box<dyn Read>> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(self.user_agent.as_str())
            .build()?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| ScaffoldError::acquisition(locator, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScaffoldError::acquisition(locator, format!("HTTP {}", status)));
        }

        Ok(Box::new(response))
    }

    /// Copy the locator's stream into a fresh temporary file
    pub fn stage(&self, locator: &str, expected_checksum: Option<&str>) -> Result<NamedTempFile> {
        let mut reader = self.open(locator)?;
        let mut staged = tempfile::Builder::new().prefix("scaffy-pkg").tempfile()?;

        let bytes = io::copy(&mut reader, &mut staged)
            .map_err(|e| ScaffoldError::acquisition(locator, e))?;
        staged.flush()?;
        log::debug!("Staged {} bytes from {} at {}", bytes, locator, staged.path().display());

        if let Some(expected) = expected_checksum {
            let checksum_type = ChecksumType::from_hex_length(expected.len()).ok_or_else(|| {
                let reason = format!("unsupported checksum length {}", expected.len());
                ScaffoldError::acquisition(locator, reason)
            })?;
            if !verify_checksum(staged.path(), expected, checksum_type)? {
                return Err(ScaffoldError::ChecksumMismatch {
                    locator: locator.to_string(),
                });
            }
        }

        Ok(staged)
    }

    /// Stage the package and extract it into a fresh temporary directory
    pub fn acquire(
        &self,
        locator: &str,
        expected_checksum: Option<&str>,
        extractor: &ArchiveExtractor,
    ) -> Result<StagedPackage> {
        let archive = self.stage(locator, expected_checksum)?;
        let root = tempfile::Builder::new().prefix("scaffy-dir").tempdir()?;

        let archive_type = ArchiveType::detect(archive.path())?;
        extractor.extract_with_type(archive.path(), root.path(), archive_type)?;

        Ok(StagedPackage { archive, root })
    }
}
