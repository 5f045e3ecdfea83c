//! Archive extraction (tar, tar.gz, tar.bz2, tar.xz, zip).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;

use crate::{Result, ScaffoldError};

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let path_str = path.to_string_lossy().to_lowercase();

        if path_str.ends_with(".zip") {
            Some(ArchiveType::Zip)
        } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
            Some(ArchiveType::TarGz)
        } else if path_str.ends_with(".tar.bz2") || path_str.ends_with(".tbz2") {
            Some(ArchiveType::TarBz2)
        } else if path_str.ends_with(".tar.xz") || path_str.ends_with(".txz") {
            Some(ArchiveType::TarXz)
        } else if path_str.ends_with(".tar") {
            Some(ArchiveType::Tar)
        } else {
            None
        }
    }

    /// Detect archive type from the leading magic bytes.
    ///
    /// Anything unrecognized is assumed to be a plain tar stream.
    pub fn from_magic(header: &[u8]) -> Self {
        if header.starts_with(&[0x1f, 0x8b]) {
            ArchiveType::TarGz
        } else if header.starts_with(b"BZh") {
            ArchiveType::TarBz2
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            ArchiveType::TarXz
        } else if header.starts_with(b"PK\x03\x04") || header.starts_with(b"PK\x05\x06") {
            ArchiveType::Zip
        } else {
            ArchiveType::Tar
        }
    }

    /// Sniff the archive type of a file on disk
    pub fn detect(path: &Path) -> Result<Self> {
        let mut header = [0u8; 6];
        let mut file = File::open(path)?;
        let mut filled = 0;
        while filled < header.len() {
            let n = file.read(&mut header[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(Self::from_magic(&header[..filled]))
    }
}

/// Archive extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor {
    strip_components: usize,
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop this many leading path components from every entry
    pub fn with_strip_components(strip_components: usize) -> Self {
        Self { strip_components }
    }

    /// Extract an archive to the specified directory, detecting its type
    /// from the extension or, failing that, from its content.
    pub fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let archive_type = match ArchiveType::from_path(archive_path) {
            Some(archive_type) => archive_type,
            None => ArchiveType::detect(archive_path)?,
        };

        self.extract_with_type(archive_path, dest_dir, archive_type)
    }

    /// Extract an archive with explicit type
    pub fn extract_with_type(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
        archive_type: ArchiveType,
    ) -> Result<()> {
        log::debug!(
            "Extracting {} ({:?}) into {}",
            archive_path.display(),
            archive_type,
            dest_dir.display()
        );

        std::fs::create_dir_all(dest_dir)?;

        match archive_type {
            ArchiveType::Zip => self.extract_zip(archive_path, dest_dir),
            ArchiveType::Tar => self.extract_tar(archive_path, dest_dir),
            ArchiveType::TarGz => self.extract_tar_gz(archive_path, dest_dir),
            ArchiveType::TarBz2 => self.extract_tar_bz2(archive_path, dest_dir),
            ArchiveType::TarXz => self.extract_tar_xz(archive_path, dest_dir),
        }
    }

    /// Extract a zip archive
    fn extract_zip(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let reader = BufReader::new(file);
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| ScaffoldError::Archive(format!("Failed to open zip: {}", e)))?;

        let dest_dir_canonical = canonical_dest(dest_dir)?;

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| ScaffoldError::Archive(format!("Failed to read zip entry: {}", e)))?;

            let name = file.name().to_string();
            let relative = match self.relative_path(Path::new(&name))? {
                Some(relative) => relative,
                None => continue,
            };
            let outpath = dest_dir.join(&relative);

            if file.is_dir() {
                std::fs::create_dir_all(&outpath)?;
                ensure_inside(&outpath, &dest_dir_canonical, &name)?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            ensure_inside(&outpath, &dest_dir_canonical, &name)?;

            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)
                .map_err(|e| ScaffoldError::Archive(format!("Failed to extract {}: {}", name, e)))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                }
            }
        }

        Ok(())
    }

    /// Extract a plain tar archive
    fn extract_tar(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        self.extract_tar_reader(BufReader::new(file), dest_dir)
    }

    /// Extract a gzipped tar archive
    fn extract_tar_gz(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let file = File::open(archive_path)?;
        let decoder = GzDecoder::new(BufReader::new(file));
        self.extract_tar_reader(decoder, dest_dir)
    }

    /// Extract a bzip2 tar archive
    fn extract_tar_bz2(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        use bzip2::read::BzDecoder;

        let file = File::open(archive_path)?;
        let decoder = BzDecoder::new(BufReader::new(file));
        self.extract_tar_reader(decoder, dest_dir)
    }

    /// Extract an xz tar archive
    fn extract_tar_xz(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        use xz2::read::XzDecoder;

        let file = File::open(archive_path)?;
        let decoder = XzDecoder::new(BufReader::new(file));
        self.extract_tar_reader(decoder, dest_dir)
    }

    /// Extract entries from a tar stream.
    ///
    /// Directories are created if missing, regular files are streamed through
    /// verbatim. Links and special files are skipped.
    pub fn extract_tar_reader<R: Read>(&self, reader: R, dest_dir: &Path) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        let dest_dir_canonical = canonical_dest(dest_dir)?;

        let entries = archive
            .entries()
            .map_err(|e| ScaffoldError::Archive(format!("Failed to read tar: {}", e)))?;

        for entry in entries {
            let mut entry = entry
                .map_err(|e| ScaffoldError::Archive(format!("Failed to read tar entry: {}", e)))?;

            let path = entry
                .path()
                .map_err(|e| ScaffoldError::Archive(format!("Invalid path in tar: {}", e)))?
                .into_owned();
            let name = path.to_string_lossy().to_string();

            let relative = match self.relative_path(&path)? {
                Some(relative) => relative,
                None => continue,
            };
            let outpath = dest_dir.join(&relative);
            let entry_type = entry.header().entry_type();

            if entry_type.is_dir() {
                if !outpath.exists() {
                    std::fs::create_dir_all(&outpath)?;
                }
                ensure_inside(&outpath, &dest_dir_canonical, &name)?;
            } else if entry_type.is_file() {
                if let Some(parent) = outpath.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                ensure_inside(&outpath, &dest_dir_canonical, &name)?;

                let expected = entry.size();
                let mut outfile = File::create(&outpath)?;
                let copied = std::io::copy(&mut entry, &mut outfile).map_err(|e| {
                    ScaffoldError::Archive(format!("Failed to extract {}: {}", name, e))
                })?;
                if copied != expected {
                    return Err(ScaffoldError::Archive(format!(
                        "Truncated entry {}: expected {} bytes, got {}",
                        name, expected, copied
                    )));
                }
            } else {
                log::warn!("Skipping unsupported archive entry {} ({:?})", name, entry_type);
            }
        }

        Ok(())
    }

    /// Validate an entry path and apply component stripping.
    ///
    /// Returns `None` for entries that vanish after stripping.
    fn relative_path(&self, path: &Path) -> Result<Option<PathBuf>> {
        let mut normal = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => normal.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(ScaffoldError::PathTraversal {
                        entry: path.to_string_lossy().to_string(),
                    });
                }
            }
        }

        if normal.len() <= self.strip_components {
            return Ok(None);
        }

        Ok(Some(normal[self.strip_components..].iter().collect()))
    }
}

fn canonical_dest(dest_dir: &Path) -> Result<PathBuf> {
    dest_dir
        .canonicalize()
        .map_err(|e| ScaffoldError::Archive(format!("Failed to canonicalize destination: {}", e)))
}

/// Verify the output path stays within the destination directory
fn ensure_inside(outpath: &Path, dest_dir_canonical: &Path, entry: &str) -> Result<()> {
    let canonical = match outpath.canonicalize() {
        Ok(path) => path,
        // New files: canonicalize the parent and append the file name
        Err(_) => match (outpath.parent(), outpath.file_name()) {
            (Some(parent), Some(file_name)) => parent.canonicalize()?.join(file_name),
            _ => outpath.to_path_buf(),
        },
    };

    if !canonical.starts_with(dest_dir_canonical) {
        return Err(ScaffoldError::PathTraversal {
            entry: entry.to_string(),
        });
    }
    Ok(())
}
