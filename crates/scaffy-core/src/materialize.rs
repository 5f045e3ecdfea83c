//! Tree materialization: walk an extracted template tree and write the
//! rendered/copied result into a destination directory.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::context::Context;
use crate::expand;
use crate::render::{TemplateRenderer, VelocityRenderer};
use crate::{Result, ScaffoldError};

/// File name suffix marking a file for template rendering
pub const DEFAULT_TEMPLATE_SUFFIX: &str = ".vtlg";

/// Counts of destination nodes created by one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub directories: usize,
    pub files: usize,
    /// Files that went through the template renderer (included in `files`)
    pub rendered: usize,
}

/// Materializes a source tree into a destination tree
#[derive(Debug, Clone)]
pub struct TreeMaterializer<R = VelocityRenderer> {
    renderer: R,
    template_suffix: String,
}

impl TreeMaterializer<VelocityRenderer> {
    pub fn new() -> Self {
        Self::with_renderer(VelocityRenderer::new())
    }
}

impl Default for TreeMaterializer<VelocityRenderer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TemplateRenderer> TreeMaterializer<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self {
            renderer,
            template_suffix: DEFAULT_TEMPLATE_SUFFIX.to_string(),
        }
    }

    /// Use a different template marker suffix
    pub fn template_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.template_suffix = suffix.into();
        self
    }

    /// Materialize `source_root` into `dest_root`.
    ///
    /// Children are visited depth first, directories before their contents,
    /// siblings in file name order. Symbolic links are skipped. The first
    /// existing target path aborts the run; anything written before it stays
    /// on disk.
    pub fn materialize(
        &self,
        source_root: &Path,
        dest_root: &Path,
        context: &Context,
    ) -> Result<MaterializeSummary> {
        log::debug!(
            "Materializing {} into {} with {} context values",
            source_root.display(),
            dest_root.display(),
            context.len()
        );
        prepare_and_validate(source_root, dest_root)?;

        // Source directory -> already created target directory
        let mut targets: HashMap<PathBuf, PathBuf> = HashMap::new();
        targets.insert(source_root.to_path_buf(), dest_root.to_path_buf());
        let mut summary = MaterializeSummary::default();

        let walker = WalkDir::new(source_root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let source = entry.path();
            if entry.file_type().is_symlink() {
                log::warn!("Skipping symbolic link {}", source.display());
                continue;
            }
            let target_parent = source
                .parent()
                .and_then(|parent| targets.get(parent))
                .cloned()
                .ok_or_else(|| {
                    let message = format!("No target directory for {}", source.display());
                    ScaffoldError::Precondition(message)
                })?;

            let is_dir = entry.file_type().is_dir();
            let (name, render) = self.target_name(source, entry.file_name(), is_dir, context)?;
            let target = target_parent.join(&name);
            log::debug!("Processing {} to {}", source.display(), target.display());

            if fs::symlink_metadata(&target).is_ok() {
                return Err(ScaffoldError::Conflict { path: target });
            }

            if is_dir {
                fs::create_dir(&target).map_err(|e| conflict_or_io(e, &target))?;
                targets.insert(source.to_path_buf(), target.clone());
                summary.directories += 1;
            } else if render {
                log::debug!("File needs to be processed.");
                self.render_file(source, &target, context)?;
                summary.files += 1;
                summary.rendered += 1;
            } else {
                log::debug!("Does not need processing. Will just copy.");
                copy_file(source, &target)?;
                summary.files += 1;
            }

            log::info!("Extracted file: {}", target.display());
        }

        Ok(summary)
    }

    /// Destination name for a source entry and whether its body is rendered
    fn target_name(
        &self,
        source: &Path,
        file_name: &std::ffi::OsStr,
        is_dir: bool,
        context: &Context,
    ) -> Result<(OsString, bool)> {
        // Names that are not UTF-8 cannot carry placeholders or the marker
        let Some(name) = file_name.to_str() else {
            return Ok((file_name.to_os_string(), false));
        };

        let (expanded, marked) = expand::target_name(name, &self.template_suffix, context);

        if expanded.is_empty()
            || expanded == "."
            || expanded == ".."
            || expanded.chars().any(std::path::is_separator)
        {
            return Err(ScaffoldError::InvalidTargetName {
                source_path: source.to_path_buf(),
                name: expanded,
            });
        }

        Ok((OsString::from(expanded), marked && !is_dir))
    }

    fn render_file(&self, source: &Path, target: &Path, context: &Context) -> Result<()> {
        let mut reader = BufReader::new(File::open(source)?);
        let file = create_new(target)?;
        let mut writer = BufWriter::new(file);

        self.renderer
            .render(&mut reader, &mut writer, context)
            .map_err(|e| ScaffoldError::Render {
                path: source.to_path_buf(),
                source: e,
            })?;
        writer.flush()?;

        copy_permissions(source, target)
    }
}

fn create_new(target: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| conflict_or_io(e, target))
}

fn conflict_or_io(error: io::Error, target: &Path) -> ScaffoldError {
    if error.kind() == io::ErrorKind::AlreadyExists {
        ScaffoldError::Conflict {
            path: target.to_path_buf(),
        }
    } else {
        ScaffoldError::Io(error)
    }
}

/// Copy the file body byte for byte
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = create_new(target)?;
    io::copy(&mut reader, &mut writer)?;
    copy_permissions(source, target)
}

fn copy_permissions(source: &Path, target: &Path) -> Result<()> {
    let permissions = fs::metadata(source)?.permissions();
    fs::set_permissions(target, permissions)?;
    Ok(())
}

/// Ensure the state of the source and target roots before anything is written
fn prepare_and_validate(source_root: &Path, dest_root: &Path) -> Result<()> {
    if !source_root.is_dir() {
        return Err(ScaffoldError::Precondition(format!(
            "Package root {} must be an existing directory.",
            source_root.display()
        )));
    }

    if dest_root.exists() && !dest_root.is_dir() {
        return Err(ScaffoldError::Precondition(format!(
            "Target directory {} must be a directory.",
            dest_root.display()
        )));
    }

    if resolve_lenient(dest_root)?.starts_with(source_root.canonicalize()?) {
        return Err(ScaffoldError::Precondition(format!(
            "Target directory {} may not be inside the package root {}",
            dest_root.display(),
            source_root.display()
        )));
    }

    if !dest_root.exists() {
        fs::create_dir_all(dest_root)?;
    }

    Ok(())
}

/// Canonicalize the longest existing ancestor of `path` and re-append the rest
fn resolve_lenient(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut resolved = if existing.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        existing.canonicalize()?
    };
    for name in rest.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use std::io::Read;
    use tempfile::TempDir;

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    /// Upper-cases the body; stands in for a real template engine
    struct ShoutRenderer;

    impl TemplateRenderer for ShoutRenderer {
        fn render(
            &self,
            input: &mut dyn Read,
            output: &mut dyn Write,
            _context: &Context,
        ) -> std::result::Result<(), RenderError> {
            let mut body = String::new();
            input.read_to_string(&mut body)?;
            output.write_all(body.to_uppercase().as_bytes())?;
            Ok(())
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("proj/${artifactId}/README.vtlg"), "Hello ${name}");
        write(&src.join("proj/LICENSE"), "Apache-2.0\n\u{0}binary");
        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();

        let ctx = Context::new().with("artifactId", "demo").with("name", "World");
        let summary = TreeMaterializer::new().materialize(&src, &out, &ctx).unwrap();

        assert_eq!(fs::read_to_string(out.join("proj/demo/README")).unwrap(), "Hello World");
        assert_eq!(
            fs::read(out.join("proj/LICENSE")).unwrap(),
            fs::read(src.join("proj/LICENSE")).unwrap()
        );
        assert!(!out.join("proj/demo/README.vtlg").exists());
        assert_eq!(summary, MaterializeSummary { directories: 2, files: 2, rendered: 1 });
    }

    #[test]
    fn test_structural_fidelity() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("a/b/c/one.txt"), "1");
        write(&src.join("a/two.txt"), "2");
        write(&src.join("three.txt.vtlg"), "3");
        fs::create_dir_all(src.join("empty/nested")).unwrap();
        let out = temp.path().join("out");

        let summary = TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap();

        assert_eq!(summary.directories, 5);
        assert_eq!(summary.files, 3);
        assert!(out.join("a/b/c/one.txt").is_file());
        assert!(out.join("a/two.txt").is_file());
        assert!(out.join("three.txt").is_file());
        assert!(out.join("empty/nested").is_dir());
    }

    #[test]
    fn test_no_clobber_aborts_run() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("a.txt"), "new a");
        write(&src.join("b.txt"), "new b");
        write(&src.join("c.txt"), "new c");
        let out = temp.path().join("out");
        write(&out.join("b.txt"), "original");

        let err = TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap_err();

        match err {
            ScaffoldError::Conflict { path } => assert_eq!(path, out.join("b.txt")),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "new a");
        assert_eq!(fs::read_to_string(out.join("b.txt")).unwrap(), "original");
        assert!(!out.join("c.txt").exists());
    }

    #[test]
    fn test_conflict_on_expanded_directory_name() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("${artifactId}/pom.xml"), "<project/>");
        let out = temp.path().join("out");
        fs::create_dir_all(out.join("demo")).unwrap();

        let ctx = Context::new().with("artifactId", "demo");
        let err = TreeMaterializer::new().materialize(&src, &out, &ctx).unwrap_err();

        assert!(matches!(err, ScaffoldError::Conflict { .. }));
        assert!(!out.join("demo/pom.xml").exists());
    }

    #[test]
    fn test_expanded_names_nest_children() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("src/main/java/${package}/${className}.java.vtlg"), "class $className {}");
        let out = temp.path().join("out");

        let ctx = Context::new().with("package", "demo").with("className", "App");
        TreeMaterializer::new().materialize(&src, &out, &ctx).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("src/main/java/demo/App.java")).unwrap(),
            "class App {}"
        );
    }

    #[test]
    fn test_unresolved_names_pass_through() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("${missing}.txt"), "x");
        let out = temp.path().join("out");

        TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap();

        assert!(out.join("${missing}.txt").is_file());
    }

    #[test]
    fn test_marked_directory_is_not_rendered() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("docs.vtlg/index.md"), "$name");
        let out = temp.path().join("out");

        let ctx = Context::new().with("name", "ignored");
        let summary = TreeMaterializer::new().materialize(&src, &out, &ctx).unwrap();

        assert_eq!(fs::read_to_string(out.join("docs/index.md")).unwrap(), "$name");
        assert_eq!(summary.rendered, 0);
    }

    #[test]
    fn test_custom_renderer_and_suffix() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("notes.tpl"), "quiet");
        write(&src.join("plain.vtlg"), "untouched");
        let out = temp.path().join("out");

        TreeMaterializer::with_renderer(ShoutRenderer)
            .template_suffix(".tpl")
            .materialize(&src, &out, &Context::new())
            .unwrap();

        assert_eq!(fs::read_to_string(out.join("notes")).unwrap(), "QUIET");
        assert_eq!(fs::read_to_string(out.join("plain.vtlg")).unwrap(), "untouched");
    }

    #[test]
    fn test_render_failure_names_source() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("bad.vtlg"), "#if($x)never closed");
        let out = temp.path().join("out");

        let err = TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap_err();

        match err {
            ScaffoldError::Render { path, source } => {
                assert_eq!(path, src.join("bad.vtlg"));
                assert!(matches!(source, RenderError::Parse { .. }));
            }
            other => panic!("expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_separator_in_expanded_name_is_rejected() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("${path}.txt"), "x");
        let out = temp.path().join("out");

        let ctx = Context::new().with("path", "../escape");
        let err = TreeMaterializer::new().materialize(&src, &out, &ctx).unwrap_err();

        assert!(matches!(
            err,
            ScaffoldError::InvalidTargetName { ref name, .. } if name == "../escape.txt"
        ));
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn test_missing_source_root() {
        let temp = TempDir::new().unwrap();
        let err = TreeMaterializer::new()
            .materialize(&temp.path().join("nope"), &temp.path().join("out"), &Context::new())
            .unwrap_err();
        assert!(matches!(err, ScaffoldError::Precondition(_)));
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn test_destination_is_a_file() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("a.txt"), "a");
        let out = temp.path().join("out");
        fs::write(&out, "occupied").unwrap();

        let err = TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap_err();
        assert!(matches!(err, ScaffoldError::Precondition(_)));
    }

    #[test]
    fn test_destination_created_with_ancestors() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("a.txt"), "a");
        let out = temp.path().join("deep/er/out");

        TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap();
        assert!(out.join("a.txt").is_file());
    }

    #[test]
    fn test_destination_inside_source_is_rejected() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("a.txt"), "a");

        let err = TreeMaterializer::new()
            .materialize(&src, &src.join("out"), &Context::new())
            .unwrap_err();
        assert!(matches!(err, ScaffoldError::Precondition(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("kept.txt"), "kept");
        write(&temp.path().join("secret/key"), "private");
        std::os::unix::fs::symlink("../secret", src.join("escape")).unwrap();
        std::os::unix::fs::symlink("../secret/key", src.join("key-link")).unwrap();
        let out = temp.path().join("out");

        let summary = TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap();

        assert_eq!(fs::read_to_string(out.join("kept.txt")).unwrap(), "kept");
        assert!(fs::symlink_metadata(out.join("escape")).is_err());
        assert!(fs::symlink_metadata(out.join("key-link")).is_err());
        assert_eq!(summary.files, 1);
        assert_eq!(summary.directories, 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_are_preserved() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        write(&src.join("mvnw"), "#!/bin/sh\n");
        fs::set_permissions(src.join("mvnw"), fs::Permissions::from_mode(0o755)).unwrap();
        let out = temp.path().join("out");

        TreeMaterializer::new().materialize(&src, &out, &Context::new()).unwrap();

        let mode = fs::metadata(out.join("mvnw")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
