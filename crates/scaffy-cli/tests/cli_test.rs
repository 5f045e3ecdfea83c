/// End-to-end tests for the scaffy binary
///
/// Each test runs the compiled binary in its own temporary working directory
/// with HOME pointed away from the real user configuration.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn scaffy(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scaffy"))
        .args(args)
        .current_dir(cwd)
        .env("HOME", cwd)
        .env("XDG_CONFIG_HOME", cwd.join(".config"))
        .env_remove("SCAFFY_TEMPLATE_SUFFIX")
        .env_remove("SCAFFY_STRICT")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run scaffy")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn write_tar(path: &Path, files: &[(&str, &str)]) {
    let mut builder = tar::Builder::new(fs::File::create(path).unwrap());
    for (name, body) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, body.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

#[test]
fn test_list_templates() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["list"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("osgi-empty"));
    assert!(out.contains("rust-bin"));
}

#[test]
fn test_new_osgi_project() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["new", "osgi-empty", "work", "-DartifactId=search"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let project = temp.path().join("work/search");
    let pom = fs::read_to_string(project.join("pom.xml")).unwrap();
    assert!(pom.contains("<groupId>org.sakaiproject</groupId>"));
    assert!(pom.contains("<version>1.3.0</version>"));
    assert!(pom.contains("<Bundle-Version>${project.version}</Bundle-Version>"));
    assert!(pom.contains("org.sakaiproject.nakamura.search.*"));

    let readme = fs::read_to_string(project.join("README")).unwrap();
    assert!(readme.starts_with("search\n======\n"));

    assert!(project
        .join("src/main/java/org/sakaiproject/nakamura/search/Activator.java")
        .is_file());
    let metatype = project.join("src/main/resources/OSGI-INF/metatype/metatype.properties");
    assert_eq!(
        fs::read_to_string(metatype).unwrap(),
        "# Labels for ${artifactId} configuration\n"
    );
}

#[test]
fn test_new_rust_project_without_description() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["new", "rust-bin", ".", "-DartifactId=hello"]);
    assert!(output.status.success(), "{}", stderr(&output));

    let manifest = fs::read_to_string(temp.path().join("hello/Cargo.toml")).unwrap();
    assert!(manifest
        .starts_with("[package]\nname = \"hello\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n"));
    assert!(!manifest.contains("description"));

    let main = fs::read_to_string(temp.path().join("hello/src/main.rs")).unwrap();
    assert!(main.contains("#[derive(Parser, Debug)]"));
    assert!(main.contains("Hello from hello!"));
}

#[test]
fn test_new_missing_required_property() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["new", "osgi-empty", "work"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Missing property: -DartifactId (Required)"));
    assert!(!temp.path().join("work").exists());
}

#[test]
fn test_new_unknown_template() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["new", "nope"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unknown template \"nope\""));
}

#[test]
fn test_help_properties() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["new", "osgi-empty", "--help-properties"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("-DartifactId (Required)"));
    assert!(out.contains("-DnakamuraVersion = <parent nakamura version> (Default: 1.3.0)"));
}

#[test]
fn test_generate_from_file_url_with_config_defaults() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pkg.tar");
    write_tar(
        &archive,
        &[
            ("${name}/greeting.txt.tpl", "Hello ${who} from ${name}\n"),
            ("${name}/raw.txt", "${who}\n"),
        ],
    );
    fs::write(
        temp.path().join("scaffy.toml"),
        "[template]\nsuffix = \".tpl\"\n\n[defaults]\nwho = \"config\"\n",
    )
    .unwrap();

    let locator = format!("file://{}", archive.display());
    let output = scaffy(temp.path(), &["generate", &locator, "out", "-Dname=demo"]);
    assert!(output.status.success(), "{}", stderr(&output));

    assert_eq!(
        fs::read_to_string(temp.path().join("out/demo/greeting.txt")).unwrap(),
        "Hello config from demo\n"
    );
    assert_eq!(fs::read_to_string(temp.path().join("out/demo/raw.txt")).unwrap(), "${who}\n");
}

#[test]
fn test_generate_refuses_to_overwrite() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("pkg.tar");
    write_tar(&archive, &[("file.txt", "new\n")]);
    fs::create_dir(temp.path().join("out")).unwrap();
    fs::write(temp.path().join("out/file.txt"), "old\n").unwrap();

    let locator = format!("file://{}", archive.display());
    let output = scaffy(temp.path(), &["generate", &locator, "out"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("already exists. Not overwriting."));
    assert_eq!(fs::read_to_string(temp.path().join("out/file.txt")).unwrap(), "old\n");
}

#[test]
fn test_generate_unsupported_scheme() {
    let temp = TempDir::new().unwrap();
    let output = scaffy(temp.path(), &["generate", "ftp://example.com/pkg.tar", "out"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Unsupported locator scheme"));
}
