//! Generate command - create a project from any template package locator.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use scaffy_core::Generator;
use std::path::PathBuf;

use crate::config::ScaffyConfig;
use crate::properties;
use crate::registry;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Package locator (https://, file:// or embedded:NAME)
    #[arg(value_name = "LOCATOR")]
    pub locator: String,

    /// Directory where the project should be created
    #[arg(value_name = "DIRECTORY", default_value = ".")]
    pub directory: String,

    /// Set a context property (can be used multiple times)
    #[arg(short = 'D', value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub define: Vec<String>,

    /// Expected md5, sha1 or sha256 hex digest of the package
    #[arg(long)]
    pub checksum: Option<String>,

    /// Filename suffix marking files to render
    #[arg(long)]
    pub suffix: Option<String>,

    /// Drop leading path components from archive entries
    #[arg(long, default_value = "0")]
    pub strip_components: usize,

    /// Fail on undefined template references
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: GenerateArgs, config: &ScaffyConfig) -> Result<i32> {
    let defines = properties::parse_defines(&args.define)?;
    let context = properties::passthrough_context(&config.defaults, &defines);
    let target_dir = PathBuf::from(shellexpand::tilde(&args.directory).as_ref());
    let suffix = args.suffix.as_deref().unwrap_or(config.template_suffix());

    println!(
        "{} Generating from {} in {}",
        style("Info:").cyan(),
        style(&args.locator).white().bold(),
        target_dir.display()
    );

    let generator = Generator::builder()
        .embedded(registry::EMBEDDED)
        .template_suffix(suffix)
        .strict(args.strict || config.strict())
        .checksum(args.checksum)
        .strip_components(args.strip_components)
        .build();

    let summary = generator
        .run(&args.locator, &target_dir, &context)
        .with_context(|| format!("Could not generate project from {}", args.locator))?;

    println!(
        "{} Created {} files in {}",
        style("Success:").green().bold(),
        summary.files,
        style(target_dir.display()).cyan()
    );

    Ok(0)
}
