//! New command - create a project from a bundled template.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use console::style;
use scaffy_core::Generator;
use std::path::PathBuf;

use crate::config::ScaffyConfig;
use crate::properties;
use crate::registry::{self, TemplateSpec};

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Name of the bundled template (see `scaffy list`)
    #[arg(value_name = "TEMPLATE")]
    pub template: String,

    /// Directory where the project should be created
    #[arg(value_name = "DIRECTORY", default_value = ".")]
    pub directory: String,

    /// Set a template property (can be used multiple times)
    #[arg(short = 'D', value_name = "KEY=VALUE", action = clap::ArgAction::Append)]
    pub define: Vec<String>,

    /// Print the properties this template accepts
    #[arg(long)]
    pub help_properties: bool,

    /// Fail on undefined template references
    #[arg(long)]
    pub strict: bool,
}

pub fn execute(args: NewArgs, config: &ScaffyConfig) -> Result<i32> {
    let template = registry::find(&args.template).ok_or_else(|| {
        anyhow!(
            "Unknown template \"{}\". Run `scaffy list` to see the available templates.",
            args.template
        )
    })?;

    if args.help_properties {
        print_help(template);
        return Ok(0);
    }

    let target_dir = PathBuf::from(shellexpand::tilde(&args.directory).as_ref());
    let base_dir = target_dir.to_string_lossy();
    let defines = properties::parse_defines(&args.define)?;
    let context = properties::template_context(template, &base_dir, &config.defaults, &defines)?;

    println!(
        "{} Creating {} in {}",
        style("Info:").cyan(),
        style(template.name).white().bold(),
        target_dir.display()
    );

    let generator = Generator::builder()
        .embedded(registry::EMBEDDED)
        .template_suffix(config.template_suffix())
        .strict(args.strict || config.strict())
        .build();

    let summary = generator
        .run(template.locator, &target_dir, &context)
        .with_context(|| format!("Could not generate project from template {}", template.name))?;

    println!(
        "{} Created {} files in {}",
        style("Success:").green().bold(),
        summary.files,
        style(target_dir.display()).cyan()
    );

    Ok(0)
}

fn print_help(template: &TemplateSpec) {
    println!("{}", style(format!("{} - {}", template.name, template.description)).bold());
    if template.properties.is_empty() {
        println!("This template has no properties.");
        return;
    }
    println!("Available properties:");
    for property in template.properties {
        println!("\t{}", property.help_line());
    }
}
