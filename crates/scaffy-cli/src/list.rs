//! List command - show the bundled templates.

use anyhow::Result;
use console::style;

use crate::registry;

pub fn execute() -> Result<i32> {
    let templates = registry::sorted();
    let width = templates.iter().map(|t| t.name.len()).max().unwrap_or(0);

    println!("{}", style("Available templates:").cyan().bold());
    for template in templates {
        println!(
            "  {}  {}",
            style(format!("{:width$}", template.name, width = width)).green(),
            template.description
        );
    }

    Ok(0)
}
