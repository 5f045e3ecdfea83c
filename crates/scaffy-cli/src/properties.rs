//! Building a template context from defaults, config and `-D` properties.

use anyhow::{bail, Result};
use indexmap::IndexMap;
use scaffy_core::Context;
use serde_json::Value;

use crate::registry::{PropertyDefault, TemplateSpec};

/// Split a `key=value` definition. A bare `key` means `key=true`.
pub fn parse_define(define: &str) -> Result<(String, String)> {
    let (key, value) = match define.split_once('=') {
        Some((key, value)) => (key.trim(), value),
        None => (define.trim(), "true"),
    };

    if key.is_empty() {
        bail!("Invalid property definition \"{}\": missing key", define);
    }

    Ok((key.to_string(), value.to_string()))
}

pub fn parse_defines(defines: &[String]) -> Result<Vec<(String, String)>> {
    defines.iter().map(|define| parse_define(define)).collect()
}

/// Key under which the destination directory is exposed to templates
pub const BASE_DIR_KEY: &str = "baseDir";

/// Context for a bundled template.
///
/// Later sources win: template defaults, then config defaults, then command
/// line properties. Only keys the template declares are kept, plus
/// `baseDir` holding the destination directory.
pub fn template_context(
    template: &TemplateSpec,
    base_dir: &str,
    config_defaults: &IndexMap<String, Value>,
    defines: &[(String, String)],
) -> Result<Context> {
    let declared = |key: &str| template.properties.iter().any(|p| p.key == key);
    let mut context = Context::new().with(BASE_DIR_KEY, base_dir);

    for property in template.properties {
        if let PropertyDefault::Value(value) = property.default {
            context.insert(property.key, value);
        }
    }

    for (key, value) in config_defaults {
        if declared(key) {
            context.insert(key.as_str(), value.clone());
        }
    }

    for (key, value) in defines {
        if declared(key) {
            context.insert(key.as_str(), value.as_str());
        } else {
            log::warn!("Ignoring property {} not used by template {}", key, template.name);
        }
    }

    for property in template.properties {
        if let PropertyDefault::SameAs(source) = property.default {
            if !context.contains_key(property.key) {
                if let Some(value) = context.get(source).cloned() {
                    context.insert(property.key, value);
                }
            }
        }
    }

    validate(template, &context)?;
    Ok(context)
}

/// Context for an arbitrary package: config defaults overlaid with every property
pub fn passthrough_context(
    config_defaults: &IndexMap<String, Value>,
    defines: &[(String, String)],
) -> Context {
    let mut context: Context = config_defaults
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();
    context.extend(defines.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    context
}

fn validate(template: &TemplateSpec, context: &Context) -> Result<()> {
    for property in template.properties {
        if property.default == PropertyDefault::Required && !context.contains_key(property.key) {
            bail!("Missing property: {}", property.help_line());
        }
    }
    Ok(())
}
