//! Templates bundled into the binary.

use scaffy_core::EmbeddedResources;

/// How a property gets its value when it is not given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyDefault {
    Required,
    Value(&'static str),
    /// Copied from another property of the same template
    SameAs(&'static str),
}

/// A property a template reads from its context
#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub key: &'static str,
    pub description: Option<&'static str>,
    pub default: PropertyDefault,
}

impl PropertySpec {
    /// One line of property help, e.g. `-DartifactId = <crate name> (Required)`
    pub fn help_line(&self) -> String {
        let mut line = format!("-D{} ", self.key);
        if let Some(description) = self.description {
            line.push_str(&format!("= <{}> ", description));
        }
        match self.default {
            PropertyDefault::Required => line.push_str("(Required)"),
            PropertyDefault::Value(value) => line.push_str(&format!("(Default: {})", value)),
            PropertyDefault::SameAs(key) => line.push_str(&format!("(Default: the {})", key)),
        }
        line
    }
}

#[derive(Debug)]
pub struct TemplateSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub locator: &'static str,
    pub properties: &'static [PropertySpec],
}

pub static EMBEDDED: EmbeddedResources = &[
    ("osgi-empty.tar", include_bytes!("../templates/osgi-empty.tar")),
    ("rust-bin.tar", include_bytes!("../templates/rust-bin.tar")),
];

pub static TEMPLATES: &[TemplateSpec] = &[
    TemplateSpec {
        name: "osgi-empty",
        description: "Create a bare-bones OSGi bundle scaffold for Nakamura.",
        locator: "embedded:/osgi-empty.tar",
        properties: &[
            PropertySpec {
                key: "groupId",
                description: None,
                default: PropertyDefault::Value("org.sakaiproject"),
            },
            PropertySpec {
                key: "artifactId",
                description: None,
                default: PropertyDefault::Required,
            },
            PropertySpec {
                key: "version",
                description: None,
                default: PropertyDefault::Value("0.1-SNAPSHOT"),
            },
            PropertySpec {
                key: "nakamuraVersion",
                description: Some("parent nakamura version"),
                default: PropertyDefault::Value("1.3.0"),
            },
            PropertySpec {
                key: "packageAlias",
                description: Some("class package (e.g., myapp)"),
                default: PropertyDefault::SameAs("artifactId"),
            },
        ],
    },
    TemplateSpec {
        name: "rust-bin",
        description: "Create a command-line Rust crate.",
        locator: "embedded:/rust-bin.tar",
        properties: &[
            PropertySpec {
                key: "artifactId",
                description: Some("crate name"),
                default: PropertyDefault::Required,
            },
            PropertySpec {
                key: "version",
                description: None,
                default: PropertyDefault::Value("0.1.0"),
            },
            PropertySpec {
                key: "edition",
                description: Some("Rust edition"),
                default: PropertyDefault::Value("2021"),
            },
            PropertySpec {
                key: "description",
                description: Some("one-line crate description"),
                default: PropertyDefault::Value(""),
            },
        ],
    },
];

pub fn find(name: &str) -> Option<&'static TemplateSpec> {
    TEMPLATES.iter().find(|template| template.name == name)
}

/// Bundled templates sorted by name
pub fn sorted() -> Vec<&'static TemplateSpec> {
    let mut templates: Vec<_> = TEMPLATES.iter().collect();
    templates.sort_by_key(|template| template.name);
    templates
}
