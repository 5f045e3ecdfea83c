//! Template rendering for marked files.
//!
//! The default [`VelocityRenderer`] understands the subset of the Velocity
//! Template Language that scaffolding templates use:
//!
//! - References: `$name`, `${name}`, quiet `$!name`, property chains
//!   `$project.name`, and method calls `$name.toUpperCase()`
//! - Directives: `#set`, `#if` / `#elseif` / `#else` / `#end`, `#foreach`
//! - Comments: `## line` and `#* block *#`; unparsed blocks `#[[ ... ]]#`
//! - Escapes: `\$name` and `\#if` render literally
//!
//! Undefined references are written out exactly as they appear in the
//! template (so `${project.version}` in a build file survives untouched)
//! unless strict mode is enabled.

mod eval;
mod parser;

use std::io::{Read, Write};
use std::string::FromUtf8Error;

use thiserror::Error;

use crate::context::Context;
use eval::Evaluator;

/// Error type for template rendering
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Cannot invoke {method}() on a {receiver} at line {line}")]
    Method {
        method: String,
        receiver: String,
        line: usize,
    },
    #[error("Type error at line {line}: {message}")]
    Type { message: String, line: usize },
    #[error("Undefined reference {reference} at line {line}")]
    Undefined { reference: String, line: usize },
    #[error("Template is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders a template body against a context
pub trait TemplateRenderer {
    fn render(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        context: &Context,
    ) -> Result<(), RenderError>;
}

/// Velocity-style template renderer
#[derive(Debug, Clone, Default)]
pub struct VelocityRenderer {
    strict: bool,
}

impl VelocityRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on undefined references instead of writing them out verbatim
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Render a template held in memory
    pub fn render_str(&self, template: &str, context: &Context) -> Result<String, RenderError> {
        let nodes = parser::parse(template)?;
        let mut out = String::with_capacity(template.len());
        Evaluator::new(context, self.strict).render_nodes(&nodes, &mut out)?;
        Ok(out)
    }
}

impl TemplateRenderer for VelocityRenderer {
    fn render(
        &self,
        input: &mut dyn Read,
        output: &mut dyn Write,
        context: &Context,
    ) -> Result<(), RenderError> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        let template = String::from_utf8(bytes)?;

        let rendered = self.render_str(&template, context)?;
        output.write_all(rendered.as_bytes())?;
        output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(template: &str, context: &Context) -> String {
        VelocityRenderer::new().render_str(template, context).unwrap()
    }

    #[test]
    fn test_interpolation() {
        let ctx = Context::new().with("name", "World");
        assert_eq!(render("Hello ${name}", &ctx), "Hello World");
        assert_eq!(render("Hello $name!", &ctx), "Hello World!");
    }

    #[test]
    fn test_undefined_reference_is_verbatim() {
        let ctx = Context::new();
        assert_eq!(
            render("<version>${project.version}</version>", &ctx),
            "<version>${project.version}</version>"
        );
        assert_eq!(render("[$!missing]", &ctx), "[]");
    }

    #[test]
    fn test_strict_mode_rejects_undefined() {
        let renderer = VelocityRenderer::new().strict(true);
        let err = renderer.render_str("x ${missing}", &Context::new()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Undefined { ref reference, line: 1 } if reference == "${missing}"
        ));
        assert_eq!(renderer.render_str("[$!missing]", &Context::new()).unwrap(), "[]");
    }

    #[test]
    fn test_property_access() {
        let ctx = Context::new().with(
            "project",
            json!({"group": "org.example", "meta": {"tag": "v1"}}),
        );
        assert_eq!(render("$project.group/${project.meta.tag}", &ctx), "org.example/v1");
        assert_eq!(render("$project.missing", &ctx), "$project.missing");
    }

    #[test]
    fn test_string_methods() {
        let ctx = Context::new().with("artifactId", "my-app");
        assert_eq!(render("$artifactId.toUpperCase()", &ctx), "MY-APP");
        assert_eq!(render("${artifactId.replace('-', '')}", &ctx), "myapp");
        assert_eq!(render("$artifactId.substring(3)", &ctx), "app");
        assert_eq!(render("$artifactId.length()", &ctx), "6");
    }

    #[test]
    fn test_unsupported_method_fails() {
        let ctx = Context::new().with("port", 8080);
        let err = VelocityRenderer::new().render_str("$port.toUpperCase()", &ctx).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Method { ref method, ref receiver, .. }
                if method == "toUpperCase" && receiver == "number"
        ));
    }

    #[test]
    fn test_bad_method_arguments_fail() {
        let ctx = Context::new().with("name", "abc");
        let err = VelocityRenderer::new().render_str("$name.substring(5)", &ctx).unwrap_err();
        assert!(matches!(err, RenderError::Type { .. }));
    }

    #[test]
    fn test_if_elseif_else() {
        let template = "#if($kind == 'lib')L#elseif($kind == 'bin')B#{else}O#end";
        assert_eq!(render(template, &Context::new().with("kind", "lib")), "L");
        assert_eq!(render(template, &Context::new().with("kind", "bin")), "B");
        assert_eq!(render(template, &Context::new().with("kind", "x")), "O");
    }

    #[test]
    fn test_truthiness() {
        let template = "#if($flag)yes#{else}no#end";
        assert_eq!(render(template, &Context::new().with("flag", true)), "yes");
        assert_eq!(render(template, &Context::new().with("flag", false)), "no");
        assert_eq!(render(template, &Context::new()), "no");
        assert_eq!(render(template, &Context::new().with("flag", "")), "yes");
    }

    #[test]
    fn test_foreach_with_loop_state() {
        let ctx = Context::new().with("modules", json!(["core", "cli"]));
        let template = "#foreach($m in $modules)$foreach.count:$m#if($foreach.hasNext), #end#end";
        assert_eq!(render(template, &ctx), "1:core, 2:cli");
    }

    #[test]
    fn test_foreach_range_and_scope() {
        let ctx = Context::new().with("i", "outer");
        assert_eq!(render("#foreach($i in [1..3])$i#end $i", &ctx), "123 outer");
        assert_eq!(render("#foreach($i in [3..1])$i#end", &ctx), "321");
    }

    #[test]
    fn test_oversized_range_fails() {
        let err = VelocityRenderer::new()
            .render_str("#foreach($i in [0..9999999999])$i#end", &Context::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Type { line: 1, .. }));
        assert_eq!(render("#set($r = [1..1000])$r.size()", &Context::new()), "1000");
    }

    #[test]
    fn test_foreach_over_non_list_fails() {
        let ctx = Context::new().with("name", "abc");
        let err = VelocityRenderer::new()
            .render_str("#foreach($c in $name)$c#end", &ctx)
            .unwrap_err();
        assert!(matches!(err, RenderError::Type { .. }));
    }

    #[test]
    fn test_set_and_arithmetic() {
        let ctx = Context::new().with("base", 8000);
        assert_eq!(render("#set($port = $base + 80)$port", &ctx), "8080");
        assert_eq!(render("#set($label = \"port-$base\")$label", &ctx), "port-8000");
        assert_eq!(render("#set($s = 'a' + 1)$s", &ctx), "a1");
    }

    #[test]
    fn test_arithmetic_type_error() {
        let err = VelocityRenderer::new()
            .render_str("#set($x = true * 2)", &Context::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Type { line: 1, .. }));
    }

    #[test]
    fn test_directive_lines_are_gobbled() {
        let ctx = Context::new().with("web", true);
        let template = "<deps>\n  #if($web)\n  <dep>web</dep>\n  #end\n</deps>\n";
        assert_eq!(render(template, &ctx), "<deps>\n  <dep>web</dep>\n</deps>\n");
    }

    #[test]
    fn test_comments_and_escapes() {
        let ctx = Context::new().with("name", "x");
        assert_eq!(render("a## note\nb", &ctx), "ab");
        assert_eq!(render("a#* hidden *#b", &ctx), "ab");
        assert_eq!(render("\\$name is $name", &ctx), "$name is x");
        assert_eq!(render("#[[ $name #if ]]#", &ctx), " $name #if ");
    }

    #[test]
    fn test_backslash_kept_unless_escaping() {
        let ctx = Context::new().with("name", "x");
        assert_eq!(render("price \\$5", &ctx), "price \\$5");
        assert_eq!(render("C:\\#dir", &ctx), "C:\\#dir");
        assert_eq!(render("echo \"\\$HOME\"", &ctx), "echo \"\\$HOME\"");
        assert_eq!(render("a\\$undefined", &ctx), "a\\$undefined");
        assert_eq!(render("a\\\\$undefined", &ctx), "a\\\\$undefined");
        assert_eq!(render("\\${name} and \\$!name", &ctx), "${name} and $!name");
    }

    #[test]
    fn test_backslash_pairs_collapse_before_resolved_reference() {
        let ctx = Context::new().with("name", "x");
        assert_eq!(render("\\\\$name", &ctx), "\\x");
        assert_eq!(render("\\\\\\$name", &ctx), "\\$name");
    }

    #[test]
    fn test_escaped_directives() {
        let ctx = Context::new().with("a", true);
        assert_eq!(render("\\#if($a)", &ctx), "#if(true)");
        assert_eq!(render("\\\\#if($a)y#end", &ctx), "\\y");
        assert_eq!(render("\\#{end}", &ctx), "#{end}");
    }

    #[test]
    fn test_escaped_undefined_reference_in_strict_mode() {
        let renderer = VelocityRenderer::new().strict(true);
        assert_eq!(
            renderer.render_str("\\$missing", &Context::new()).unwrap(),
            "\\$missing"
        );
    }

    #[test]
    fn test_parse_error_surfaces() {
        let err = VelocityRenderer::new()
            .render_str("#if($a\nbody#end", &Context::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Parse { .. }));
    }

    #[test]
    fn test_render_streams() {
        let ctx = Context::new().with("name", "World");
        let mut input: &[u8] = b"Hello ${name}";
        let mut output = Vec::new();
        VelocityRenderer::new().render(&mut input, &mut output, &ctx).unwrap();
        assert_eq!(output, b"Hello World");
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let mut input: &[u8] = &[0xff, 0xfe, 0x00];
        let mut output = Vec::new();
        let err = VelocityRenderer::new()
            .render(&mut input, &mut output, &Context::new())
            .unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }
}
