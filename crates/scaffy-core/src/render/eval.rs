//! Template evaluation against a [`Context`].

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{json, Map, Value};

use super::parser::{BinaryOp, Expr, Node, Reference, Segment};
use super::RenderError;
use crate::context::{value_text, Context};

/// Largest list a `[a..b]` range may produce
const MAX_RANGE_LEN: u64 = 1_000_000;

pub(crate) struct Evaluator<'a> {
    context: &'a Context,
    locals: HashMap<String, Value>,
    strict: bool,
}

/// Why a method call failed
enum MethodError {
    Unsupported,
    InvalidArguments(String),
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        _ => true,
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ if std::mem::discriminant(left) == std::mem::discriminant(right) => left == right,
        _ => value_text(left) == value_text(right),
    }
}

impl<'a> Evaluator<'a> {
    pub fn new(context: &'a Context, strict: bool) -> Self {
        Self {
            context,
            locals: HashMap::new(),
            strict,
        }
    }

    pub fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Reference(reference) => self.render_reference(reference, out)?,
                Node::EscapedReference { backslashes, reference } => {
                    self.render_escaped(*backslashes, reference, out)?
                }
                Node::Set { name, value, line } => {
                    let value = self.eval(value, *line)?;
                    self.locals.insert(name.clone(), value);
                }
                Node::If { branches, otherwise, line } => {
                    let mut taken = false;
                    for (cond, body) in branches {
                        if truthy(&self.eval(cond, *line)?) {
                            self.render_nodes(body, out)?;
                            taken = true;
                            break;
                        }
                    }
                    if !taken {
                        if let Some(body) = otherwise {
                            self.render_nodes(body, out)?;
                        }
                    }
                }
                Node::Foreach { var, iterable, body, line } => {
                    self.render_foreach(var, iterable, body, *line, out)?;
                }
            }
        }
        Ok(())
    }

    fn render_reference(
        &mut self,
        reference: &Reference,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match self.resolve(reference)? {
            Some(value) => out.push_str(&value_text(&value).unwrap_or_default()),
            None if reference.quiet => {}
            None if self.strict => {
                return Err(RenderError::Undefined {
                    reference: reference.source.clone(),
                    line: reference.line,
                })
            }
            None => out.push_str(&reference.source),
        }
        Ok(())
    }

    /// `\$name` renders `$name` when it resolves and stays as written when
    /// it does not. Pairs of backslashes collapse only when it resolves.
    fn render_escaped(
        &mut self,
        backslashes: usize,
        reference: &Reference,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let defined = self.resolve(reference)?.is_some();
        let kept = if defined { backslashes / 2 } else { backslashes };
        out.extend(std::iter::repeat('\\').take(kept));
        if backslashes % 2 == 1 {
            out.push_str(&reference.source);
            Ok(())
        } else {
            self.render_reference(reference, out)
        }
    }

    fn render_foreach(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &[Node],
        line: usize,
        out: &mut String,
    ) -> Result<(), RenderError> {
        let items: Vec<Value> = match self.eval(iterable, line)? {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(RenderError::Type {
                    message: format!("cannot iterate over a {}", type_name(&other)),
                    line,
                })
            }
        };

        let saved_var = self.locals.remove(var);
        let saved_loop = self.locals.remove("foreach");
        let total = items.len();

        for (index, item) in items.into_iter().enumerate() {
            self.locals.insert(var.to_string(), item);
            self.locals.insert(
                "foreach".to_string(),
                json!({
                    "index": index,
                    "count": index + 1,
                    "hasNext": index + 1 < total,
                    "first": index == 0,
                    "last": index + 1 == total,
                }),
            );
            self.render_nodes(body, out)?;
        }

        self.restore(var, saved_var);
        self.restore("foreach", saved_loop);
        Ok(())
    }

    fn restore(&mut self, name: &str, saved: Option<Value>) {
        match saved {
            Some(value) => {
                self.locals.insert(name.to_string(), value);
            }
            None => {
                self.locals.remove(name);
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .get(name)
            .or_else(|| self.context.get(name))
            .filter(|v| !v.is_null())
            .cloned()
    }

    /// Resolve a reference; `None` means undefined
    fn resolve(&mut self, reference: &Reference) -> Result<Option<Value>, RenderError> {
        let mut current = match self.lookup(&reference.root) {
            Some(value) => value,
            None => return Ok(None),
        };

        for segment in &reference.segments {
            current = match segment {
                Segment::Property(name) => match current {
                    Value::Object(ref map) => match map.get(name) {
                        Some(value) => value.clone(),
                        None => return Ok(None),
                    },
                    _ => return Ok(None),
                },
                Segment::Method { name, args } => {
                    let args = args
                        .iter()
                        .map(|arg| self.eval(arg, reference.line))
                        .collect::<Result<Vec<_>, _>>()?;
                    match invoke(&current, name, &args) {
                        Ok(value) => value,
                        Err(MethodError::Unsupported) => {
                            return Err(RenderError::Method {
                                method: name.clone(),
                                receiver: type_name(&current).to_string(),
                                line: reference.line,
                            })
                        }
                        Err(MethodError::InvalidArguments(message)) => {
                            return Err(RenderError::Type {
                                message: format!("{}(): {}", name, message),
                                line: reference.line,
                            })
                        }
                    }
                }
            };
            if current.is_null() {
                return Ok(None);
            }
        }

        Ok(Some(current))
    }

    fn eval(&mut self, expr: &Expr, line: usize) -> Result<Value, RenderError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Interpolated(nodes) => {
                let mut out = String::new();
                self.render_nodes(nodes, &mut out)?;
                Ok(Value::String(out))
            }
            // Undefined references evaluate to null so `#if($optional)` works in strict mode
            Expr::Reference(reference) => Ok(self.resolve(reference)?.unwrap_or(Value::Null)),
            Expr::List(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.eval(item, line))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = self.eval(key, line)?;
                    let key = value_text(&key).ok_or_else(|| RenderError::Type {
                        message: "map keys may not be null".to_string(),
                        line,
                    })?;
                    map.insert(key, self.eval(value, line)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Range(from, to) => {
                let from = self.eval(from, line)?;
                let to = self.eval(to, line)?;
                match (from.as_i64(), to.as_i64()) {
                    (Some(a), Some(b)) if a.abs_diff(b) >= MAX_RANGE_LEN => Err(RenderError::Type {
                        message: format!("range [{}..{}] exceeds {} elements", a, b, MAX_RANGE_LEN),
                        line,
                    }),
                    (Some(a), Some(b)) if a <= b => {
                        Ok(Value::Array((a..=b).map(Value::from).collect()))
                    }
                    (Some(a), Some(b)) => {
                        Ok(Value::Array((b..=a).rev().map(Value::from).collect()))
                    }
                    _ => Err(RenderError::Type {
                        message: format!(
                            "range bounds must be integers, got {} and {}",
                            type_name(&from),
                            type_name(&to)
                        ),
                        line,
                    }),
                }
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner, line)?))),
            Expr::Negate(inner) => {
                let value = self.eval(inner, line)?;
                arithmetic(BinaryOp::Sub, &Value::from(0), &value, line)
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                if !truthy(&self.eval(left, line)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&self.eval(right, line)?)))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if truthy(&self.eval(left, line)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&self.eval(right, line)?)))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left, line)?;
                let right = self.eval(right, line)?;
                match op {
                    BinaryOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
                    BinaryOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
                    BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                        let ordering = compare(&left, &right).ok_or_else(|| RenderError::Type {
                            message: format!(
                                "cannot compare {} with {}",
                                type_name(&left),
                                type_name(&right)
                            ),
                            line,
                        })?;
                        let result = match op {
                            BinaryOp::Lt => ordering == Ordering::Less,
                            BinaryOp::Gt => ordering == Ordering::Greater,
                            BinaryOp::Le => ordering != Ordering::Greater,
                            _ => ordering != Ordering::Less,
                        };
                        Ok(Value::Bool(result))
                    }
                    BinaryOp::Add if left.is_string() || right.is_string() => {
                        Ok(Value::String(format!(
                            "{}{}",
                            value_text(&left).unwrap_or_default(),
                            value_text(&right).unwrap_or_default()
                        )))
                    }
                    _ => arithmetic(*op, &left, &right, line),
                }
            }
        }
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    line: usize,
) -> Result<Value, RenderError> {
    let (a, b) = match (left, right) {
        (Value::Number(a), Value::Number(b)) => (a, b),
        _ => {
            return Err(RenderError::Type {
                message: format!(
                    "cannot apply {} to {} and {}",
                    op.symbol(),
                    type_name(left),
                    type_name(right)
                ),
                line,
            })
        }
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div => x.checked_div(y),
            _ => x.checked_rem(y),
        };
        return result.map(Value::from).ok_or_else(|| RenderError::Type {
            message: format!("integer overflow or division by zero in {} {} {}", x, op.symbol(), y),
            line,
        });
    }

    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => x % y,
    };
    serde_json::Number::from_f64(result)
        .map(Value::Number)
        .ok_or_else(|| RenderError::Type {
            message: format!("{} {} {} is not a finite number", x, op.symbol(), y),
            line,
        })
}

fn text_arg(args: &[Value], index: usize) -> Result<String, MethodError> {
    args.get(index)
        .and_then(value_text)
        .ok_or_else(|| MethodError::InvalidArguments(format!("argument {} is null", index + 1)))
}

fn index_arg(args: &[Value], index: usize) -> Result<usize, MethodError> {
    args.get(index)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .ok_or_else(|| {
            let message = format!("argument {} must be a non-negative integer", index + 1);
            MethodError::InvalidArguments(message)
        })
}

fn invoke(receiver: &Value, name: &str, args: &[Value]) -> Result<Value, MethodError> {
    if name == "toString" && args.is_empty() {
        return Ok(Value::String(value_text(receiver).unwrap_or_default()));
    }
    match receiver {
        Value::String(s) => string_method(s, name, args),
        Value::Array(items) => list_method(items, name, args),
        Value::Object(map) => map_method(map, name, args),
        _ => Err(MethodError::Unsupported),
    }
}

fn string_method(s: &str, name: &str, args: &[Value]) -> Result<Value, MethodError> {
    let chars: Vec<char> = s.chars().collect();
    match (name, args.len()) {
        ("length" | "size", 0) => Ok(Value::from(chars.len())),
        ("isEmpty", 0) => Ok(Value::Bool(s.is_empty())),
        ("toUpperCase", 0) => Ok(Value::String(s.to_uppercase())),
        ("toLowerCase", 0) => Ok(Value::String(s.to_lowercase())),
        ("trim", 0) => Ok(Value::String(s.trim().to_string())),
        ("contains", 1) => Ok(Value::Bool(s.contains(text_arg(args, 0)?.as_str()))),
        ("startsWith", 1) => Ok(Value::Bool(s.starts_with(text_arg(args, 0)?.as_str()))),
        ("endsWith", 1) => Ok(Value::Bool(s.ends_with(text_arg(args, 0)?.as_str()))),
        ("equals", 1) => Ok(Value::Bool(value_text(&args[0]).as_deref() == Some(s))),
        ("equalsIgnoreCase", 1) => Ok(Value::Bool(
            value_text(&args[0]).map(|o| o.to_lowercase()) == Some(s.to_lowercase()),
        )),
        ("indexOf", 1) => {
            let needle = text_arg(args, 0)?;
            let index = s
                .find(needle.as_str())
                .map(|byte| s[..byte].chars().count() as i64)
                .unwrap_or(-1);
            Ok(Value::from(index))
        }
        ("replace", 2) => {
            let from = text_arg(args, 0)?;
            let to = text_arg(args, 1)?;
            Ok(Value::String(s.replace(from.as_str(), &to)))
        }
        ("concat", 1) => Ok(Value::String(format!("{}{}", s, text_arg(args, 0)?))),
        ("charAt", 1) => {
            let index = index_arg(args, 0)?;
            chars
                .get(index)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| {
                    MethodError::InvalidArguments(format!("index {} out of bounds", index))
                })
        }
        ("substring", 1) | ("substring", 2) => {
            let begin = index_arg(args, 0)?;
            let end = if args.len() == 2 { index_arg(args, 1)? } else { chars.len() };
            if begin > end || end > chars.len() {
                return Err(MethodError::InvalidArguments(format!(
                    "range {}..{} out of bounds for length {}",
                    begin,
                    end,
                    chars.len()
                )));
            }
            Ok(Value::String(chars[begin..end].iter().collect()))
        }
        ("split", 1) => {
            let separator = text_arg(args, 0)?;
            if separator.is_empty() {
                return Err(MethodError::InvalidArguments("separator is empty".to_string()));
            }
            Ok(Value::Array(
                s.split(separator.as_str()).map(|part| Value::String(part.to_string())).collect(),
            ))
        }
        _ => Err(MethodError::Unsupported),
    }
}

fn list_method(items: &[Value], name: &str, args: &[Value]) -> Result<Value, MethodError> {
    match (name, args.len()) {
        ("size", 0) => Ok(Value::from(items.len())),
        ("isEmpty", 0) => Ok(Value::Bool(items.is_empty())),
        ("get", 1) => {
            let index = index_arg(args, 0)?;
            items
                .get(index)
                .cloned()
                .ok_or_else(|| {
                    MethodError::InvalidArguments(format!("index {} out of bounds", index))
                })
        }
        ("contains", 1) => Ok(Value::Bool(items.iter().any(|item| values_equal(item, &args[0])))),
        _ => Err(MethodError::Unsupported),
    }
}

fn map_method(map: &Map<String, Value>, name: &str, args: &[Value]) -> Result<Value, MethodError> {
    match (name, args.len()) {
        ("size", 0) => Ok(Value::from(map.len())),
        ("isEmpty", 0) => Ok(Value::Bool(map.is_empty())),
        ("get", 1) => Ok(map.get(&text_arg(args, 0)?).cloned().unwrap_or(Value::Null)),
        ("containsKey", 1) => Ok(Value::Bool(map.contains_key(&text_arg(args, 0)?))),
        ("keySet", 0) => Ok(Value::Array(map.keys().map(|k| Value::String(k.clone())).collect())),
        ("values", 0) => Ok(Value::Array(map.values().cloned().collect())),
        _ => Err(MethodError::Unsupported),
    }
}
