//! Template parser: source text to a tree of [`Node`]s.

use serde_json::Value;

use super::RenderError;

/// A parsed template node
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Reference(Reference),
    /// A reference preceded by a run of backslashes
    EscapedReference {
        backslashes: usize,
        reference: Reference,
    },
    Set {
        name: String,
        value: Expr,
        line: usize,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
        line: usize,
    },
    Foreach {
        var: String,
        iterable: Expr,
        body: Vec<Node>,
        line: usize,
    },
}

/// `$name`, `${name.prop}`, `$!name.method(args)`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Reference {
    pub quiet: bool,
    pub root: String,
    pub segments: Vec<Segment>,
    /// Exact source text, emitted verbatim when the reference is undefined
    pub source: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Property(String),
    Method { name: String, args: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Interpolated(Vec<Node>),
    Reference(Reference),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Range(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
        }
    }
}

/// How a block ended
enum TermKind {
    Eof,
    End,
    Else,
    ElseIf(Expr),
}

struct Term {
    kind: TermKind,
    pos: usize,
}

/// Parse a whole template
pub(crate) fn parse(source: &str) -> Result<Vec<Node>, RenderError> {
    Parser::new(source).parse_template()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    line_starts: Vec<usize>,
}

fn is_ident_start(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_ascii_alphabetic() || c == '_')
}

fn is_ident_char(c: Option<char>) -> bool {
    matches!(c, Some(c) if c.is_ascii_alphanumeric() || c == '_')
}

fn is_directive(name: &str) -> bool {
    matches!(name, "set" | "if" | "elseif" | "else" | "end" | "foreach")
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
}

impl Parser {
    fn new(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut line_starts = vec![0];
        for (i, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            chars,
            pos: 0,
            line_starts,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        let needle: Vec<char> = needle.chars().collect();
        if from > self.chars.len() {
            return None;
        }
        self.chars[from..]
            .windows(needle.len())
            .position(|w| w == needle.as_slice())
            .map(|i| from + i)
    }

    fn location(&self, pos: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, pos - self.line_starts[line] + 1)
    }

    fn line(&self, pos: usize) -> usize {
        self.location(pos).0
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> RenderError {
        let (line, column) = self.location(pos);
        RenderError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn parse_template(&mut self) -> Result<Vec<Node>, RenderError> {
        let (nodes, term) = self.parse_block()?;
        match term.kind {
            TermKind::Eof => Ok(nodes),
            TermKind::End => Err(self.error(term.pos, "#end without a matching #if or #foreach")),
            TermKind::Else => Err(self.error(term.pos, "#else without a matching #if")),
            TermKind::ElseIf(_) => Err(self.error(term.pos, "#elseif without a matching #if")),
        }
    }

    /// Parse nodes until end of input or a block terminator directive
    fn parse_block(&mut self) -> Result<(Vec<Node>, Term), RenderError> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    if let Some(reference) = self.parse_backslashes(&mut text)? {
                        flush(&mut text, &mut nodes);
                        nodes.push(reference);
                    }
                }
                '$' => {
                    let start = self.pos;
                    match self.try_reference()? {
                        Some(reference) => {
                            flush(&mut text, &mut nodes);
                            nodes.push(Node::Reference(reference));
                        }
                        None => {
                            self.pos = start + 1;
                            text.push('$');
                        }
                    }
                }
                '#' => {
                    if let Some(term) = self.parse_hash(&mut text, &mut nodes)? {
                        flush(&mut text, &mut nodes);
                        return Ok((nodes, term));
                    }
                }
                _ => {
                    text.push(c);
                    self.pos += 1;
                }
            }
        }

        flush(&mut text, &mut nodes);
        Ok((nodes, Term { kind: TermKind::Eof, pos: self.pos }))
    }

    /// Handle a run of backslashes.
    ///
    /// Before a directive, pairs of backslashes collapse to one and an odd
    /// one out makes the directive literal. Before a reference the decision
    /// needs the context, so an escaped reference node is returned. Anything
    /// else keeps its backslashes.
    fn parse_backslashes(&mut self, text: &mut String) -> Result<Option<Node>, RenderError> {
        let start = self.pos;
        let mut after = start;
        while self.chars.get(after) == Some(&'\\') {
            after += 1;
        }
        let run = after - start;

        match self.chars.get(after) {
            Some('$') => {
                self.pos = after;
                if let Some(reference) = self.try_reference()? {
                    return Ok(Some(Node::EscapedReference {
                        backslashes: run,
                        reference,
                    }));
                }
                text.extend(std::iter::repeat('\\').take(run));
                text.push('$');
                self.pos = after + 1;
            }
            Some('#')
                if self
                    .directive_name(after)
                    .is_some_and(|(name, _)| is_directive(&name)) =>
            {
                text.extend(std::iter::repeat('\\').take(run / 2));
                if run % 2 == 1 {
                    text.push('#');
                    self.pos = after + 1;
                } else {
                    self.pos = after;
                }
            }
            _ => {
                text.extend(std::iter::repeat('\\').take(run));
                self.pos = after;
            }
        }
        Ok(None)
    }

    /// Handle a `#`: comment, unparsed block, directive or plain text.
    ///
    /// Returns a terminator when the directive closes the current block.
    fn parse_hash(
        &mut self,
        text: &mut String,
        nodes: &mut Vec<Node>,
    ) -> Result<Option<Term>, RenderError> {
        let start = self.pos;

        if self.starts_with("##") {
            self.pos = match self.find_from(start, "\n") {
                Some(nl) => nl + 1,
                None => self.chars.len(),
            };
            return Ok(None);
        }

        if self.starts_with("#*") {
            let end = self
                .find_from(start + 2, "*#")
                .ok_or_else(|| self.error(start, "unterminated #* comment"))?;
            self.pos = end + 2;
            return Ok(None);
        }

        if self.starts_with("#[[") {
            let end = self
                .find_from(start + 3, "]]#")
                .ok_or_else(|| self.error(start, "unterminated #[[ block"))?;
            text.extend(&self.chars[start + 3..end]);
            self.pos = end + 3;
            return Ok(None);
        }

        let (name, after_name) = match self.directive_name(start) {
            Some(found) => found,
            None => {
                text.push('#');
                self.pos += 1;
                return Ok(None);
            }
        };

        if !is_directive(&name) {
            text.push('#');
            self.pos += 1;
            return Ok(None);
        }

        let leading_blank = self.line_prefix_blank(start);
        self.pos = after_name;
        let line = self.line(start);

        match name.as_str() {
            "end" => {
                self.gobble_line(leading_blank, text);
                Ok(Some(Term { kind: TermKind::End, pos: start }))
            }
            "else" => {
                self.gobble_line(leading_blank, text);
                Ok(Some(Term { kind: TermKind::Else, pos: start }))
            }
            "elseif" => {
                let cond = self.paren_expr("#elseif")?;
                self.gobble_line(leading_blank, text);
                Ok(Some(Term { kind: TermKind::ElseIf(cond), pos: start }))
            }
            "set" => {
                self.open_paren("#set")?;
                let name = self.variable_name("#set")?;
                self.skip_ws();
                if self.peek() != Some('=') {
                    return Err(self.error(self.pos, "expected = in #set"));
                }
                self.pos += 1;
                let value = self.expr()?;
                self.close_paren("#set")?;
                self.gobble_line(leading_blank, text);
                flush(text, nodes);
                nodes.push(Node::Set { name, value, line });
                Ok(None)
            }
            "if" => {
                let cond = self.paren_expr("#if")?;
                self.gobble_line(leading_blank, text);
                flush(text, nodes);
                let node = self.parse_if(start, cond)?;
                nodes.push(node);
                Ok(None)
            }
            _ => {
                self.open_paren("#foreach")?;
                let var = self.variable_name("#foreach")?;
                self.skip_ws();
                if !self.eat_word("in") {
                    return Err(self.error(self.pos, "expected 'in' in #foreach"));
                }
                let iterable = self.expr()?;
                self.close_paren("#foreach")?;
                self.gobble_line(leading_blank, text);
                flush(text, nodes);

                let (body, term) = self.parse_block()?;
                match term.kind {
                    TermKind::End => {}
                    TermKind::Eof => {
                        return Err(self.error(start, "#foreach is missing a matching #end"))
                    }
                    _ => return Err(self.error(term.pos, "#else/#elseif inside #foreach")),
                }
                nodes.push(Node::Foreach { var, iterable, body, line });
                Ok(None)
            }
        }
    }

    fn parse_if(&mut self, start: usize, cond: Expr) -> Result<Node, RenderError> {
        let line = self.line(start);
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut current = cond;

        loop {
            let (body, term) = self.parse_block()?;
            branches.push((current, body));
            match term.kind {
                TermKind::End => break,
                TermKind::ElseIf(next) => current = next,
                TermKind::Else => {
                    let (body, term) = self.parse_block()?;
                    match term.kind {
                        TermKind::End => {
                            otherwise = Some(body);
                            break;
                        }
                        TermKind::Eof => {
                            return Err(self.error(start, "#if is missing a matching #end"))
                        }
                        _ => return Err(self.error(term.pos, "#else/#elseif after #else")),
                    }
                }
                TermKind::Eof => return Err(self.error(start, "#if is missing a matching #end")),
            }
        }

        Ok(Node::If { branches, otherwise, line })
    }

    /// `#name` or `#{name}`; returns the name and the position after it
    fn directive_name(&self, start: usize) -> Option<(String, usize)> {
        let mut p = start + 1;
        let braced = self.chars.get(p) == Some(&'{');
        if braced {
            p += 1;
        }
        let name_start = p;
        while matches!(self.chars.get(p), Some(c) if c.is_ascii_alphabetic()) {
            p += 1;
        }
        if p == name_start {
            return None;
        }
        let name: String = self.chars[name_start..p].iter().collect();
        if braced {
            if self.chars.get(p) != Some(&'}') {
                return None;
            }
            p += 1;
        }
        Some((name, p))
    }

    fn line_prefix_blank(&self, start: usize) -> bool {
        self.chars[..start]
            .iter()
            .rev()
            .take_while(|c| **c != '\n')
            .all(|c| *c == ' ' || *c == '\t')
    }

    /// A directive alone on its line swallows the line's indentation and newline
    fn gobble_line(&mut self, leading_blank: bool, text: &mut String) {
        if !leading_blank {
            return;
        }
        let mut p = self.pos;
        while matches!(self.chars.get(p), Some(' ') | Some('\t')) {
            p += 1;
        }
        let end = match self.chars.get(p) {
            None => p,
            Some('\n') => p + 1,
            Some('\r') if self.chars.get(p + 1) == Some(&'\n') => p + 2,
            Some(_) => return,
        };
        let keep = text.trim_end_matches([' ', '\t']).len();
        text.truncate(keep);
        self.pos = end;
    }

    fn try_reference(&mut self) -> Result<Option<Reference>, RenderError> {
        let start = self.pos;
        let mut p = start + 1;
        let quiet = self.chars.get(p) == Some(&'!');
        if quiet {
            p += 1;
        }
        let formal = self.chars.get(p) == Some(&'{');
        if formal {
            p += 1;
        }
        if !is_ident_start(self.chars.get(p).copied()) {
            return Ok(None);
        }

        self.pos = p;
        let root = self.ident();
        let segments = self.segments()?;

        if formal {
            if self.peek() != Some('}') {
                self.pos = start;
                return Ok(None);
            }
            self.pos += 1;
        }

        Ok(Some(Reference {
            quiet,
            root,
            segments,
            source: self.chars[start..self.pos].iter().collect(),
            line: self.line(start),
        }))
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while is_ident_char(self.peek()) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn segments(&mut self) -> Result<Vec<Segment>, RenderError> {
        let mut segments = Vec::new();
        while self.peek() == Some('.') && is_ident_start(self.peek_at(1)) {
            self.pos += 1;
            let name = self.ident();
            if self.peek() == Some('(') {
                self.pos += 1;
                let args = self.arguments()?;
                segments.push(Segment::Method { name, args });
            } else {
                segments.push(Segment::Property(name));
            }
        }
        Ok(segments)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, RenderError> {
        let open = self.pos - 1;
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(args);
                }
                Some(_) => return Err(self.error(self.pos, "expected , or ) in argument list")),
                None => return Err(self.error(open, "unterminated argument list")),
            }
        }
    }

    fn variable_name(&mut self, directive: &str) -> Result<String, RenderError> {
        self.skip_ws();
        if self.peek() != Some('$') {
            return Err(self.error(self.pos, format!("expected variable in {}", directive)));
        }
        self.pos += 1;
        let braced = self.peek() == Some('{');
        if braced {
            self.pos += 1;
        }
        if !is_ident_start(self.peek()) {
            return Err(self.error(self.pos, format!("expected variable name in {}", directive)));
        }
        let name = self.ident();
        if braced {
            if self.peek() != Some('}') {
                return Err(self.error(self.pos, "expected }"));
            }
            self.pos += 1;
        }
        if self.peek() == Some('.') {
            let message = format!("{} only accepts a plain variable", directive);
            return Err(self.error(self.pos, message));
        }
        Ok(name)
    }

    fn paren_expr(&mut self, directive: &str) -> Result<Expr, RenderError> {
        self.open_paren(directive)?;
        let expr = self.expr()?;
        self.close_paren(directive)?;
        Ok(expr)
    }

    fn open_paren(&mut self, directive: &str) -> Result<(), RenderError> {
        self.skip_ws();
        if self.peek() != Some('(') {
            return Err(self.error(self.pos, format!("expected ( after {}", directive)));
        }
        self.pos += 1;
        Ok(())
    }

    fn close_paren(&mut self, directive: &str) -> Result<(), RenderError> {
        self.skip_ws();
        if self.peek() != Some(')') {
            return Err(self.error(self.pos, format!("expected ) to close {}", directive)));
        }
        self.pos += 1;
        Ok(())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, symbol: &str) -> bool {
        self.skip_ws();
        if self.starts_with(symbol) {
            self.pos += symbol.chars().count();
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_ws();
        let len = word.chars().count();
        if self.starts_with(word) && !is_ident_char(self.peek_at(len)) {
            self.pos += len;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.and_expr()?;
        while self.eat("||") || self.eat_word("or") {
            let right = self.and_expr()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.equality()?;
        while self.eat("&&") || self.eat_word("and") {
            let right = self.equality()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.relational()?;
        loop {
            let op = if self.eat("==") || self.eat_word("eq") {
                BinaryOp::Eq
            } else if self.eat("!=") || self.eat_word("ne") {
                BinaryOp::Ne
            } else {
                return Ok(left);
            };
            let right = self.relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn relational(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.additive()?;
        loop {
            let op = if self.eat("<=") || self.eat_word("le") {
                BinaryOp::Le
            } else if self.eat(">=") || self.eat_word("ge") {
                BinaryOp::Ge
            } else if self.eat("<") || self.eat_word("lt") {
                BinaryOp::Lt
            } else if self.eat(">") || self.eat_word("gt") {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, RenderError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else if self.eat("%") {
                BinaryOp::Mod
            } else {
                return Ok(left);
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, RenderError> {
        if self.eat_word("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.skip_ws();
        if self.peek() == Some('!') && self.peek_at(1) != Some('=') {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some('-') && !matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, RenderError> {
        self.skip_ws();
        let start = self.pos;
        match self.peek() {
            Some('$') => match self.try_reference()? {
                Some(reference) => Ok(Expr::Reference(reference)),
                None => Err(self.error(start, "expected a reference after $")),
            },
            Some('"') => self.double_quoted(),
            Some('\'') => {
                let end = self
                    .find_from(start + 1, "'")
                    .ok_or_else(|| self.error(start, "unterminated string literal"))?;
                let s: String = self.chars[start + 1..end].iter().collect();
                self.pos = end + 1;
                Ok(Expr::Literal(Value::String(s)))
            }
            Some(c) if c.is_ascii_digit() || c == '-' => self.number(),
            Some('[') => self.list(),
            Some('{') => self.map(),
            Some('(') => {
                self.pos += 1;
                let inner = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(self.error(self.pos, "expected )"));
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let word = self.ident();
                match word.as_str() {
                    "true" => Ok(Expr::Literal(Value::Bool(true))),
                    "false" => Ok(Expr::Literal(Value::Bool(false))),
                    "null" => Ok(Expr::Literal(Value::Null)),
                    _ => {
                        let message = format!("unexpected word '{}' in expression", word);
                        Err(self.error(start, message))
                    }
                }
            }
            Some(c) => {
                let message = format!("unexpected character '{}' in expression", c);
                Err(self.error(start, message))
            }
            None => Err(self.error(start, "unexpected end of template in expression")),
        }
    }

    fn double_quoted(&mut self) -> Result<Expr, RenderError> {
        let start = self.pos;
        let mut content = String::new();
        let mut p = start + 1;
        loop {
            match self.chars.get(p) {
                None => return Err(self.error(start, "unterminated string literal")),
                Some('"') if self.chars.get(p + 1) == Some(&'"') => {
                    content.push('"');
                    p += 2;
                }
                Some('"') => break,
                Some(c) => {
                    content.push(*c);
                    p += 1;
                }
            }
        }
        self.pos = p + 1;

        if content.contains('$') || content.contains('#') {
            let nodes = Parser::new(&content).parse_template().map_err(|e| match e {
                RenderError::Parse { message, .. } => {
                    self.error(start, format!("in string literal: {}", message))
                }
                other => other,
            })?;
            Ok(Expr::Interpolated(nodes))
        } else {
            Ok(Expr::Literal(Value::String(content)))
        }
    }

    fn number(&mut self) -> Result<Expr, RenderError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut float = false;
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(c) if c.is_ascii_digit()) {
            float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        let value = if float {
            literal
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        } else {
            literal.parse::<i64>().ok().map(Value::from)
        };
        value
            .map(Expr::Literal)
            .ok_or_else(|| self.error(start, format!("invalid number '{}'", literal)))
    }

    fn list(&mut self) -> Result<Expr, RenderError> {
        let start = self.pos;
        self.pos += 1;
        if self.eat("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.expr()?;
        if self.eat("..") {
            let last = self.expr()?;
            if !self.eat("]") {
                return Err(self.error(self.pos, "expected ] to close range"));
            }
            return Ok(Expr::Range(Box::new(first), Box::new(last)));
        }
        let mut items = vec![first];
        loop {
            if self.eat("]") {
                return Ok(Expr::List(items));
            }
            if !self.eat(",") {
                return Err(self.error(start, "expected , or ] in list"));
            }
            items.push(self.expr()?);
        }
    }

    fn map(&mut self) -> Result<Expr, RenderError> {
        let start = self.pos;
        self.pos += 1;
        let mut entries = Vec::new();
        if self.eat("}") {
            return Ok(Expr::Map(entries));
        }
        loop {
            let key = self.expr()?;
            if !self.eat(":") {
                return Err(self.error(self.pos, "expected : in map literal"));
            }
            let value = self.expr()?;
            entries.push((key, value));
            if self.eat("}") {
                return Ok(Expr::Map(entries));
            }
            if !self.eat(",") {
                return Err(self.error(start, "expected , or } in map literal"));
            }
        }
    }
}
