//! Per-step name analysis
//!
//! Walks the logical lines of a step and records which names are read before
//! the step binds them (candidate inputs) and which names the step binds at
//! top level (candidate outputs). Function and lambda bodies are not entered;
//! class bodies run in their own namespace.

use crate::analysis::builtins::is_excluded;
use crate::analysis::lexer::{
    tokenize, tokenize_expression, LexError, LexedSource, Token, TokenKind,
};
use std::collections::{BTreeSet, HashSet};

/// Names a step reads from and writes to the notebook namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepScope {
    /// Names read before any local binding, in first-read order
    pub reads: Vec<String>,
    /// Names assigned at top level
    pub writes: BTreeSet<String>,
    /// Every name bound by the step, including imports and definitions
    pub bound: BTreeSet<String>,
}

const AUGMENTED_ASSIGN: &[&str] = &[
    "+=", "-=", "*=", "/=", "//=", "%=", "**=", ">>=", "<<=", "&=", "|=", "^=", "@=",
];

/// Analyze a sequence of cells executed one after the other
pub fn analyze_cells<S: AsRef<str>>(cells: &[S]) -> Result<StepScope, LexError> {
    let mut walker = ScopeWalker::default();
    let mut offset = 0;

    for cell in cells {
        let cell = cell.as_ref();
        let lexed = tokenize(cell).map_err(|e| LexError {
            line: e.line + offset,
            message: e.message,
        })?;
        walker.feed(&lexed).map_err(|e| LexError {
            line: e.line + offset,
            message: e.message,
        })?;
        offset += cell.matches('\n').count() + usize::from(!cell.ends_with('\n'));
    }

    Ok(walker.finish())
}

pub fn analyze_source(source: &str) -> Result<StepScope, LexError> {
    analyze_cells(&[source])
}

fn is_open(token: &Token) -> bool {
    token.is_op("(") || token.is_op("[") || token.is_op("{")
}

fn is_close(token: &Token) -> bool {
    token.is_op(")") || token.is_op("]") || token.is_op("}")
}

/// Index of the bracket closing the one opened at `open`
fn matching_close(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        if is_open(token) {
            depth += 1;
        } else if is_close(token) {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return i;
            }
        }
    }
    tokens.len().saturating_sub(1)
}

/// First index at or after `start` where `pred` holds outside brackets
fn find_top_level(tokens: &[Token], start: usize, pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start) {
        if depth == 0 && pred(token) {
            return Some(i);
        }
        if is_open(token) {
            depth += 1;
        } else if is_close(token) {
            depth = depth.saturating_sub(1);
        }
    }
    None
}

/// Split on a top-level operator
fn split_top_level<'a>(tokens: &'a [Token], sep: &str) -> Vec<&'a [Token]> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(i) = find_top_level(tokens, start, |t| t.is_op(sep)) {
        parts.push(&tokens[start..i]);
        start = i + 1;
    }
    parts.push(&tokens[start..]);
    parts
}

/// Drop one pair of brackets enclosing the whole slice
fn strip_enclosing(tokens: &[Token]) -> &[Token] {
    if tokens.len() >= 2 && is_open(&tokens[0]) && matching_close(tokens, 0) == tokens.len() - 1 {
        &tokens[1..tokens.len() - 1]
    } else {
        tokens
    }
}

/// A `match`/`case` soft keyword opening a statement rather than naming a variable
fn is_soft_head(tokens: &[Token]) -> bool {
    match tokens.get(1) {
        Some(next) if next.is_name() || is_open(next) || next.is_op("-") || next.is_op("*") => {
            find_top_level(tokens, 1, |t| t.is_op(":")).is_some()
        }
        Some(next) => next.kind != TokenKind::Op
            && find_top_level(tokens, 1, |t| t.is_op(":")).is_some(),
        None => false,
    }
}

/// What follows a compound statement header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// Part of the enclosing scope
    Walked,
    /// Not run when the header runs
    Opaque,
    /// Run at once in a class namespace
    Class,
}

/// A class body being walked; names it binds stay out of the step namespace
struct ClassFrame {
    indent: usize,
    locals: HashSet<String>,
}

#[derive(Default)]
struct ScopeWalker {
    reads: Vec<String>,
    read_set: HashSet<String>,
    writes: BTreeSet<String>,
    bound: BTreeSet<String>,
    classes: Vec<ClassFrame>,
}

impl ScopeWalker {
    fn finish(self) -> StepScope {
        StepScope {
            reads: self.reads,
            writes: self.writes,
            bound: self.bound,
        }
    }

    fn feed(&mut self, lexed: &LexedSource) -> Result<(), LexError> {
        let mut opaque_indent: Option<usize> = None;
        self.classes.clear();

        for line in &lexed.lines {
            if let Some(indent) = opaque_indent {
                if line.indent > indent {
                    continue;
                }
                opaque_indent = None;
            }
            while self.classes.last().map_or(false, |c| line.indent <= c.indent) {
                self.classes.pop();
            }

            for stmt in split_top_level(&line.tokens, ";") {
                let body = self.statement(stmt).map_err(|message| LexError {
                    line: line.line,
                    message,
                })?;
                match body {
                    Body::Walked => {}
                    Body::Opaque => opaque_indent = Some(line.indent),
                    Body::Class => self.classes.push(ClassFrame {
                        indent: line.indent,
                        locals: HashSet::new(),
                    }),
                }
            }
        }
        Ok(())
    }

    fn read(&mut self, name: &str) {
        if is_excluded(name) || self.bound.contains(name) || self.read_set.contains(name) {
            return;
        }
        if self.classes.last().map_or(false, |c| c.locals.contains(name)) {
            return;
        }
        self.read_set.insert(name.to_string());
        self.reads.push(name.to_string());
    }

    fn bind(&mut self, name: &str, top_level: bool) {
        if is_excluded(name) {
            return;
        }
        if let Some(class) = self.classes.last_mut() {
            class.locals.insert(name.to_string());
            return;
        }
        self.bound.insert(name.to_string());
        if top_level {
            self.writes.insert(name.to_string());
        }
    }

    fn unbind(&mut self, name: &str) {
        if let Some(class) = self.classes.last_mut() {
            class.locals.remove(name);
            return;
        }
        self.bound.remove(name);
        self.writes.remove(name);
    }

    /// Handle one statement and report how the body it opens, if any, is
    /// analyzed.
    fn statement(&mut self, tokens: &[Token]) -> Result<Body, String> {
        let Some(head) = tokens.first() else {
            return Ok(Body::Walked);
        };
        let header_end = || find_top_level(tokens, 1, |t| t.is_op(":"));
        let none = HashSet::new();

        let body_start = match head.text.as_str() {
            _ if !head.is_name() && !head.is_op("@") => {
                self.simple_statement(tokens)?;
                return Ok(Body::Walked);
            }
            "@" => {
                self.scan(&tokens[1..], &none, false)?;
                return Ok(Body::Walked);
            }
            "async" => return self.statement(&tokens[1..]),
            "def" => {
                self.signature(tokens)?;
                if let Some(name) = tokens.get(1).filter(|t| t.is_name()) {
                    self.bind(&name.text, false);
                }
                return Ok(Body::Opaque);
            }
            "class" => {
                let end = header_end().unwrap_or(tokens.len());
                if end > 2 {
                    self.scan(&tokens[2..end], &none, false)?;
                }
                if end + 1 < tokens.len() {
                    self.classes.push(ClassFrame {
                        indent: usize::MAX,
                        locals: HashSet::new(),
                    });
                    let inline = self.statement(&tokens[end + 1..]);
                    self.classes.pop();
                    inline?;
                }
                if let Some(name) = tokens.get(1).filter(|t| t.is_name()) {
                    self.bind(&name.text, false);
                }
                return Ok(if end + 1 < tokens.len() { Body::Walked } else { Body::Class });
            }
            "if" | "elif" | "while" => {
                let colon = header_end().ok_or("expected ':'")?;
                self.scan(&tokens[1..colon], &none, false)?;
                colon + 1
            }
            "else" | "try" | "finally" => header_end().map_or(tokens.len(), |c| c + 1),
            "for" => {
                let colon = header_end().ok_or("expected ':'")?;
                let header = &tokens[..colon];
                let in_idx = find_top_level(header, 1, |t| t.is_keyword("in"))
                    .ok_or("expected 'in' in for statement")?;
                self.scan(&header[in_idx + 1..], &none, false)?;
                self.bind_targets(&header[1..in_idx], false)?;
                colon + 1
            }
            "except" => {
                let colon = header_end().ok_or("expected ':'")?;
                let header = &tokens[1..colon];
                match find_top_level(header, 0, |t| t.is_keyword("as")) {
                    Some(as_idx) => {
                        self.scan(&header[..as_idx], &none, false)?;
                        self.bind_targets(&header[as_idx + 1..], false)?;
                    }
                    None => self.scan(header, &none, false)?,
                }
                colon + 1
            }
            "with" => {
                let colon = header_end().ok_or("expected ':'")?;
                self.with_items(strip_enclosing(&tokens[1..colon]))?;
                colon + 1
            }
            "match" if is_soft_head(tokens) => {
                let colon = header_end().ok_or("expected ':'")?;
                self.scan(&tokens[1..colon], &none, false)?;
                colon + 1
            }
            "case" if is_soft_head(tokens) => {
                let colon = header_end().ok_or("expected ':'")?;
                self.case_pattern(&tokens[1..colon])?;
                colon + 1
            }
            _ => {
                self.simple_statement(tokens)?;
                return Ok(Body::Walked);
            }
        };

        if body_start < tokens.len() {
            self.statement(&tokens[body_start..])
        } else {
            Ok(Body::Walked)
        }
    }

    /// Parameter annotations, defaults and the return annotation of a `def`
    /// are evaluated when the `def` runs.
    fn signature(&mut self, tokens: &[Token]) -> Result<(), String> {
        let none = HashSet::new();
        let Some(open) = tokens.iter().position(|t| t.is_op("(")) else {
            return Ok(());
        };
        let close = matching_close(tokens, open);

        for param in split_top_level(&tokens[open + 1..close.max(open + 1)], ",") {
            let eq = find_top_level(param, 0, |t| t.is_op("="));
            let head = &param[..eq.unwrap_or(param.len())];
            if let Some(colon) = find_top_level(head, 0, |t| t.is_op(":")) {
                self.scan(&head[colon + 1..], &none, false)?;
            }
            if let Some(eq) = eq {
                self.scan(&param[eq + 1..], &none, false)?;
            }
        }

        if let Some(arrow) = find_top_level(tokens, close + 1, |t| t.is_op("->")) {
            let end = find_top_level(tokens, arrow + 1, |t| t.is_op(":")).unwrap_or(tokens.len());
            self.scan(&tokens[arrow + 1..end], &none, false)?;
        }
        Ok(())
    }

    fn simple_statement(&mut self, tokens: &[Token]) -> Result<(), String> {
        let none = HashSet::new();
        let head = &tokens[0];

        if head.is_keyword("import") {
            for item in split_top_level(&tokens[1..], ",") {
                match find_top_level(item, 0, |t| t.is_keyword("as")) {
                    Some(as_idx) => {
                        if let Some(alias) = item.get(as_idx + 1) {
                            self.bind(&alias.text, false);
                        }
                    }
                    None => {
                        if let Some(root) = item.first().filter(|t| t.is_name()) {
                            self.bind(&root.text, false);
                        }
                    }
                }
            }
            return Ok(());
        }

        if head.is_keyword("from") {
            let import_idx = find_top_level(tokens, 1, |t| t.is_keyword("import"))
                .ok_or("expected 'import'")?;
            for item in split_top_level(strip_enclosing(&tokens[import_idx + 1..]), ",") {
                match find_top_level(item, 0, |t| t.is_keyword("as")) {
                    Some(as_idx) => {
                        if let Some(alias) = item.get(as_idx + 1) {
                            self.bind(&alias.text, false);
                        }
                    }
                    None => {
                        if let Some(name) = item.first().filter(|t| t.is_name()) {
                            self.bind(&name.text, false);
                        }
                    }
                }
            }
            return Ok(());
        }

        if head.is_keyword("del") {
            for target in split_top_level(&tokens[1..], ",") {
                let target = strip_enclosing(target);
                if target.len() == 1 && target[0].is_name() {
                    let name = &target[0].text;
                    self.read(name);
                    self.unbind(name);
                } else {
                    self.scan(target, &none, false)?;
                }
            }
            return Ok(());
        }

        if head.is_keyword("global") || head.is_keyword("nonlocal") {
            return Ok(());
        }

        if let Some(op) = find_top_level(tokens, 0, |t| AUGMENTED_ASSIGN.iter().any(|a| t.is_op(a))) {
            self.scan(&tokens[op + 1..], &none, false)?;
            self.scan(&tokens[..op], &none, false)?;
            return self.bind_targets(&tokens[..op], true);
        }

        // Everything after a top-level lambda belongs to the value
        let assign_region = find_top_level(tokens, 0, |t| t.is_keyword("lambda")).unwrap_or(tokens.len());
        let region = &tokens[..assign_region];
        let parts = split_top_level(region, "=");
        if let Some((value_part, targets)) = parts.split_last().filter(|(_, t)| !t.is_empty()) {
            let last_eq = region.len() - value_part.len() - 1;
            self.scan(&tokens[last_eq + 1..], &none, false)?;
            for target in targets {
                match find_top_level(target, 0, |t| t.is_op(":")) {
                    Some(colon) => {
                        self.scan(&target[colon + 1..], &none, false)?;
                        self.bind_targets(&target[..colon], true)?;
                    }
                    None => self.bind_targets(target, true)?,
                }
            }
            return Ok(());
        }

        match find_top_level(tokens, 0, |t| t.is_op(":")) {
            // Bare annotation: `x: int` binds nothing
            Some(colon) if assign_region == tokens.len() => self.scan(&tokens[colon + 1..], &none, false),
            _ => self.scan(tokens, &none, false),
        }
    }

    fn with_items(&mut self, items: &[Token]) -> Result<(), String> {
        let none = HashSet::new();
        for item in split_top_level(items, ",") {
            match find_top_level(item, 0, |t| t.is_keyword("as")) {
                Some(as_idx) => {
                    self.scan(&item[..as_idx], &none, false)?;
                    self.bind_targets(&item[as_idx + 1..], false)?;
                }
                None => self.scan(item, &none, false)?,
            }
        }
        Ok(())
    }

    fn case_pattern(&mut self, header: &[Token]) -> Result<(), String> {
        let (pattern, guard) = match find_top_level(header, 0, |t| t.is_keyword("if")) {
            Some(i) => (&header[..i], &header[i + 1..]),
            None => (header, &header[header.len()..]),
        };

        for (i, token) in pattern.iter().enumerate() {
            if !token.is_name() || token.text == "_" || is_excluded(&token.text) {
                continue;
            }
            if i > 0 && pattern[i - 1].is_op(".") {
                continue;
            }
            match pattern.get(i + 1) {
                Some(next) if next.is_op(".") || next.is_op("(") => self.read(&token.text),
                Some(next) if next.is_op("=") => {}
                _ => self.bind(&token.text, false),
            }
        }

        self.scan(guard, &HashSet::new(), false)
    }

    /// Bind assignment targets. Attribute and subscript targets read their
    /// base and, at top level, mark it as written.
    fn bind_targets(&mut self, tokens: &[Token], top_level: bool) -> Result<(), String> {
        let tokens = strip_enclosing(tokens);
        let parts = split_top_level(tokens, ",");
        if parts.len() > 1 {
            for part in parts {
                self.bind_targets(part, top_level)?;
            }
            return Ok(());
        }

        let mut target = parts[0];
        if target.first().map_or(false, |t| t.is_op("*") || t.is_op("**")) {
            target = &target[1..];
        }
        match target {
            [] => Ok(()),
            [single] if single.is_name() => {
                self.bind(&single.text, top_level);
                Ok(())
            }
            [first, ..] if is_open(first) && matching_close(target, 0) == target.len() - 1 => {
                self.bind_targets(target, top_level)
            }
            [first, ..] => {
                self.scan(target, &HashSet::new(), false)?;
                if top_level && self.classes.is_empty() && first.is_name() && !is_excluded(&first.text) {
                    self.writes.insert(first.text.clone());
                }
                Ok(())
            }
        }
    }

    /// Record reads in an expression. `hidden` holds comprehension and
    /// lambda locals in effect.
    fn scan(&mut self, tokens: &[Token], hidden: &HashSet<String>, in_brackets: bool) -> Result<(), String> {
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];

            if is_open(token) {
                let close = matching_close(tokens, i);
                let inner = &tokens[i + 1..close.max(i + 1)];
                let targets = comprehension_targets(inner);
                if targets.is_empty() {
                    self.scan(inner, hidden, true)?;
                } else {
                    let mut scoped = hidden.clone();
                    scoped.extend(targets);
                    self.scan(inner, &scoped, true)?;
                }
                i = close + 1;
                continue;
            }

            if token.is_keyword("lambda") {
                i = self.lambda(tokens, i, hidden)?;
                continue;
            }

            if !token.fields.is_empty() {
                for field in &token.fields {
                    let field_tokens = tokenize_expression(field).map_err(|e| e.message)?;
                    self.scan(&field_tokens, hidden, true)?;
                }
            }

            if token.is_name() {
                let after_dot = i > 0 && tokens[i - 1].is_op(".");
                let next = tokens.get(i + 1);
                let keyword_arg = in_brackets && next.map_or(false, |n| n.is_op("="));
                if next.map_or(false, |n| n.is_op(":=")) {
                    self.bind(&token.text, true);
                } else if !after_dot && !keyword_arg && !hidden.contains(&token.text) {
                    self.read(&token.text);
                }
            }
            i += 1;
        }
        Ok(())
    }

    /// Read the defaults of a lambda starting at `start`; returns the index
    /// just past its body. The body itself runs only when called.
    fn lambda(&mut self, tokens: &[Token], start: usize, hidden: &HashSet<String>) -> Result<usize, String> {
        let colon = find_top_level(tokens, start + 1, |t| t.is_op(":")).unwrap_or(tokens.len());

        for param in split_top_level(&tokens[start + 1..colon], ",") {
            if let Some(eq) = param.iter().position(|t| t.is_op("=")) {
                self.scan(&param[eq + 1..], hidden, true)?;
            }
        }

        let body_start = (colon + 1).min(tokens.len());
        Ok(find_top_level(tokens, body_start, |t| t.is_op(",")).unwrap_or(tokens.len()))
    }
}

/// Names bound by `for ... in` clauses of a comprehension body
fn comprehension_targets(inner: &[Token]) -> Vec<String> {
    let mut targets = Vec::new();
    let mut start = 0;
    while let Some(for_idx) = find_top_level(inner, start, |t| t.is_keyword("for")) {
        let Some(in_idx) = find_top_level(inner, for_idx + 1, |t| t.is_keyword("in")) else {
            break;
        };
        targets.extend(
            inner[for_idx + 1..in_idx]
                .iter()
                .filter(|t| t.is_name())
                .map(|t| t.text.clone()),
        );
        start = in_idx + 1;
    }
    targets
}
