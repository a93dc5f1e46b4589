//! Python tokenizer
//!
//! Produces logical lines (statements joined across bracket and backslash
//! continuations) with their indentation. Enough of Python's lexical grammar
//! is covered to find names reliably: strings of every flavour, f-string
//! replacement fields, comments, numbers and operators. IPython magics are
//! recognized and set aside.

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    Str,
    Op,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Source of each f-string replacement field (empty for other tokens)
    pub fields: Vec<String>,
}

impl Token {
    fn new(kind: TokenKind, text: String) -> Self {
        Self {
            kind,
            text,
            fields: Vec::new(),
        }
    }

    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    pub fn is_keyword(&self, kw: &str) -> bool {
        self.kind == TokenKind::Name && self.text == kw
    }
}

/// One statement line (or compound statement header) after joining continuations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Indentation width of the first physical line
    pub indent: usize,
    /// Zero-based physical line the statement starts on
    pub line: usize,
    pub tokens: Vec<Token>,
}

/// Result of tokenizing one cell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexedSource {
    pub lines: Vec<LogicalLine>,
    /// Physical lines holding IPython line magics or shell escapes
    pub magic_lines: BTreeSet<usize>,
    /// Physical lines that begin inside a multi-line string
    pub string_lines: BTreeSet<usize>,
    /// The whole cell is a cell magic (`%%...`) and is not Python
    pub opaque: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    /// Zero-based physical line
    pub line: usize,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line + 1, self.message)
    }
}

impl std::error::Error for LexError {}

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

const OPS_3: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];

const OPS_2: &[&str] = &[
    "->", ":=", "==", "!=", "<=", ">=", "**", "//", "<<", ">>", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];

fn is_name_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_name_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    brackets: Vec<(char, usize)>,
    out: LexedSource,
    current: Option<LogicalLine>,
}

/// Tokenize a cell of Python source
pub fn tokenize(source: &str) -> Result<LexedSource, LexError> {
    let normalized = source.replace("\r\n", "\n");

    if normalized.trim_start().starts_with("%%") {
        let mut out = LexedSource {
            opaque: true,
            ..Default::default()
        };
        out.magic_lines = (0..normalized.lines().count()).collect();
        return Ok(out);
    }

    let mut lexer = Lexer {
        chars: normalized.chars().collect(),
        pos: 0,
        line: 0,
        brackets: Vec::new(),
        out: LexedSource::default(),
        current: None,
    };
    lexer.run()?;
    Ok(lexer.out)
}

/// Tokenize a single expression (e.g. an f-string field) into a flat token list
pub fn tokenize_expression(source: &str) -> Result<Vec<Token>, LexError> {
    // Parenthesize so newlines inside the field never end the statement
    let lexed = tokenize(&format!("({}\n)", source))?;
    Ok(lexed.lines.into_iter().flat_map(|l| l.tokens).collect())
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: &str) -> LexError {
        LexError {
            line: self.line,
            message: message.to_string(),
        }
    }

    fn push(&mut self, token: Token) {
        if let Some(current) = self.current.as_mut() {
            current.tokens.push(token);
        }
    }

    fn finish_line(&mut self) {
        if let Some(line) = self.current.take() {
            if !line.tokens.is_empty() {
                self.out.lines.push(line);
            }
        }
    }

    fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn run(&mut self) -> Result<(), LexError> {
        while self.pos < self.chars.len() {
            if self.current.is_none() {
                if !self.start_line() {
                    continue;
                }
            }

            let c = self.chars[self.pos];
            match c {
                ' ' | '\t' | '\x0c' | '\r' => self.pos += 1,
                '\n' => {
                    self.pos += 1;
                    self.line += 1;
                    if self.brackets.is_empty() {
                        self.finish_line();
                    }
                }
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => self.skip_to_eol(),
                '"' | '\'' => self.lex_string(self.pos)?,
                c if is_name_start(c) => self.lex_name()?,
                c if c.is_ascii_digit() => self.lex_number(),
                '.' if self.peek(1).map_or(false, |n| n.is_ascii_digit()) => self.lex_number(),
                '(' | '[' | '{' => {
                    self.brackets.push((c, self.line));
                    self.pos += 1;
                    self.push(Token::new(TokenKind::Op, c.to_string()));
                }
                ')' | ']' | '}' => {
                    match self.brackets.pop() {
                        Some((open, _)) if closing_for(open) == c => {}
                        _ => return Err(self.error(&format!("unmatched '{}'", c))),
                    }
                    self.pos += 1;
                    self.push(Token::new(TokenKind::Op, c.to_string()));
                }
                _ => self.lex_op(),
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(LexError {
                line: *line,
                message: format!("'{}' was never closed", open),
            });
        }
        self.finish_line();
        Ok(())
    }

    /// Handle the start of a physical line outside any bracket. Returns true
    /// when a new logical line was opened at `self.pos`.
    fn start_line(&mut self) -> bool {
        let mut indent = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => indent += 1,
                '\t' => indent += 8 - indent % 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek(0) {
            None => false,
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                false
            }
            Some('#') => {
                self.skip_to_eol();
                false
            }
            Some('%') | Some('!') => {
                self.out.magic_lines.insert(self.line);
                self.skip_to_eol();
                false
            }
            Some(_) => {
                self.current = Some(LogicalLine {
                    indent,
                    line: self.line,
                    tokens: Vec::new(),
                });
                true
            }
        }
    }

    fn lex_name(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        while self.peek(0).map_or(false, is_name_char) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(0), Some('"') | Some('\''))
            && STRING_PREFIXES.contains(&text.to_ascii_lowercase().as_str())
        {
            self.pos = start;
            return self.lex_string(start);
        }

        self.push(Token::new(TokenKind::Name, text));
        Ok(())
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let is_hex = self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X'));
        while let Some(c) = self.peek(0) {
            let exponent_sign = (c == '+' || c == '-')
                && !is_hex
                && matches!(self.chars.get(self.pos - 1), Some('e') | Some('E'));
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.chars[start..self.pos].iter().collect();
        self.push(Token::new(TokenKind::Number, text));
    }

    fn lex_op(&mut self) {
        for width in [3, 2] {
            if self.pos + width <= self.chars.len() {
                let candidate: String = self.chars[self.pos..self.pos + width].iter().collect();
                let table = if width == 3 { OPS_3 } else { OPS_2 };
                if table.contains(&candidate.as_str()) {
                    self.pos += width;
                    self.push(Token::new(TokenKind::Op, candidate));
                    return;
                }
            }
        }
        let c = self.chars[self.pos];
        self.pos += 1;
        self.push(Token::new(TokenKind::Op, c.to_string()));
    }

    fn lex_string(&mut self, start: usize) -> Result<(), LexError> {
        while self.peek(0).map_or(false, |c| c != '"' && c != '\'') {
            self.pos += 1;
        }
        let prefix: String = self.chars[start..self.pos].iter().collect();
        let quote = self.chars[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        let start_line = self.line;

        self.pos += if triple { 3 } else { 1 };
        let body_start = self.pos;
        let body_end;

        loop {
            let c = match self.peek(0) {
                Some(c) => c,
                None => {
                    return Err(LexError {
                        line: start_line,
                        message: if triple {
                            "unterminated triple-quoted string literal".to_string()
                        } else {
                            "unterminated string literal".to_string()
                        },
                    })
                }
            };

            match c {
                '\\' => {
                    if self.peek(1) == Some('\n') {
                        self.line += 1;
                        self.out.string_lines.insert(self.line);
                    }
                    self.pos += 2;
                }
                '\n' if !triple => {
                    return Err(LexError {
                        line: start_line,
                        message: "unterminated string literal".to_string(),
                    })
                }
                '\n' => {
                    self.line += 1;
                    self.out.string_lines.insert(self.line);
                    self.pos += 1;
                }
                c if c == quote
                    && (!triple
                        || (self.peek(1) == Some(quote) && self.peek(2) == Some(quote))) =>
                {
                    body_end = self.pos;
                    self.pos += if triple { 3 } else { 1 };
                    break;
                }
                _ => self.pos += 1,
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let mut token = Token::new(TokenKind::Str, text);
        if prefix.to_ascii_lowercase().contains('f') {
            let body: String = self.chars[body_start..body_end].iter().collect();
            token.fields = fstring_fields(&body);
        }
        self.push(token);
        Ok(())
    }
}

/// Extract the expression source of every replacement field of an f-string
/// body, including fields nested in format specs
pub fn fstring_fields(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut fields = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => i += 2,
            '{' => {
                let start = i + 1;
                let mut j = start;
                let mut depth = 0usize;
                let mut expr_end: Option<usize> = None;
                let mut spec_start: Option<usize> = None;

                while j < chars.len() {
                    let c = chars[j];
                    match c {
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' => depth = depth.saturating_sub(1),
                        '}' if depth == 0 => break,
                        '}' => depth -= 1,
                        '\'' | '"' if expr_end.is_none() => {
                            j += 1;
                            while j < chars.len() && chars[j] != c {
                                j += 1;
                            }
                        }
                        '!' if depth == 0
                            && expr_end.is_none()
                            && chars.get(j + 1) != Some(&'=') =>
                        {
                            expr_end = Some(j);
                        }
                        ':' if depth == 0 && spec_start.is_none() => {
                            expr_end.get_or_insert(j);
                            spec_start = Some(j + 1);
                        }
                        _ => {}
                    }
                    j += 1;
                }

                let end = expr_end.unwrap_or(j).min(chars.len());
                let expr: String = chars[start..end].iter().collect();
                let expr = expr.trim().trim_end_matches('=').trim().to_string();
                if !expr.is_empty() {
                    fields.push(expr);
                }
                if let Some(spec) = spec_start {
                    let spec_text: String = chars[spec.min(j)..j.min(chars.len())].iter().collect();
                    fields.extend(fstring_fields(&spec_text));
                }
                i = j + 1;
            }
            _ => i += 1,
        }
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &LogicalLine) -> Vec<&str> {
        line.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_simple_statements() {
        let lexed = tokenize("x = 1\ny = x + 2.5e-3\n").unwrap();
        assert_eq!(lexed.lines.len(), 2);
        assert_eq!(texts(&lexed.lines[0]), vec!["x", "=", "1"]);
        assert_eq!(texts(&lexed.lines[1]), vec!["y", "=", "x", "+", "2.5e-3"]);
        assert_eq!(lexed.lines[1].line, 1);
    }

    #[test]
    fn test_brackets_join_lines() {
        let lexed = tokenize("total = sum([\n    a,\n    b,\n])\nprint(total)").unwrap();
        assert_eq!(lexed.lines.len(), 2);
        assert_eq!(lexed.lines[1].line, 4);
    }

    #[test]
    fn test_backslash_continuation() {
        let lexed = tokenize("x = a + \\\n    b\n").unwrap();
        assert_eq!(lexed.lines.len(), 1);
        assert_eq!(texts(&lexed.lines[0]), vec!["x", "=", "a", "+", "b"]);
    }

    #[test]
    fn test_indentation_and_comments() {
        let lexed = tokenize("for i in r:  # loop\n    # note\n    total += i\n").unwrap();
        assert_eq!(lexed.lines.len(), 2);
        assert_eq!(lexed.lines[0].indent, 0);
        assert_eq!(lexed.lines[1].indent, 4);
        assert_eq!(texts(&lexed.lines[1]), vec!["total", "+=", "i"]);
    }

    #[test]
    fn test_strings_are_single_tokens() {
        let lexed = tokenize("s = 'a # not comment'\nt = r\"\\d+\"\nu = b'x'").unwrap();
        assert_eq!(lexed.lines[0].tokens[2].kind, TokenKind::Str);
        assert_eq!(lexed.lines[1].tokens[2].text, "r\"\\d+\"");
        assert_eq!(lexed.lines[2].tokens.len(), 3);
    }

    #[test]
    fn test_triple_quoted_string_lines() {
        let lexed = tokenize("doc = \"\"\"first\nsecond\nthird\"\"\"\nx = 1").unwrap();
        assert_eq!(lexed.lines.len(), 2);
        assert_eq!(lexed.string_lines, [1, 2].into_iter().collect());
        assert_eq!(lexed.lines[1].line, 3);
    }

    #[test]
    fn test_magics_are_set_aside() {
        let lexed = tokenize("%matplotlib inline\n!pip install x\nx = 1").unwrap();
        assert_eq!(lexed.lines.len(), 1);
        assert_eq!(lexed.magic_lines, [0, 1].into_iter().collect());
    }

    #[test]
    fn test_cell_magic_is_opaque() {
        let lexed = tokenize("%%bash\necho hi\n").unwrap();
        assert!(lexed.opaque);
        assert!(lexed.lines.is_empty());
    }

    #[test]
    fn test_fstring_fields() {
        let lexed = tokenize("msg = f'{name!r} has {count:>{width}} items {{literal}}'").unwrap();
        let token = &lexed.lines[0].tokens[2];
        assert_eq!(token.kind, TokenKind::Str);
        assert_eq!(token.fields, vec!["name", "count", "width"]);
    }

    #[test]
    fn test_fstring_self_documenting_and_comparison() {
        assert_eq!(fstring_fields("{x=}"), vec!["x"]);
        assert_eq!(fstring_fields("{a != b}"), vec!["a != b"]);
        assert_eq!(fstring_fields("{d['k']}"), vec!["d['k']"]);
    }

    #[test]
    fn test_operators() {
        let lexed = tokenize("x **= 2\nif (n := 3) >= 2: pass").unwrap();
        assert_eq!(texts(&lexed.lines[0]), vec!["x", "**=", "2"]);
        assert!(lexed.lines[1].tokens.iter().any(|t| t.is_op(":=")));
        assert!(lexed.lines[1].tokens.iter().any(|t| t.is_op(">=")));
    }

    #[test]
    fn test_errors() {
        assert_eq!(tokenize("x = (1, 2").unwrap_err().line, 0);
        assert!(tokenize("x = 1)").is_err());
        assert!(tokenize("s = '''never closed").is_err());
        assert!(tokenize("s = 'open\nx = 1").is_err());
    }

    #[test]
    fn test_tokenize_expression() {
        let tokens = tokenize_expression("a +\n b").unwrap();
        let names: Vec<_> = tokens.iter().filter(|t| t.is_name()).map(|t| t.text.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
