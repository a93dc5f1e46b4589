//! Parameter and metrics cell extraction

use crate::analysis::lexer::{tokenize, LogicalLine, Token, TokenKind};
use crate::core::error::{CompileError, CompileResult};
use crate::core::parameters::{ParamValue, ParameterSet};
use indexmap::IndexMap;

/// Read `name = literal` assignments from the pipeline-parameters cell
pub fn extract_parameters(source: &str) -> CompileResult<ParameterSet> {
    let lexed = tokenize(source).map_err(|e| CompileError::NonLiteralParameter {
        line: e.line + 1,
        source_line: physical_line(source, e.line),
    })?;

    let mut params = ParameterSet::new();
    for line in &lexed.lines {
        let line_no = line.line + 1;
        let source_line = physical_line(source, line.line);
        let reject = |rejection: Rejection| match rejection {
            Rejection::NotLiteral => CompileError::NonLiteralParameter {
                line: line_no,
                source_line: source_line.clone(),
            },
            Rejection::OutOfRange => CompileError::ParameterOutOfRange {
                line: line_no,
                source_line: source_line.clone(),
            },
        };

        match line.tokens.as_slice() {
            [name, eq, value @ ..] if name.is_name() && eq.is_op("=") => {
                if crate::analysis::builtins::is_keyword(&name.text) {
                    return Err(reject(Rejection::NotLiteral));
                }
                let value = parse_literal(value).map_err(reject)?;
                params.insert(&name.text, value);
            }
            _ => return Err(reject(Rejection::NotLiteral)),
        }
    }
    Ok(params)
}

/// Why a parameter value was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NotLiteral,
    /// An integer literal outside the 64-bit range
    OutOfRange,
}

/// Read `print(name)` statements from the pipeline-metrics cell, keyed by
/// the metric name shown in the pipeline UI
pub fn extract_metrics(source: &str) -> CompileResult<IndexMap<String, String>> {
    let lexed = tokenize(source).map_err(|e| CompileError::Metrics {
        line: e.line + 1,
        source_line: physical_line(source, e.line),
    })?;

    let mut metrics = IndexMap::new();
    for line in &lexed.lines {
        let variable = metric_variable(line).ok_or_else(|| CompileError::Metrics {
            line: line.line + 1,
            source_line: physical_line(source, line.line),
        })?;
        metrics.insert(variable.replace('_', "-"), variable);
    }
    Ok(metrics)
}

fn metric_variable(line: &LogicalLine) -> Option<String> {
    match line.tokens.as_slice() {
        [print, open, name, close]
            if print.is_keyword("print")
                && open.is_op("(")
                && name.is_name()
                && close.is_op(")")
                && !crate::analysis::builtins::is_excluded(&name.text) =>
        {
            Some(name.text.clone())
        }
        _ => None,
    }
}

fn physical_line(source: &str, line: usize) -> String {
    source.lines().nth(line).unwrap_or_default().trim().to_string()
}

fn parse_literal(tokens: &[Token]) -> Result<ParamValue, Rejection> {
    match tokens {
        [t] if t.is_keyword("True") => Ok(ParamValue::Bool(true)),
        [t] if t.is_keyword("False") => Ok(ParamValue::Bool(false)),
        [t] if t.kind == TokenKind::Number => parse_number(&t.text, false),
        [minus, t] if minus.is_op("-") && t.kind == TokenKind::Number => parse_number(&t.text, true),
        [first, ..] if first.kind == TokenKind::Str => {
            // Adjacent literals concatenate
            let mut out = String::new();
            for token in tokens {
                if token.kind != TokenKind::Str {
                    return Err(Rejection::NotLiteral);
                }
                out.push_str(&parse_string(&token.text).ok_or(Rejection::NotLiteral)?);
            }
            Ok(ParamValue::Str(out))
        }
        _ => Err(Rejection::NotLiteral),
    }
}

fn parse_number(text: &str, negative: bool) -> Result<ParamValue, Rejection> {
    use std::num::IntErrorKind;

    let clean = text.replace('_', "");
    let lower = clean.to_ascii_lowercase();

    if lower.ends_with('j') {
        return Err(Rejection::NotLiteral);
    }
    if !lower.starts_with("0x") && (lower.contains('.') || lower.contains('e')) {
        let value: f64 = lower.parse().map_err(|_| Rejection::NotLiteral)?;
        return Ok(ParamValue::Float(if negative { -value } else { value }));
    }

    let (digits, radix) = match lower.get(..2) {
        Some("0x") => (&lower[2..], 16),
        Some("0o") => (&lower[2..], 8),
        Some("0b") => (&lower[2..], 2),
        _ => (lower.as_str(), 10),
    };
    // Parse with the sign attached so the most negative value fits
    let signed = if negative { format!("-{}", digits) } else { digits.to_string() };
    i64::from_str_radix(&signed, radix)
        .map(ParamValue::Int)
        .map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Rejection::OutOfRange,
            _ => Rejection::NotLiteral,
        })
}

/// Decode a string literal token; byte and f-strings are not accepted
fn parse_string(text: &str) -> Option<String> {
    let quote_pos = text.find(|c| c == '"' || c == '\'')?;
    let prefix = text[..quote_pos].to_ascii_lowercase();
    if prefix.contains('b') || prefix.contains('f') {
        return None;
    }

    let rest = &text[quote_pos..];
    let quote_len = if rest.starts_with("\"\"\"") || rest.starts_with("'''") {
        3
    } else {
        1
    };
    let body = rest.get(quote_len..rest.len().checked_sub(quote_len)?)?;

    if prefix.contains('r') {
        Some(body.to_string())
    } else {
        Some(unescape(body))
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            'x' | 'u' | 'U' => {
                let width = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = (0..width).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push(esc);
                        out.push_str(&digits);
                    }
                }
            }
            '0'..='7' => {
                let mut digits = esc.to_string();
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if let Some(decoded) = u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    out.push(decoded);
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
