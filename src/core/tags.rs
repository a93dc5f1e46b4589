//! Cell tag grammar
//!
//! Tags are parsed once into [`CellRole`]; nothing past the parser looks at
//! raw tag strings.

use crate::core::error::{CompileError, CompileResult};
use regex::Regex;
use std::sync::OnceLock;

/// Identifiers the generated script defines itself
pub const RESERVED_STEP_NAMES: &[&str] = &["pipeline_metrics", "auto_generated_pipeline"];

pub const PARAMETERS_TAG: &str = "pipeline-parameters";
pub const METRICS_TAG: &str = "pipeline-metrics";
pub const SKIP_TAG: &str = "skip";

/// A single recognized tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    /// `block:<name>`
    Block(String),
    /// `prev:<name>`
    Prev(String),
    /// `pipeline-parameters`
    Parameters,
    /// `pipeline-metrics`
    Metrics,
    /// `imports`
    Imports,
    /// `functions`
    Functions,
    /// `skip`
    Skip,
}

/// What a cell contributes to the pipeline, after validating all its tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellRole {
    /// Excluded entirely
    Skip,
    /// The pipeline parameters block
    Parameters,
    /// The pipeline metrics block
    Metrics,
    /// Prepended to every step
    Prelude,
    /// Opens (or continues) a named step
    Block { name: String, prev: Vec<String> },
    /// No block tag: goes wherever the untagged-cell policy says
    Untagged { prev: Vec<String> },
}

fn step_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid regex"))
}

/// Parse one tag string
pub fn parse_tag(cell: usize, raw: &str) -> CompileResult<Tag> {
    let tag = raw.trim();
    let invalid = |reason: &str| CompileError::TagGrammar {
        cell,
        tag: raw.to_string(),
        reason: reason.to_string(),
    };

    if let Some((kind, name)) = tag.split_once(':') {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("missing step name"));
        }
        validate_step_name(name).map_err(|reason| invalid(&reason))?;
        return match kind.trim() {
            "block" => Ok(Tag::Block(name.to_string())),
            "prev" => Ok(Tag::Prev(name.to_string())),
            _ => Err(invalid("unknown tag kind, expected 'block' or 'prev'")),
        };
    }

    match tag {
        PARAMETERS_TAG => Ok(Tag::Parameters),
        METRICS_TAG => Ok(Tag::Metrics),
        "imports" => Ok(Tag::Imports),
        "functions" => Ok(Tag::Functions),
        SKIP_TAG => Ok(Tag::Skip),
        _ => Err(invalid("unrecognized tag")),
    }
}

/// Check that a step name can become a Python identifier in the generated code
pub fn validate_step_name(name: &str) -> Result<(), String> {
    if !step_name_regex().is_match(name) {
        return Err(format!(
            "step name '{}' must match [a-z_][a-z0-9_]*",
            name
        ));
    }
    if crate::analysis::builtins::is_keyword(name) {
        return Err(format!("step name '{}' is a Python keyword", name));
    }
    if RESERVED_STEP_NAMES.contains(&name) {
        return Err(format!("step name '{}' is reserved", name));
    }
    Ok(())
}

/// Resolve the tags of a cell into its role
pub fn classify_cell(cell: usize, tags: &[&str]) -> CompileResult<CellRole> {
    let parsed = tags
        .iter()
        .map(|t| parse_tag(cell, t))
        .collect::<CompileResult<Vec<_>>>()?;

    if parsed.contains(&Tag::Skip) {
        return Ok(CellRole::Skip);
    }

    let mut block: Option<String> = None;
    let mut prev = Vec::new();
    let mut special: Option<(CellRole, &str)> = None;

    for (tag, raw) in parsed.into_iter().zip(tags.iter()) {
        let role = match tag {
            Tag::Block(name) => {
                if let Some(existing) = &block {
                    return Err(CompileError::TagGrammar {
                        cell,
                        tag: raw.to_string(),
                        reason: format!("cell already belongs to block '{}'", existing),
                    });
                }
                block = Some(name);
                continue;
            }
            Tag::Prev(name) => {
                if !prev.contains(&name) {
                    prev.push(name);
                }
                continue;
            }
            Tag::Parameters => CellRole::Parameters,
            Tag::Metrics => CellRole::Metrics,
            Tag::Imports | Tag::Functions => CellRole::Prelude,
            Tag::Skip => unreachable!("skip handled above"),
        };
        if let Some((existing, _)) = &special {
            if *existing != role {
                return Err(CompileError::TagGrammar {
                    cell,
                    tag: raw.to_string(),
                    reason: "cell mixes incompatible roles".to_string(),
                });
            }
        }
        special = Some((role, *raw));
    }

    match (special, block) {
        (Some((_, raw)), Some(_)) => Err(CompileError::TagGrammar {
            cell,
            tag: raw.to_string(),
            reason: "a block cell cannot also be a parameters, metrics or prelude cell"
                .to_string(),
        }),
        (Some((_, raw)), None) if !prev.is_empty() => Err(CompileError::TagGrammar {
            cell,
            tag: raw.to_string(),
            reason: "prev tags are only allowed on step cells".to_string(),
        }),
        (Some((role, _)), None) => Ok(role),
        (None, Some(name)) => Ok(CellRole::Block { name, prev }),
        (None, None) => Ok(CellRole::Untagged { prev }),
    }
}
