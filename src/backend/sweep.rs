//! Parameter sweeps - one notebook per combination of parameter values

use crate::core::notebook::{Cell, Notebook};
use crate::core::parameters::ParamValue;
use crate::core::tags::{PARAMETERS_TAG, SKIP_TAG};
use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::collections::HashSet;
use std::path::Path;

/// A notebook with one combination of sweep values applied
#[derive(Debug, Clone)]
pub struct ExpandedDocument {
    pub notebook: Notebook,
    /// Appended to pipeline and experiment names, e.g. `-n-5-lr-0-1`
    pub suffix: String,
    pub overrides: Vec<(String, ParamValue)>,
}

/// Parameter axes read from a YAML mapping of name to value or list of values
#[derive(Debug, Clone, PartialEq)]
pub struct SweepExpander {
    axes: IndexMap<String, Vec<ParamValue>>,
}

impl SweepExpander {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sweep file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: IndexMap<String, Value> = serde_yaml::from_str(yaml)?;
        if raw.is_empty() {
            bail!("Sweep file defines no parameters");
        }

        let mut axes = IndexMap::new();
        for (name, value) in raw {
            if !is_identifier(&name) {
                bail!("Sweep parameter '{}' is not a valid Python identifier", name);
            }
            let values = match value {
                Value::Sequence(items) => items
                    .into_iter()
                    .map(|item| scalar(&name, item))
                    .collect::<Result<Vec<_>>>()?,
                other => vec![scalar(&name, other)?],
            };
            if values.is_empty() {
                bail!("Sweep parameter '{}' has no values", name);
            }
            axes.insert(name, values);
        }
        Ok(Self { axes })
    }

    /// Number of documents `expand` produces
    pub fn combinations(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    /// Cartesian product of all axes, first axis varying slowest
    pub fn expand(&self, notebook: &Notebook) -> Vec<ExpandedDocument> {
        let mut combos: Vec<Vec<(String, ParamValue)>> = vec![Vec::new()];
        for (name, values) in &self.axes {
            combos = combos
                .into_iter()
                .flat_map(|combo| {
                    values.iter().map(move |value| {
                        let mut next = combo.clone();
                        next.push((name.clone(), value.clone()));
                        next
                    })
                })
                .collect();
        }

        let mut taken = HashSet::new();
        combos
            .into_iter()
            .map(|overrides| ExpandedDocument {
                notebook: apply_overrides(notebook, &overrides),
                suffix: unique_suffix(suffix(&overrides), &mut taken),
                overrides,
            })
            .collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn scalar(name: &str, value: Value) -> Result<ParamValue> {
    match value {
        Value::Bool(b) => Ok(ParamValue::Bool(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(ParamValue::Int(i)),
            None => n
                .as_f64()
                .map(ParamValue::Float)
                .with_context(|| format!("Sweep value for '{}' is out of range", name)),
        },
        Value::String(s) => Ok(ParamValue::Str(s)),
        _ => bail!("Sweep values for '{}' must be scalars", name),
    }
}

/// Append assignments to the parameters cell, creating one if needed
fn apply_overrides(notebook: &Notebook, overrides: &[(String, ParamValue)]) -> Notebook {
    let assignments: Vec<String> = overrides
        .iter()
        .map(|(name, value)| format!("{} = {}", name, value.to_python()))
        .collect();
    let block = assignments.join("\n");

    let mut notebook = notebook.clone();
    let target = notebook.cells.iter_mut().find(|cell| {
        let tags = cell.tags();
        cell.is_code() && tags.contains(&PARAMETERS_TAG) && !tags.contains(&SKIP_TAG)
    });

    match target {
        Some(cell) => {
            if !cell.source.is_empty() && !cell.source.ends_with('\n') {
                cell.source.push('\n');
            }
            cell.source.push_str(&block);
        }
        None => notebook.cells.insert(0, Cell::code(&block, &[PARAMETERS_TAG])),
    }
    notebook
}

fn sanitize(text: &str) -> String {
    let mapped: String = text
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect();
    match mapped.trim_matches('-') {
        "" => "empty".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn suffix(overrides: &[(String, ParamValue)]) -> String {
    overrides
        .iter()
        .map(|(name, value)| format!("-{}-{}", sanitize(name), sanitize(&value.to_string())))
        .collect()
}

/// Values that sanitize alike get `-2`, `-3`, ... in expansion order
fn unique_suffix(base: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notebook() -> Notebook {
        Notebook::new(vec![
            Cell::code("n = 1\nlr = 0.01", &[PARAMETERS_TAG]),
            Cell::code("x = n * lr", &["block:a"]),
        ])
    }

    #[test]
    fn test_cartesian_product_in_key_order() {
        let sweep = SweepExpander::from_yaml("n: [1, 2]\nlr: 0.5\nmode: [fast, Slow_Mode]\n").unwrap();
        assert_eq!(sweep.combinations(), 4);

        let docs = sweep.expand(&notebook());
        let suffixes: Vec<_> = docs.iter().map(|d| d.suffix.as_str()).collect();
        assert_eq!(
            suffixes,
            vec![
                "-n-1-lr-0-5-mode-fast",
                "-n-1-lr-0-5-mode-slow-mode",
                "-n-2-lr-0-5-mode-fast",
                "-n-2-lr-0-5-mode-slow-mode",
            ]
        );
    }

    #[test]
    fn test_overrides_appended_to_parameters_cell() {
        let sweep = SweepExpander::from_yaml("n: 7").unwrap();
        let docs = sweep.expand(&notebook());
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].notebook.cells[0].source, "n = 1\nlr = 0.01\nn = 7");
        assert_eq!(docs[0].notebook.cells.len(), 2);
    }

    #[test]
    fn test_parameters_cell_created_when_missing() {
        let nb = Notebook::new(vec![Cell::code("x = 1", &["block:a"])]);
        let docs = SweepExpander::from_yaml("name: run").unwrap().expand(&nb);
        let cell = &docs[0].notebook.cells[0];
        assert_eq!(cell.source, "name = 'run'");
        assert_eq!(cell.tags(), vec![PARAMETERS_TAG]);
    }

    #[test]
    fn test_suffixes_stay_distinct() {
        let sweep = SweepExpander::from_yaml("v: ['a b', a-b, A_B]").unwrap();
        let suffixes: Vec<_> = sweep.expand(&notebook()).into_iter().map(|d| d.suffix).collect();
        assert_eq!(suffixes, vec!["-v-a-b", "-v-a-b-2", "-v-a-b-3"]);
    }

    #[test]
    fn test_empty_value_suffix_has_no_dangling_dash() {
        let sweep = SweepExpander::from_yaml("v: ['', '!!']\nn: 1").unwrap();
        let suffixes: Vec<_> = sweep.expand(&notebook()).into_iter().map(|d| d.suffix).collect();
        assert_eq!(suffixes, vec!["-v-empty-n-1", "-v-empty-n-1-2"]);
        assert!(suffixes.iter().all(|s| !s.ends_with('-') && !s.contains("--")));
    }

    #[test]
    fn test_invalid_sweeps() {
        assert!(SweepExpander::from_yaml("{}").is_err());
        assert!(SweepExpander::from_yaml("n: []").is_err());
        assert!(SweepExpander::from_yaml("n: [[1]]").is_err());
        assert!(SweepExpander::from_yaml("n: ~").is_err());
        assert!(SweepExpander::from_yaml("2bad: 1").is_err());
    }
}
