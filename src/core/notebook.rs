//! Notebook document model (nbformat v4)

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Metadata key holding pipeline settings embedded in the notebook
pub const NOTEBOOK_METADATA_KEY: &str = "kubeflow_notebook";

/// A notebook as an ordered sequence of cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<Cell>,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default = "default_nbformat")]
    pub nbformat: u32,

    #[serde(default)]
    pub nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    4
}

/// Kind of a notebook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

/// A single notebook cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,

    #[serde(deserialize_with = "multiline_source")]
    pub source: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Everything else (outputs, execution_count, id) is carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// nbformat stores sources either as one string or as a list of lines
fn multiline_source<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Source {
        Text(String),
        Lines(Vec<String>),
    }

    Ok(match Source::deserialize(deserializer)? {
        Source::Text(text) => text,
        Source::Lines(lines) => lines.concat(),
    })
}

impl Cell {
    /// Create a code cell with the given tags
    pub fn code(source: &str, tags: &[&str]) -> Self {
        let mut metadata = Map::new();
        if !tags.is_empty() {
            metadata.insert(
                "tags".to_string(),
                Value::Array(tags.iter().map(|t| Value::String(t.to_string())).collect()),
            );
        }
        Self {
            cell_type: CellType::Code,
            source: source.to_string(),
            metadata,
            extra: Map::new(),
        }
    }

    /// Create a markdown cell
    pub fn markdown(source: &str) -> Self {
        Self {
            cell_type: CellType::Markdown,
            source: source.to_string(),
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Tags attached to the cell, in order
    pub fn tags(&self) -> Vec<&str> {
        self.metadata
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|tags| tags.iter().filter_map(|t| t.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn is_code(&self) -> bool {
        self.cell_type == CellType::Code
    }

    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}

impl Notebook {
    /// Build a notebook from cells
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            metadata: Map::new(),
            nbformat: 4,
            nbformat_minor: 2,
        }
    }

    /// Load a notebook from an `.ipynb` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read notebook {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse notebook {}", path.display()))
    }

    /// Parse a notebook from its JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let notebook: Notebook = serde_json::from_str(json)?;
        if notebook.nbformat < 4 {
            anyhow::bail!("Unsupported notebook format version {}", notebook.nbformat);
        }
        Ok(notebook)
    }

    /// Serialize back to nbformat JSON
    pub fn to_json(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        // Sources are written back as line lists, like Jupyter does
        if let Some(cells) = value.get_mut("cells").and_then(|c| c.as_array_mut()) {
            for cell in cells {
                if let Some(source) = cell.get("source").and_then(|s| s.as_str()).map(str::to_string) {
                    let lines: Vec<Value> = source
                        .split_inclusive('\n')
                        .map(|l| Value::String(l.to_string()))
                        .collect();
                    cell["source"] = Value::Array(lines);
                }
            }
        }
        Ok(serde_json::to_string_pretty(&value)?)
    }

    /// Pipeline settings embedded in the notebook metadata
    pub fn pipeline_metadata(&self) -> Option<&Value> {
        self.metadata.get(NOTEBOOK_METADATA_KEY)
    }
}
