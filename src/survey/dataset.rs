//! The original respondent dataset.
//!
//! Respondents are read from a JSON array of objects or from JSON Lines, one
//! object per respondent. Object keys are positional: when a row has exactly
//! as many cells as the schema has questions, its headers are replaced by the
//! schema's column labels, in order.

use std::path::Path;

use serde_json::{Map, Value};

use super::column::ColumnKey;
use super::record::value_to_text;
use crate::error::SchemaError;
use crate::schema::QuestionSchema;

/// Respondent answers aligned with the schema's column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyDataset {
    columns: Vec<ColumnKey>,
    rows: Vec<Vec<String>>,
}

impl SurveyDataset {
    /// Builds a dataset from rows already in schema column order.
    pub fn from_rows(schema: &QuestionSchema, rows: Vec<Vec<String>>) -> Result<Self, SchemaError> {
        let columns: Vec<ColumnKey> = schema
            .questions()
            .iter()
            .map(|q| ColumnKey::new(q.column_label.clone()))
            .collect();

        if let Some(bad) = rows.iter().find(|row| row.len() != columns.len()) {
            return Err(SchemaError::ColumnCountMismatch {
                schema: columns.len(),
                data: bad.len(),
            });
        }

        let rows = rows
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Ok(Self { columns, rows })
    }

    /// Loads the dataset file and conforms it to the schema.
    pub fn load(path: &Path, schema: &QuestionSchema) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        let objects = parse_objects(&content)?;
        let rows = objects
            .iter()
            .map(|object| object.values().map(value_to_text).collect())
            .collect();
        let dataset = Self::from_rows(schema, rows)?;

        tracing::info!(
            path = %path.display(),
            respondents = dataset.len(),
            columns = dataset.columns.len(),
            "Survey dataset loaded"
        );
        Ok(dataset)
    }

    /// Column keys in schema order.
    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    /// Respondent rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of respondents.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no respondents remain after cleaning.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All answers given to one question, in respondent order.
    pub fn column_values(&self, question: u32) -> Vec<&str> {
        match self.columns.iter().position(|c| c.is_question(question)) {
            Some(idx) => self.rows.iter().map(|row| row[idx].as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Renders a respondent as `label: answer` lines.
    pub fn describe_row(&self, index: usize) -> Option<String> {
        self.rows.get(index).map(|row| {
            self.columns
                .iter()
                .zip(row)
                .map(|(column, value)| format!("{}: {}", column.label(), value))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }
}

fn parse_objects(content: &str) -> Result<Vec<Map<String, Value>>, SchemaError> {
    let trimmed = content.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut objects = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line)? {
            Value::Object(object) => objects.push(object),
            other => {
                return Err(SchemaError::MalformedData(format!(
                    "line {} is not a JSON object: {}",
                    idx + 1,
                    other
                )))
            }
        }
    }
    Ok(objects)
}
