//! Respondent records: one standardized questionnaire.

use serde_json::{Map, Value};

use super::column::{ColumnKey, CLUSTER_COLUMN, PROVENANCE_COLUMN, SOURCE_SEQ_COLUMN};

/// The sentinel answer for a skipped question.
///
/// Every component compares against this exact value; substituting another
/// representation anywhere breaks skip-logic consistency.
pub const SKIP: &str = "(跳过)";

/// One answer cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Column this answer belongs to.
    pub column: ColumnKey,
    /// Answer string: letter code, letter combination, `1`..`7`, or [`SKIP`].
    pub value: String,
}

impl Answer {
    /// Creates an answer cell.
    pub fn new(column: impl Into<ColumnKey>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// True when the cell holds the skip sentinel.
    pub fn is_skipped(&self) -> bool {
        self.value == SKIP
    }
}

/// A standardized respondent record with synthesis metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondentRecord {
    answers: Vec<Answer>,
    cluster_id: String,
    source_seq: u64,
    provenance: Option<String>,
}

impl RespondentRecord {
    /// Creates a record from answers in column order.
    pub fn new(answers: Vec<Answer>, cluster_id: impl Into<String>, source_seq: u64) -> Self {
        Self {
            answers,
            cluster_id: cluster_id.into(),
            source_seq,
            provenance: None,
        }
    }

    /// Answers in column order.
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Mutable access to the answers.
    pub fn answers_mut(&mut self) -> &mut [Answer] {
        &mut self.answers
    }

    /// Cluster identifier.
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Run-wide 1-based sequence number.
    pub fn source_seq(&self) -> u64 {
        self.source_seq
    }

    /// Jitter provenance annotation, if any.
    pub fn provenance(&self) -> Option<&str> {
        self.provenance.as_deref()
    }

    /// Answer of the first column belonging to `question`.
    pub fn answer(&self, question: u32) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.column.is_question(question))
            .map(|a| a.value.as_str())
    }

    /// Answer stored under an exact column label.
    pub fn answer_by_label(&self, label: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.column.label() == label)
            .map(|a| a.value.as_str())
    }

    /// Sets every column belonging to `question` to `value`.
    ///
    /// Returns the number of cells written.
    pub fn set_answer(&mut self, question: u32, value: &str) -> usize {
        let mut written = 0;
        for answer in self
            .answers
            .iter_mut()
            .filter(|a| a.column.is_question(question))
        {
            answer.value = value.to_string();
            written += 1;
        }
        written
    }

    /// Sets every column whose question number falls in `range` to [`SKIP`].
    pub fn skip_range(&mut self, range: std::ops::RangeInclusive<u32>) {
        for answer in self.answers.iter_mut() {
            if answer.column.question().is_some_and(|q| range.contains(&q)) {
                answer.value = SKIP.to_string();
            }
        }
    }

    /// Appends a provenance fragment.
    ///
    /// The first fragment is prefixed with the source record it derives from;
    /// later fragments are joined with `; `.
    pub fn annotate(&mut self, fragment: &str) {
        match self.provenance.as_mut() {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(fragment);
            }
            None => {
                self.provenance = Some(format!("原问卷{}-{}", self.source_seq, fragment));
            }
        }
    }

    /// Replaces the provenance annotation.
    pub fn set_provenance(&mut self, provenance: Option<String>) {
        self.provenance = provenance;
    }

    /// Serializes the record as an ordered row: answer columns, cluster id,
    /// source sequence, and optionally the provenance column.
    pub fn to_row(&self, with_provenance: bool) -> Map<String, Value> {
        let mut row = Map::new();
        for answer in &self.answers {
            row.insert(
                answer.column.label().to_string(),
                Value::String(answer.value.clone()),
            );
        }
        row.insert(
            CLUSTER_COLUMN.to_string(),
            Value::String(self.cluster_id.clone()),
        );
        row.insert(SOURCE_SEQ_COLUMN.to_string(), Value::from(self.source_seq));
        if with_provenance {
            row.insert(
                PROVENANCE_COLUMN.to_string(),
                Value::String(self.provenance.clone().unwrap_or_default()),
            );
        }
        row
    }

    /// Rebuilds a record from a stored row.
    ///
    /// Metadata columns are lifted out; every other key becomes an answer in
    /// row order. Non-string values are rendered as their JSON text.
    pub fn from_row(row: &Map<String, Value>) -> Result<Self, String> {
        let mut answers = Vec::with_capacity(row.len());
        let mut cluster_id = None;
        let mut source_seq = None;
        let mut provenance = None;

        for (key, value) in row {
            match key.as_str() {
                CLUSTER_COLUMN => cluster_id = Some(value_to_text(value)),
                SOURCE_SEQ_COLUMN => {
                    let seq = match value {
                        Value::Number(n) => n.as_u64(),
                        Value::String(s) => s.trim().parse().ok(),
                        _ => None,
                    };
                    source_seq = Some(seq.ok_or_else(|| {
                        format!("{} is not a non-negative integer: {}", SOURCE_SEQ_COLUMN, value)
                    })?);
                }
                PROVENANCE_COLUMN => {
                    let text = value_to_text(value);
                    if !text.is_empty() {
                        provenance = Some(text);
                    }
                }
                _ => answers.push(Answer::new(key.as_str(), value_to_text(value))),
            }
        }

        let mut record = Self::new(
            answers,
            cluster_id.ok_or_else(|| format!("missing column {}", CLUSTER_COLUMN))?,
            source_seq.ok_or_else(|| format!("missing column {}", SOURCE_SEQ_COLUMN))?,
        );
        record.provenance = provenance;
        Ok(record)
    }
}

/// Renders a JSON value as an answer string.
///
/// Strings pass through; arrays are joined with `、`; null becomes empty.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .collect::<Vec<_>>()
            .join("、"),
        other => other.to_string(),
    }
}
