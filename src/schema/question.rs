//! Question definitions and the immutable question schema.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::survey::column::leading_question_number;

static OPTION_LETTER: OnceLock<Regex> = OnceLock::new();

fn option_letter_re() -> &'static Regex {
    OPTION_LETTER.get_or_init(|| {
        Regex::new(r"^\s*([A-Z])\s*[.．、:：)）]").expect("option letter regex is valid")
    })
}

/// The answer type of a survey question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Exactly one option letter.
    SingleChoice,
    /// One or more option letters joined by `、`.
    MultiChoice,
    /// A 7-point scale answered with `1`..`7`.
    Scale7,
    /// Free text or an unrecognised type tag.
    Other,
}

impl QuestionKind {
    /// Maps the type tag used by the schema document.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "single" => QuestionKind::SingleChoice,
            "multiple" => QuestionKind::MultiChoice,
            "matrix_7" => QuestionKind::Scale7,
            _ => QuestionKind::Other,
        }
    }

    /// True for single- and multi-choice questions.
    pub fn is_choice(&self) -> bool {
        matches!(self, QuestionKind::SingleChoice | QuestionKind::MultiChoice)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QuestionKind::SingleChoice => "single",
            QuestionKind::MultiChoice => "multiple",
            QuestionKind::Scale7 => "matrix_7",
            QuestionKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A single survey question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    /// Question number, unique within a schema.
    pub number: u32,
    /// Canonical column header.
    pub column_label: String,
    /// Answer type.
    pub kind: QuestionKind,
    /// Option display texts, each beginning with its letter label.
    pub options: Vec<String>,
    letters: Vec<String>,
}

impl Question {
    /// Builds a question, deriving the number from the label.
    pub fn new(
        column_label: impl Into<String>,
        kind: QuestionKind,
        options: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let column_label = column_label.into().trim().to_string();
        let number = leading_question_number(&column_label).ok_or_else(|| {
            SchemaError::MissingNumber {
                label: column_label.clone(),
            }
        })?;
        let letters = if kind.is_choice() {
            options
                .iter()
                .filter_map(|opt| {
                    option_letter_re()
                        .captures(opt)
                        .and_then(|caps| caps.get(1))
                        .map(|m| m.as_str().to_string())
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            number,
            column_label,
            kind,
            options,
            letters,
        })
    }

    /// Option letters parsed from the option texts, in declaration order.
    pub fn letters(&self) -> &[String] {
        &self.letters
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    questions: Vec<QuestionEntry>,
}

#[derive(Debug, Deserialize)]
struct QuestionEntry {
    col_name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    options: Vec<String>,
}

/// The full set of questions, indexed by number.
///
/// Built once at startup and passed by reference to every stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionSchema {
    questions: Vec<Question>,
    #[serde(skip)]
    by_number: HashMap<u32, usize>,
}

impl QuestionSchema {
    /// Builds a schema from questions in column order.
    pub fn new(questions: Vec<Question>) -> Result<Self, SchemaError> {
        if questions.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut by_number = HashMap::with_capacity(questions.len());
        for (idx, question) in questions.iter().enumerate() {
            if by_number.insert(question.number, idx).is_some() {
                return Err(SchemaError::DuplicateNumber(question.number));
            }
        }

        Ok(Self {
            questions,
            by_number,
        })
    }

    /// Loads the schema document from a JSON file.
    ///
    /// The document has the shape
    /// `{"questions": [{"col_name": "1. ...", "type": "single", "options": ["A. ...", ...]}]}`.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        let schema = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            questions = schema.len(),
            "Question schema loaded"
        );
        Ok(schema)
    }

    /// Parses the schema document from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, SchemaError> {
        let document: SchemaDocument = serde_json::from_str(content)?;
        let questions = document
            .questions
            .into_iter()
            .map(|entry| Question::new(entry.col_name, QuestionKind::from_tag(&entry.kind), entry.options))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(questions)
    }

    /// Questions in column order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// True when the schema has no questions (never true for a built schema).
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Looks up a question by number.
    pub fn get(&self, number: u32) -> Option<&Question> {
        self.by_number.get(&number).map(|&idx| &self.questions[idx])
    }

    /// Kind of the given question, if it exists.
    pub fn kind_of(&self, number: u32) -> Option<QuestionKind> {
        self.get(number).map(|q| q.kind)
    }

    /// Valid option letters for a choice question.
    ///
    /// Empty for non-choice questions and for numbers absent from the schema.
    pub fn allowed_letters(&self, number: u32) -> &[String] {
        self.get(number).map(Question::letters).unwrap_or(&[])
    }

    /// Canonical column labels in order.
    pub fn column_labels(&self) -> Vec<String> {
        self.questions
            .iter()
            .map(|q| q.column_label.clone())
            .collect()
    }

    /// Renders every question for a generation prompt.
    ///
    /// Choice questions list their options after `选项：`.
    pub fn render_for_prompt(&self) -> String {
        self.questions
            .iter()
            .map(|q| {
                let mut line = q.column_label.clone();
                if q.kind.is_choice() && !q.options.is_empty() {
                    line.push_str("\n选项：");
                    line.push_str(&q.options.join("、"));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
