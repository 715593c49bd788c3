//! Question schema: the static definition of every survey question.

pub mod question;

pub use question::{Question, QuestionKind, QuestionSchema};

#[cfg(test)]
pub(crate) mod fixtures;
