//! Survey answers: typed column keys, respondent records, answer
//! normalization, skip logic, and the respondent dataset.

pub mod column;
pub mod dataset;
pub mod normalize;
pub mod record;
pub mod skip_logic;

pub use column::{
    contains_question_number, leading_question_number, ColumnKey, CLUSTER_COLUMN,
    PROVENANCE_COLUMN, SOURCE_SEQ_COLUMN,
};
pub use dataset::SurveyDataset;
pub use normalize::{normalize_answer, FormatWarning, Normalized};
pub use record::{Answer, RespondentRecord, SKIP};
