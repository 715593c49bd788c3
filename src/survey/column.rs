//! Typed column keys.
//!
//! Survey columns arrive with heterogeneous labels ("5. 您是否使用过AIGC工具",
//! "5、是否使用", "35(多选)" ...). The leading question number is parsed once,
//! when the key is built, so every component agrees on the extraction rule.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Column holding the cluster identifier of a synthetic record.
pub const CLUSTER_COLUMN: &str = "簇编号";

/// Column holding the run-wide source sequence number of a synthetic record.
pub const SOURCE_SEQ_COLUMN: &str = "原问卷序号";

/// Column holding the jitter provenance annotation.
pub const PROVENANCE_COLUMN: &str = "抖动来源";

static LEADING_NUMBER: OnceLock<Regex> = OnceLock::new();
static ANY_DIGIT: OnceLock<Regex> = OnceLock::new();

fn leading_number_re() -> &'static Regex {
    LEADING_NUMBER.get_or_init(|| Regex::new(r"^\s*([0-9０-９]+)").expect("leading number regex is valid"))
}

fn any_digit_re() -> &'static Regex {
    ANY_DIGIT.get_or_init(|| Regex::new(r"[0-9０-９]").expect("digit regex is valid"))
}

/// Value of an ASCII or full-width decimal digit.
fn digit_value(c: char) -> Option<u32> {
    c.to_digit(10).or_else(|| {
        ('０'..='９')
            .contains(&c)
            .then(|| c as u32 - '０' as u32)
    })
}

/// Extracts the question number a column label starts with.
///
/// ASCII and full-width digits are both accepted and may be mixed. Returns
/// `None` when the label does not begin with a number or the number does not
/// fit in a `u32`.
pub fn leading_question_number(label: &str) -> Option<u32> {
    let digits = leading_number_re().captures(label)?.get(1)?.as_str();
    digits.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(10)?.checked_add(digit_value(c)?)
    })
}

/// Returns true when the label contains an ASCII or full-width digit anywhere.
///
/// Used as the crude well-formedness filter on generated responses.
pub fn contains_question_number(label: &str) -> bool {
    any_digit_re().is_match(label)
}

/// A column label decorated with its parsed question number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    label: String,
    question: Option<u32>,
}

impl ColumnKey {
    /// Builds a key, parsing the leading question number from the label.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let question = leading_question_number(&label);
        Self { label, question }
    }

    /// The column label as it appears in the schema / output header.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The question number, if the label starts with one.
    pub fn question(&self) -> Option<u32> {
        self.question
    }

    /// True when this column belongs to the given question number.
    pub fn is_question(&self, number: u32) -> bool {
        self.question == Some(number)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl From<&str> for ColumnKey {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for ColumnKey {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_question_number_formats() {
        assert_eq!(leading_question_number("5. 您是否使用过AIGC工具"), Some(5));
        assert_eq!(leading_question_number("35、是否愿意付费"), Some(35));
        assert_eq!(leading_question_number("12(多选)"), Some(12));
        assert_eq!(leading_question_number("  7 量表"), Some(7));
        assert_eq!(leading_question_number("Q5 是否使用"), None);
        assert_eq!(leading_question_number(CLUSTER_COLUMN), None);
        assert_eq!(leading_question_number(""), None);
    }

    #[test]
    fn test_leading_number_does_not_match_prefix_of_other_question() {
        let key = ColumnKey::new("50. 其它");
        assert!(key.is_question(50));
        assert!(!key.is_question(5));
    }

    #[test]
    fn test_contains_question_number() {
        assert!(contains_question_number("第5题"));
        assert!(contains_question_number("q12"));
        assert!(!contains_question_number("foo"));
        assert!(contains_question_number("第５题"));
    }

    #[test]
    fn test_full_width_question_numbers() {
        assert_eq!(leading_question_number("５. 是否使用"), Some(5));
        assert_eq!(leading_question_number("３５、是否愿意付费"), Some(35));
        assert_eq!(leading_question_number("5５. 混合"), Some(55));
        assert_eq!(leading_question_number("99999999999. 溢出"), None);
    }

    #[test]
    fn test_digit_filter_agrees_with_leading_number() {
        for label in ["５. 是否", "1. x", "３６(多选)"] {
            assert!(contains_question_number(label));
            assert!(leading_question_number(label).is_some(), "{}", label);
        }
        // Other scripts' digits are neither counted nor parsed.
        assert!(!contains_question_number("٥. other"));
        assert_eq!(leading_question_number("٥. other"), None);
    }

    #[test]
    fn test_column_key_display() {
        let key = ColumnKey::from("3. 年级");
        assert_eq!(key.to_string(), "3. 年级");
        assert_eq!(key.question(), Some(3));
    }
}
