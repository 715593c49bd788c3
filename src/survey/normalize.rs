//! Answer normalization.
//!
//! Models answer choice questions with numbers ("3") or letters ("C") and
//! scale questions with letters ("B") or digits ("2"). These functions map a
//! raw token onto the canonical form for its question kind, and check the
//! result. A failed check is a [`FormatWarning`], never an error: malformed
//! model output is kept and flagged so a long run is not lost to it.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use super::record::SKIP;
use crate::schema::QuestionKind;

/// Delimiters accepted between options of a multi-choice answer.
pub const MULTI_DELIMITERS: &[char] = &['、', '┋', ';', '；', '，', ',', '|'];

/// Delimiter used in canonical multi-choice answers.
pub const CANONICAL_DELIMITER: &str = "、";

static SINGLE_FORM: OnceLock<Regex> = OnceLock::new();
static MULTI_FORM: OnceLock<Regex> = OnceLock::new();
static SCALE_FORM: OnceLock<Regex> = OnceLock::new();

fn single_form() -> &'static Regex {
    SINGLE_FORM.get_or_init(|| Regex::new(r"^[A-Z]$").expect("single form regex is valid"))
}

fn multi_form() -> &'static Regex {
    MULTI_FORM
        .get_or_init(|| Regex::new(r"^[A-Z]([、┋][A-Z])*$").expect("multi form regex is valid"))
}

fn scale_form() -> &'static Regex {
    SCALE_FORM.get_or_init(|| Regex::new(r"^[1-7]$").expect("scale form regex is valid"))
}

/// Maps `1..=26` to `A..=Z`; anything else passes through.
fn number_to_letter(token: &str) -> Option<char> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match token.parse::<u32>() {
        Ok(n @ 1..=26) => char::from_u32('A' as u32 + n - 1),
        _ => None,
    }
}

/// Converts a single-choice answer: `"3"` becomes `"C"`.
pub fn to_single_choice(raw: &str) -> String {
    let token = raw.trim();
    match number_to_letter(token) {
        Some(letter) => letter.to_string(),
        None => token.to_string(),
    }
}

/// Converts a multi-choice answer token by token and rejoins with `、`.
///
/// Input order is preserved; callers that need a sorted set sort afterwards.
pub fn to_multi_choice(raw: &str) -> String {
    raw.split(MULTI_DELIMITERS)
        .map(to_single_choice)
        .collect::<Vec<_>>()
        .join(CANONICAL_DELIMITER)
}

/// Converts a scale answer: a single uppercase letter becomes its 1-based
/// position (`"B"` becomes `"2"`); anything else passes through.
pub fn to_scale(raw: &str) -> String {
    let token = raw.trim();
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_uppercase() => (c as u32 - 'A' as u32 + 1).to_string(),
        _ => token.to_string(),
    }
}

/// Checks the canonical form for a question kind.
///
/// The skip sentinel is always acceptable; `Other` accepts anything.
pub fn is_canonical(kind: QuestionKind, value: &str) -> bool {
    if value == SKIP {
        return true;
    }
    match kind {
        QuestionKind::SingleChoice => single_form().is_match(value),
        QuestionKind::MultiChoice => multi_form().is_match(value),
        QuestionKind::Scale7 => scale_form().is_match(value),
        QuestionKind::Other => true,
    }
}

/// A normalized answer that failed its post-condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatWarning {
    /// Question number.
    pub question: u32,
    /// Declared kind of the question.
    pub kind: QuestionKind,
    /// The value as kept after conversion.
    pub value: String,
}

impl fmt::Display for FormatWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = match self.kind {
            QuestionKind::SingleChoice => "a single uppercase letter",
            QuestionKind::MultiChoice => "letters joined by 、",
            QuestionKind::Scale7 => "a digit 1-7",
            QuestionKind::Other => "any text",
        };
        write!(
            f,
            "question {} ({}) expects {} or {}, got '{}'",
            self.question, self.kind, expected, SKIP, self.value
        )
    }
}

/// Result of normalizing one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical (or kept-as-is) value.
    pub value: String,
    /// Set when the value fails the kind's post-condition.
    pub warning: Option<FormatWarning>,
}

/// Converts a raw answer for `question` according to `kind` and validates it.
pub fn normalize_answer(question: u32, kind: QuestionKind, raw: &str) -> Normalized {
    let value = match kind {
        QuestionKind::SingleChoice => to_single_choice(raw),
        QuestionKind::MultiChoice => to_multi_choice(raw),
        QuestionKind::Scale7 => to_scale(raw),
        QuestionKind::Other => raw.to_string(),
    };
    let warning = (!is_canonical(kind, &value)).then(|| FormatWarning {
        question,
        kind,
        value: value.clone(),
    });
    Normalized { value, warning }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_choice_conversion() {
        assert_eq!(to_single_choice("C"), "C");
        assert_eq!(to_single_choice("3"), "C");
        assert_eq!(to_single_choice("1"), "A");
        assert_eq!(to_single_choice("26"), "Z");
        assert_eq!(to_single_choice("27"), "27");
        assert_eq!(to_single_choice("0"), "0");
        assert_eq!(to_single_choice(SKIP), SKIP);
    }

    #[test]
    fn test_multi_choice_preserves_input_order() {
        assert_eq!(to_multi_choice("2、1"), "B、A");
        assert_eq!(to_multi_choice("A┋3"), "A、C");
        assert_eq!(to_multi_choice("1; 4|2"), "A、D、B");
        assert_eq!(to_multi_choice(SKIP), SKIP);
    }

    #[test]
    fn test_scale_conversion() {
        assert_eq!(to_scale("B"), "2");
        assert_eq!(to_scale("G"), "7");
        assert_eq!(to_scale("5"), "5");
        assert_eq!(to_scale("AB"), "AB");
        assert_eq!(to_scale(SKIP), SKIP);
    }

    #[test]
    fn test_canonical_forms() {
        assert!(is_canonical(QuestionKind::SingleChoice, "A"));
        assert!(!is_canonical(QuestionKind::SingleChoice, "AB"));
        assert!(is_canonical(QuestionKind::MultiChoice, "A、C"));
        assert!(is_canonical(QuestionKind::MultiChoice, "A┋C"));
        assert!(!is_canonical(QuestionKind::MultiChoice, "A、"));
        assert!(is_canonical(QuestionKind::Scale7, "7"));
        assert!(!is_canonical(QuestionKind::Scale7, "8"));
        assert!(is_canonical(QuestionKind::Scale7, SKIP));
        assert!(is_canonical(QuestionKind::Other, "随便"));
    }

    #[test]
    fn test_normalize_answer_flags_but_keeps_bad_values() {
        let ok = normalize_answer(3, QuestionKind::Scale7, "C");
        assert_eq!(ok.value, "3");
        assert!(ok.warning.is_none());

        let bad = normalize_answer(3, QuestionKind::Scale7, "非常同意");
        assert_eq!(bad.value, "非常同意");
        let warning = bad.warning.expect("should warn");
        assert_eq!(warning.question, 3);
        assert!(warning.to_string().contains("1-7"));

        let multi = normalize_answer(8, QuestionKind::MultiChoice, "1、x");
        assert_eq!(multi.value, "A、x");
        assert!(multi.warning.is_some());
    }
}
