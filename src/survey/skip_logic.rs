//! Skip-logic engine.
//!
//! Gating rules:
//! 1. Question 5 answered "No" skips questions 6 through 36.
//! 2. Question 35 answered "No" skips question 36.
//!
//! Rule 1 is evaluated first, then rule 2 against the updated record, so a
//! "No" on question 5 skips 36 whatever question 35 says.

use std::ops::RangeInclusive;

use super::record::{RespondentRecord, SKIP};

/// Canonical code for "Yes" on the gating questions.
pub const YES: &str = "A";

/// Canonical code for "No" on the gating questions.
pub const NO: &str = "B";

/// Question whose "No" answer skips [`USAGE_GATED`].
pub const USAGE_GATE: u32 = 5;

/// Questions skipped when [`USAGE_GATE`] is "No".
pub const USAGE_GATED: RangeInclusive<u32> = 6..=36;

/// Question whose "No" answer skips [`FOLLOW_UP`].
pub const FOLLOW_UP_GATE: u32 = 35;

/// Question skipped when [`FOLLOW_UP_GATE`] is "No".
pub const FOLLOW_UP: u32 = 36;

/// Applies the gating rules and returns the updated record.
///
/// Idempotent: applying it to a consistent record changes nothing.
pub fn apply(mut record: RespondentRecord) -> RespondentRecord {
    apply_in_place(&mut record);
    record
}

/// In-place variant of [`apply`].
pub fn apply_in_place(record: &mut RespondentRecord) {
    if record.answer(USAGE_GATE) == Some(NO) {
        record.skip_range(USAGE_GATED);
    }
    if record.answer(FOLLOW_UP_GATE) == Some(NO) {
        record.skip_range(FOLLOW_UP..=FOLLOW_UP);
    }
}

/// True when the record already satisfies both gating rules.
pub fn is_consistent(record: &RespondentRecord) -> bool {
    let skipped = |q: u32| record.answer(q).map_or(true, |v| v == SKIP);
    if record.answer(USAGE_GATE) == Some(NO) && !USAGE_GATED.all(skipped) {
        return false;
    }
    !(record.answer(FOLLOW_UP_GATE) == Some(NO) && !skipped(FOLLOW_UP))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::record::Answer;

    fn full_record(q5: &str, q35: &str) -> RespondentRecord {
        let mut answers = Vec::new();
        for q in 1..=40u32 {
            let value = match q {
                5 => q5.to_string(),
                35 => q35.to_string(),
                _ => "C".to_string(),
            };
            answers.push(Answer::new(format!("{}. 题目", q), value));
        }
        RespondentRecord::new(answers, "0", 1)
    }

    #[test]
    fn test_usage_no_skips_six_through_thirty_six() {
        let record = apply(full_record(NO, YES));
        for q in 6..=36 {
            assert_eq!(record.answer(q), Some(SKIP), "question {} should skip", q);
        }
        assert_eq!(record.answer(5), Some(NO));
        assert_eq!(record.answer(4), Some("C"));
        assert_eq!(record.answer(37), Some("C"));
        assert!(is_consistent(&record));
    }

    #[test]
    fn test_follow_up_no_only_skips_thirty_six() {
        let record = apply(full_record(YES, NO));
        assert_eq!(record.answer(36), Some(SKIP));
        for q in (1..=40).filter(|&q| q != 36 && q != 5 && q != 35) {
            assert_eq!(record.answer(q), Some("C"));
        }
        assert_eq!(record.answer(35), Some(NO));
    }

    #[test]
    fn test_usage_no_overrides_follow_up_yes() {
        let record = apply(full_record(NO, YES));
        assert_eq!(record.answer(35), Some(SKIP));
        assert_eq!(record.answer(36), Some(SKIP));
    }

    #[test]
    fn test_apply_is_idempotent() {
        for (q5, q35) in [(YES, YES), (YES, NO), (NO, YES), (NO, NO), ("2", "B"), (SKIP, SKIP)] {
            let once = apply(full_record(q5, q35));
            let twice = apply(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_yes_answers_change_nothing() {
        let original = full_record(YES, YES);
        assert_eq!(apply(original.clone()), original);
    }

    #[test]
    fn test_record_without_gates_is_untouched() {
        let record = RespondentRecord::new(vec![Answer::new("1. a", "B")], "0", 1);
        assert_eq!(apply(record.clone()), record);
    }
}
