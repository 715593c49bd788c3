//! Jitter engine.
//!
//! Perturbs synthesized records so the augmented set is less uniform than
//! raw model output. Gate questions are handled first and may end the pass
//! early:
//!
//! 1. Question 5 "Yes" flips to "No" with `q5_flip`; a "No" (flipped or
//!    original) skips 6-36 and returns.
//! 2. Question 35 flips with `q35_flip`; landing on "No" skips 36 and
//!    returns, landing on "Yes" redraws 36 and continues.
//! 3. Every other numbered question is perturbed by kind: multi-choice adds
//!    or drops one option, scale shifts by one within 1-7, single choice
//!    redraws from its allowed letters.
//!
//! Skip logic is re-applied at the end and every output record carries a
//! provenance annotation.

use std::sync::OnceLock;

use rand::seq::IndexedRandom;
use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use regex::Regex;

use crate::config::JitterProbabilities;
use crate::error::StoreError;
use crate::schema::{QuestionKind, QuestionSchema};
use crate::store::RecordSink;
use crate::survey::skip_logic::{self, FOLLOW_UP, FOLLOW_UP_GATE, NO, USAGE_GATE, USAGE_GATED, YES};
use crate::survey::{RespondentRecord, SKIP};

/// Provenance for a question-5 flip from "Yes" to "No".
pub const Q5_FLIPPED: &str = "5题A变B";

/// Provenance for a record whose question 5 was already "No".
pub const Q5_ALREADY_NO: &str = "5题B处理";

/// Provenance for a question-35 flip to "No".
pub const Q35_TO_NO: &str = "35题翻转为B";

/// Provenance for a question-35 flip to "Yes".
pub const Q35_TO_YES: &str = "35题翻转为A";

/// Provenance when no rule annotated the record.
pub const DEFAULT_PROVENANCE: &str = "随机抖动";

fn option_splitter() -> &'static Regex {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    SPLIT.get_or_init(|| Regex::new(r"[;；,|、┋]+").expect("valid regex"))
}

/// Seeded record perturbation over a schema.
pub struct JitterEngine<'a> {
    schema: &'a QuestionSchema,
    probabilities: JitterProbabilities,
    rng: ChaCha8Rng,
}

impl<'a> JitterEngine<'a> {
    /// Creates an engine; `None` seeds from the thread RNG.
    pub fn new(schema: &'a QuestionSchema, probabilities: JitterProbabilities, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Self {
            schema,
            probabilities,
            rng,
        }
    }

    fn chance(&mut self, p: f64) -> bool {
        self.rng.random_bool(p.clamp(0.0, 1.0))
    }

    /// Returns a perturbed copy of `record`.
    pub fn jitter(&mut self, record: &RespondentRecord) -> RespondentRecord {
        let mut out = record.clone();
        out.set_provenance(None);

        let usage = out.answer(USAGE_GATE).map(str::to_string);
        match usage.as_deref() {
            Some(YES) if self.chance(self.probabilities.q5_flip) => {
                out.set_answer(USAGE_GATE, NO);
                return finish_gated(out, Q5_FLIPPED);
            }
            Some(NO) => return finish_gated(out, Q5_ALREADY_NO),
            _ => {}
        }

        let follow_up = out.answer(FOLLOW_UP_GATE).map(str::to_string);
        if let Some(current) = follow_up.filter(|v| v == YES || v == NO) {
            if self.chance(self.probabilities.q35_flip) {
                let flipped = if current == YES { NO } else { YES };
                out.set_answer(FOLLOW_UP_GATE, flipped);
                if flipped == NO {
                    out.skip_range(FOLLOW_UP..=FOLLOW_UP);
                    skip_logic::apply_in_place(&mut out);
                    out.annotate(Q35_TO_NO);
                    return out;
                }
                let schema = self.schema;
                if let Some(choice) = schema.allowed_letters(FOLLOW_UP).choose(&mut self.rng) {
                    out.set_answer(FOLLOW_UP, choice);
                }
                out.annotate(Q35_TO_YES);
            }
        }

        self.perturb_general(&mut out);

        skip_logic::apply_in_place(&mut out);
        if out.provenance().is_none() {
            out.annotate(DEFAULT_PROVENANCE);
        }
        out
    }

    fn perturb_general(&mut self, out: &mut RespondentRecord) {
        for idx in 0..out.answers().len() {
            let answer = &out.answers()[idx];
            let Some(question) = answer.column.question() else {
                continue;
            };
            if [USAGE_GATE, FOLLOW_UP_GATE, FOLLOW_UP].contains(&question) || answer.is_skipped() {
                continue;
            }
            let Some(kind) = self.schema.kind_of(question) else {
                continue;
            };
            let current = answer.value.clone();
            let label = answer.column.label().to_string();

            let replacement = match kind {
                QuestionKind::MultiChoice => self.perturb_multi(question, &current),
                QuestionKind::Scale7 => self.perturb_scale(&current),
                QuestionKind::SingleChoice | QuestionKind::Other => {
                    let changed = self.perturb_single(question, &current);
                    if changed.is_some() {
                        out.annotate(&format!("单选题{}抖动", label));
                    }
                    changed
                }
            };

            if let Some(value) = replacement {
                out.answers_mut()[idx].value = value;
            }
        }
    }

    fn perturb_multi(&mut self, question: u32, current: &str) -> Option<String> {
        if !self.chance(self.probabilities.multi) {
            return None;
        }
        let mut parts: Vec<String> = option_splitter()
            .split(current)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let drop = !parts.is_empty() && self.chance(self.probabilities.multi_drop) && parts.len() > 1;
        if drop {
            let idx = self.rng.random_range(0..parts.len());
            parts.remove(idx);
        } else {
            let schema = self.schema;
            let available: Vec<&String> = schema
                .allowed_letters(question)
                .iter()
                .filter(|letter| !parts.contains(*letter))
                .collect();
            if let Some(letter) = available.choose(&mut self.rng) {
                parts.push((*letter).clone());
            }
        }

        parts.sort();
        parts.dedup();
        Some(parts.join("、"))
    }

    fn perturb_scale(&mut self, current: &str) -> Option<String> {
        if !self.chance(self.probabilities.scale) {
            return None;
        }
        let value: i64 = current.trim().parse().ok()?;
        let step = if self.rng.random_bool(0.5) { 1 } else { -1 };
        Some((value + step).clamp(1, 7).to_string())
    }

    fn perturb_single(&mut self, question: u32, current: &str) -> Option<String> {
        let schema = self.schema;
        let letters = schema.allowed_letters(question);
        if letters.is_empty() || !self.chance(self.probabilities.single) {
            return None;
        }
        let possible: Vec<&String> = if letters.iter().any(|l| l == current) {
            letters.iter().filter(|l| *l != current).collect()
        } else {
            letters.iter().collect()
        };
        possible.choose(&mut self.rng).map(|l| (*l).clone())
    }

    /// Jitters every record, appending each result to `sink` as it is made.
    pub fn jitter_all(
        &mut self,
        records: &[RespondentRecord],
        sink: &mut dyn RecordSink,
    ) -> Result<Vec<RespondentRecord>, StoreError> {
        let mut jittered = Vec::with_capacity(records.len());
        for record in records {
            let out = self.jitter(record);
            sink.append(&out)?;
            jittered.push(out);
        }

        let untouched = jittered
            .iter()
            .filter(|r| r.provenance().is_some_and(|p| p.ends_with(DEFAULT_PROVENANCE)))
            .count();
        tracing::info!(
            records = jittered.len(),
            default_provenance = untouched,
            "Jitter complete"
        );
        Ok(jittered)
    }
}

/// Skips the usage-gated range, re-applies skip logic and annotates.
fn finish_gated(mut out: RespondentRecord, provenance: &str) -> RespondentRecord {
    out.skip_range(USAGE_GATED);
    skip_logic::apply_in_place(&mut out);
    out.annotate(provenance);
    out
}
