//! Post-run analysis of the augmented survey.
//!
//! Compares the original respondents with the generated and jittered sets:
//! per-question answer distributions, per-cluster record counts, and
//! Cronbach's alpha over the scale items.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array2, Axis};
use serde::Serialize;

use crate::clustering::Clustering;
use crate::error::StoreError;
use crate::schema::{QuestionKind, QuestionSchema};
use crate::survey::{RespondentRecord, SurveyDataset, SKIP};

/// Normalized answer frequencies keyed by answer string.
pub type Frequencies = BTreeMap<String, f64>;

/// Answer distribution of one question across the three sets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionSummary {
    pub question: u32,
    pub label: String,
    pub kind: QuestionKind,
    pub original: Frequencies,
    pub generated: Frequencies,
    pub jittered: Frequencies,
}

/// Record counts per cluster id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterCounts {
    /// Respondents per cluster after exclusion.
    pub original: BTreeMap<String, usize>,
    pub generated: BTreeMap<String, usize>,
    pub jittered: BTreeMap<String, usize>,
}

/// Cronbach's alpha over the scale items of each set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reliability {
    /// Number of scale items entering the computation.
    pub items: usize,
    pub original: Option<f64>,
    pub generated: Option<f64>,
    pub jittered: Option<f64>,
}

/// Summary of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub original_count: usize,
    pub generated_count: usize,
    pub jittered_count: usize,
    pub questions: Vec<QuestionSummary>,
    pub clusters: ClusterCounts,
    pub reliability: Reliability,
}

impl Summary {
    /// Fills the original per-cluster counts from a clustering.
    pub fn with_original_clusters(mut self, clustering: &Clustering) -> Self {
        self.clusters.original = clustering
            .counts()
            .into_iter()
            .map(|(cluster, count)| (cluster.to_string(), count))
            .collect();
        self
    }

    /// Emits the headline numbers as tracing events.
    pub fn log(&self) {
        tracing::info!(
            original = self.original_count,
            generated = self.generated_count,
            jittered = self.jittered_count,
            questions = self.questions.len(),
            "Run summary"
        );
        for (cluster, count) in &self.clusters.generated {
            tracing::info!(
                cluster_id = %cluster,
                original = self.clusters.original.get(cluster).copied().unwrap_or(0),
                generated = count,
                jittered = self.clusters.jittered.get(cluster).copied().unwrap_or(0),
                "Cluster counts"
            );
        }
        tracing::info!(
            items = self.reliability.items,
            original = ?self.reliability.original,
            generated = ?self.reliability.generated,
            jittered = ?self.reliability.jittered,
            "Cronbach's alpha over scale items"
        );
    }

    /// Writes the summary as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Summarizes the original, generated and jittered sets.
pub fn summarize(
    original: &SurveyDataset,
    generated: &[RespondentRecord],
    jittered: &[RespondentRecord],
    schema: &QuestionSchema,
) -> Summary {
    let questions = schema
        .questions()
        .iter()
        .filter(|q| q.kind != QuestionKind::Other)
        .map(|q| QuestionSummary {
            question: q.number,
            label: q.column_label.clone(),
            kind: q.kind,
            original: frequencies(original.column_values(q.number)),
            generated: frequencies(generated.iter().filter_map(|r| r.answer(q.number))),
            jittered: frequencies(jittered.iter().filter_map(|r| r.answer(q.number))),
        })
        .collect();

    let scale_items: Vec<u32> = schema
        .questions()
        .iter()
        .filter(|q| q.kind == QuestionKind::Scale7)
        .map(|q| q.number)
        .collect();

    let original_rows: Vec<Vec<&str>> = {
        let positions: Vec<Option<usize>> = scale_items
            .iter()
            .map(|&n| original.columns().iter().position(|c| c.is_question(n)))
            .collect();
        original
            .rows()
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|p| p.and_then(|i| row.get(i)).map_or("", String::as_str))
                    .collect()
            })
            .collect()
    };

    let reliability = Reliability {
        items: scale_items.len(),
        original: cronbach_alpha(&scale_matrix(original_rows)),
        generated: cronbach_alpha(&scale_matrix(record_rows(generated, &scale_items))),
        jittered: cronbach_alpha(&scale_matrix(record_rows(jittered, &scale_items))),
    };

    Summary {
        original_count: original.len(),
        generated_count: generated.len(),
        jittered_count: jittered.len(),
        questions,
        clusters: ClusterCounts {
            original: BTreeMap::new(),
            generated: cluster_counts(generated),
            jittered: cluster_counts(jittered),
        },
        reliability,
    }
}

/// Normalized frequencies of whole answer strings; skipped and empty
/// answers are left out.
pub fn frequencies<'v>(values: impl IntoIterator<Item = &'v str>) -> Frequencies {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() || value == SKIP {
            continue;
        }
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }

    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(value, count)| (value, count as f64 / total as f64))
        .collect()
}

fn cluster_counts(records: &[RespondentRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.cluster_id().to_string()).or_insert(0) += 1;
    }
    counts
}

fn record_rows<'r>(records: &'r [RespondentRecord], items: &[u32]) -> Vec<Vec<&'r str>> {
    records
        .iter()
        .map(|r| items.iter().map(|&n| r.answer(n).unwrap_or("")).collect())
        .collect()
}

/// Parses scale rows into a matrix, dropping rows with a non-numeric cell.
fn scale_matrix(rows: Vec<Vec<&str>>) -> Array2<f64> {
    let width = rows.first().map_or(0, Vec::len);
    let parsed: Vec<Vec<f64>> = rows
        .into_iter()
        .filter_map(|row| {
            row.iter()
                .map(|cell| cell.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
                .collect::<Option<Vec<f64>>>()
        })
        .collect();

    let flat: Vec<f64> = parsed.iter().flatten().copied().collect();
    Array2::from_shape_vec((parsed.len(), width), flat).unwrap_or_else(|_| Array2::zeros((0, width)))
}

/// Cronbach's alpha of a respondents x items matrix, with sample variances.
///
/// `None` when there are fewer than two items or two respondents; `0.0`
/// when the total score has no variance.
pub fn cronbach_alpha(items: &Array2<f64>) -> Option<f64> {
    let (n, k) = items.dim();
    if k < 2 || n < 2 {
        return None;
    }

    let item_variance: f64 = items.var_axis(Axis(0), 1.0).sum();
    let total_variance = items.sum_axis(Axis(1)).var(1.0);
    if total_variance == 0.0 {
        return Some(0.0);
    }

    let k = k as f64;
    Some((k / (k - 1.0)) * (1.0 - item_variance / total_variance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures::{canonical_answers, full_record, survey_schema};
    use ndarray::array;

    #[test]
    fn test_frequencies_skip_sentinel_and_normalize() {
        let freq = frequencies(["A", "B", "A", SKIP, "", "A"]);
        assert_eq!(freq.len(), 2);
        assert!((freq["A"] - 0.75).abs() < 1e-12);
        assert!((freq["B"] - 0.25).abs() < 1e-12);
        assert!(frequencies([SKIP]).is_empty());
    }

    #[test]
    fn test_cronbach_alpha_known_value() {
        // Two perfectly correlated items.
        let items = array![[1.0, 2.0], [2.0, 3.0], [3.0, 4.0]];
        let alpha = cronbach_alpha(&items).expect("alpha");
        assert!((alpha - 1.0).abs() < 1e-12);

        let items = array![[1.0, 3.0, 2.0], [2.0, 2.0, 3.0], [4.0, 5.0, 4.0], [3.0, 3.0, 5.0]];
        // Item sums of squares 5.0, 4.75, 5.0; totals 6, 7, 13, 11 give 32.75.
        let alpha = cronbach_alpha(&items).expect("alpha");
        let expected = 1.5 * (1.0 - 14.75 / 32.75);
        assert!((alpha - expected).abs() < 1e-9, "alpha {}", alpha);
    }

    #[test]
    fn test_cronbach_alpha_degenerate_inputs() {
        assert_eq!(cronbach_alpha(&array![[1.0], [2.0]]), None);
        assert_eq!(cronbach_alpha(&array![[1.0, 2.0]]), None);
        assert_eq!(cronbach_alpha(&array![[3.0, 3.0], [3.0, 3.0]]), Some(0.0));
    }

    #[test]
    fn test_scale_matrix_drops_non_numeric_rows() {
        let matrix = scale_matrix(vec![vec!["1", "2"], vec!["3", SKIP], vec!["4", "5"]]);
        assert_eq!(matrix, array![[1.0, 2.0], [4.0, 5.0]]);
        assert_eq!(scale_matrix(Vec::new()).dim(), (0, 0));
    }

    #[test]
    fn test_summarize_three_sets() {
        let schema = survey_schema();
        let rows: Vec<Vec<String>> = ["A", "B"]
            .iter()
            .map(|q5| {
                canonical_answers(&schema, q5, "A")
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect()
            })
            .collect();
        let original = SurveyDataset::from_rows(&schema, rows).expect("dataset");

        let generated = vec![full_record(&schema, "A", "A", 1), full_record(&schema, "A", "B", 2)];
        let mut jittered = generated.clone();
        jittered[1].set_answer(3, "5");

        let summary = summarize(&original, &generated, &jittered, &schema);
        assert_eq!(summary.original_count, 2);
        assert_eq!(summary.generated_count, 2);
        // Question 38 is free text.
        assert_eq!(summary.questions.len(), 37);

        let q5 = summary.questions.iter().find(|q| q.question == 5).expect("q5");
        assert!((q5.original["A"] - 0.5).abs() < 1e-12);
        assert!((q5.generated["A"] - 1.0).abs() < 1e-12);

        let q3 = summary.questions.iter().find(|q| q.question == 3).expect("q3");
        assert_eq!(q3.generated.len(), 1);
        assert_eq!(q3.jittered.len(), 2);

        assert_eq!(summary.clusters.generated.get("0"), Some(&2));
        assert_eq!(summary.clusters.jittered.get("0"), Some(&2));
        assert!(summary.reliability.items > 2);
        // Identical rows have no variance.
        assert_eq!(summary.reliability.generated, Some(0.0));
    }

    #[test]
    fn test_save_writes_json() {
        let schema = survey_schema();
        let original = SurveyDataset::from_rows(&schema, Vec::new()).expect("dataset");
        let summary = summarize(&original, &[], &[], &schema);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("summary.json");
        summary.save(&path).expect("saved");

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["generated_count"], 0);
        assert!(value["reliability"]["original"].is_null());
    }
}
