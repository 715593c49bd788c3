//! Feature encoding of respondents.
//!
//! Each schema column becomes one or more numeric features:
//! - multi-choice: one 0/1 indicator per distinct option observed
//! - scale: the numeric value, 0 when skipped or unparsable
//! - anything else: the numeric value when every answer is numeric,
//!   one-hot over observed values when there are fewer than
//!   [`ONE_HOT_LIMIT`] of them, ordinal codes in first-seen order otherwise

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use ndarray::Array2;
use regex::Regex;

use crate::schema::{QuestionKind, QuestionSchema};
use crate::survey::SurveyDataset;

/// Distinct-value count at which one-hot encoding switches to ordinal codes.
pub const ONE_HOT_LIMIT: usize = 50;

fn option_splitter() -> &'static Regex {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    SPLIT.get_or_init(|| Regex::new(r"[;,|、┋]+").expect("valid regex"))
}

fn split_options(value: &str) -> Vec<&str> {
    option_splitter()
        .split(value)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Encoded feature matrix with one named column per feature.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Respondents x features.
    pub values: Array2<f64>,
    /// Feature names, e.g. `"12. 用途::A"`.
    pub names: Vec<String>,
}

/// Encodes every respondent of `dataset` into numeric features.
pub fn encode_features(dataset: &SurveyDataset, schema: &QuestionSchema) -> FeatureMatrix {
    let n = dataset.len();
    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();

    for (idx, column) in dataset.columns().iter().enumerate() {
        let kind = schema
            .questions()
            .get(idx)
            .map(|q| q.kind)
            .unwrap_or(QuestionKind::Other);
        let cells: Vec<&str> = dataset.rows().iter().map(|row| row[idx].as_str()).collect();
        let label = column.label();

        match kind {
            QuestionKind::MultiChoice => {
                let options: BTreeSet<&str> =
                    cells.iter().flat_map(|cell| split_options(*cell)).collect();
                for option in options {
                    let indicator = cells
                        .iter()
                        .map(|cell| f64::from(u8::from(split_options(*cell).contains(&option))))
                        .collect();
                    columns.push((format!("{}::{}", label, option), indicator));
                }
            }
            QuestionKind::Scale7 => {
                let values = cells
                    .iter()
                    .map(|cell| cell.trim().parse::<f64>().unwrap_or(0.0))
                    .collect();
                columns.push((label.to_string(), values));
            }
            QuestionKind::SingleChoice | QuestionKind::Other => {
                columns.extend(encode_categorical(label, &cells));
            }
        }
    }

    let mut values = Array2::zeros((n, columns.len()));
    for (j, (_, column)) in columns.iter().enumerate() {
        for (i, &v) in column.iter().enumerate() {
            values[[i, j]] = v;
        }
    }

    FeatureMatrix {
        values,
        names: columns.into_iter().map(|(name, _)| name).collect(),
    }
}

fn encode_categorical(label: &str, cells: &[&str]) -> Vec<(String, Vec<f64>)> {
    let numeric: Option<Vec<f64>> = cells
        .iter()
        .map(|cell| {
            let trimmed = cell.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        })
        .collect();
    if let Some(values) = numeric {
        return vec![(label.to_string(), values)];
    }

    let mut codes: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for cell in cells {
        let key = if cell.trim().is_empty() { "NA" } else { *cell };
        if !codes.contains_key(key) {
            codes.insert(key, order.len());
            order.push(key);
        }
    }

    if order.len() < ONE_HOT_LIMIT {
        let mut sorted = order.clone();
        sorted.sort_unstable();
        sorted
            .into_iter()
            .map(|value| {
                let indicator = cells
                    .iter()
                    .map(|cell| {
                        let key = if cell.trim().is_empty() { "NA" } else { *cell };
                        f64::from(u8::from(key == value))
                    })
                    .collect();
                (format!("{}_{}", label, value), indicator)
            })
            .collect()
    } else {
        let ordinal = cells
            .iter()
            .map(|cell| {
                let key = if cell.trim().is_empty() { "NA" } else { *cell };
                codes.get(key).copied().unwrap_or_default() as f64
            })
            .collect();
        vec![(label.to_string(), ordinal)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> QuestionSchema {
        QuestionSchema::from_json_str(
            r#"{"questions": [
                {"col_name": "1. 年级", "type": "single", "options": ["A. 大一", "B. 大二"]},
                {"col_name": "2. 用途", "type": "multiple", "options": ["A. 写作", "B. 编程", "C. 翻译"]},
                {"col_name": "3. 满意度", "type": "matrix_7"}
            ]}"#,
        )
        .expect("valid schema")
    }

    fn rows(data: &[[&str; 3]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_encoding_shapes_and_values() {
        let dataset = SurveyDataset::from_rows(
            &schema(),
            rows(&[["A", "A、B", "5"], ["B", "C", "(跳过)"], ["A", "B┋C", "7"]]),
        )
        .expect("dataset");

        let features = encode_features(&dataset, &schema());
        // 2 one-hot + 3 indicators + 1 scale
        assert_eq!(features.values.dim(), (3, 6));
        assert_eq!(
            features.names,
            vec![
                "1. 年级_A",
                "1. 年级_B",
                "2. 用途::A",
                "2. 用途::B",
                "2. 用途::C",
                "3. 满意度"
            ]
        );
        assert_eq!(features.values.row(0).to_vec(), vec![1.0, 0.0, 1.0, 1.0, 0.0, 5.0]);
        assert_eq!(features.values.row(1).to_vec(), vec![0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(features.values.row(2).to_vec(), vec![1.0, 0.0, 0.0, 1.0, 1.0, 7.0]);
    }

    #[test]
    fn test_numeric_other_column_passes_through() {
        let encoded = encode_categorical("年龄", &["19", "", "21"]);
        assert_eq!(encoded, vec![("年龄".to_string(), vec![19.0, 0.0, 21.0])]);
    }

    #[test]
    fn test_high_cardinality_uses_ordinal_codes() {
        let values: Vec<String> = (0..60).map(|i| format!("学校{}", i)).collect();
        let cells: Vec<&str> = values.iter().map(String::as_str).collect();
        let encoded = encode_categorical("学校", &cells);
        assert_eq!(encoded.len(), 1);
        assert_eq!(encoded[0].1[0], 0.0);
        assert_eq!(encoded[0].1[59], 59.0);
    }
}
