//! Shared test fixtures: a 38-question AIGC usage survey.

use serde_json::{json, Value};

use super::{Question, QuestionKind, QuestionSchema};
use crate::survey::{Answer, RespondentRecord};

fn options(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

/// Questions 1-38; question 4 is single choice, 38 is free text.
///
/// Questions 6-34 cycle through single (n % 3 == 1), multi (n % 3 == 2) and
/// scale (n % 3 == 0).
pub(crate) fn survey_schema() -> QuestionSchema {
    let mut questions = vec![
        Question::new(
            "1. 您的年级",
            QuestionKind::SingleChoice,
            options(&["A. 大一", "B. 大二", "C. 大三", "D. 大四"]),
        ),
        Question::new(
            "2. 您常用的AIGC工具类型",
            QuestionKind::MultiChoice,
            options(&["A. 文本生成", "B. 图像生成", "C. 代码辅助", "D. 音视频"]),
        ),
        Question::new("3. 您对AIGC的总体满意度", QuestionKind::Scale7, Vec::new()),
        Question::new(
            "4. 您的专业类别",
            QuestionKind::SingleChoice,
            options(&["A. 理工", "B. 人文", "C. 经管"]),
        ),
        Question::new(
            "5. 您是否使用过AIGC工具",
            QuestionKind::SingleChoice,
            options(&["A. 是", "B. 否"]),
        ),
    ];

    for n in 6..=34u32 {
        questions.push(match n % 3 {
            1 => Question::new(
                format!("{}. 使用频率{}", n, n),
                QuestionKind::SingleChoice,
                options(&["A. 从不", "B. 偶尔", "C. 经常"]),
            ),
            2 => Question::new(
                format!("{}. 使用场景{}", n, n),
                QuestionKind::MultiChoice,
                options(&["A. 学习", "B. 娱乐", "C. 科研"]),
            ),
            _ => Question::new(format!("{}. 认同程度{}", n, n), QuestionKind::Scale7, Vec::new()),
        });
    }

    questions.extend([
        Question::new(
            "35. 您是否愿意继续使用AIGC",
            QuestionKind::SingleChoice,
            options(&["A. 愿意", "B. 不愿意"]),
        ),
        Question::new(
            "36. 您希望AIGC在哪方面改进",
            QuestionKind::SingleChoice,
            options(&["A. 准确性", "B. 速度", "C. 价格"]),
        ),
        Question::new("37. 您对AIGC监管的支持程度", QuestionKind::Scale7, Vec::new()),
        Question::new("38. 其它建议", QuestionKind::Other, Vec::new()),
    ]);

    let questions = questions
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .expect("fixture questions are valid");
    QuestionSchema::new(questions).expect("fixture schema is valid")
}

/// A canonical answer for every question, with the two gates overridden.
pub(crate) fn canonical_answers(schema: &QuestionSchema, q5: &str, q35: &str) -> Vec<(String, String)> {
    schema
        .questions()
        .iter()
        .map(|q| {
            let value = match (q.number, q.kind) {
                (5, _) => q5.to_string(),
                (35, _) => q35.to_string(),
                (_, QuestionKind::SingleChoice) => "A".to_string(),
                (_, QuestionKind::MultiChoice) => "A、B".to_string(),
                (_, QuestionKind::Scale7) => "4".to_string(),
                (_, QuestionKind::Other) => "无".to_string(),
            };
            (q.column_label.clone(), value)
        })
        .collect()
}

/// A fully answered record for cluster "0".
pub(crate) fn full_record(schema: &QuestionSchema, q5: &str, q35: &str, seq: u64) -> RespondentRecord {
    let answers = canonical_answers(schema, q5, q35)
        .into_iter()
        .map(|(label, value)| Answer::new(label, value))
        .collect();
    RespondentRecord::new(answers, "0", seq)
}

/// A model reply in the expected `answers` format.
pub(crate) fn answers_reply(pairs: &[(String, String)]) -> String {
    let answers: Vec<Value> = pairs
        .iter()
        .map(|(label, value)| json!({"col_name": label, "answer": value}))
        .collect();
    json!({ "answers": answers }).to_string()
}
