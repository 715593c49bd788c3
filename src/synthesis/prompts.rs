//! Prompt templates for persona and questionnaire synthesis.
//!
//! User templates use Tera placeholders (`{{ NAME }}`) and are rendered with
//! autoescaping disabled, so survey text passes through verbatim.

use tera::{Context, Tera};

use crate::llm::Message;

/// A rendered system + user prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyPrompt {
    /// System prompt establishing the model's role.
    pub system: String,
    /// User prompt carrying the rendered task.
    pub user: String,
}

impl SurveyPrompt {
    /// Creates a new prompt pair.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Chat messages for this prompt.
    pub fn messages(&self) -> Vec<Message> {
        vec![Message::system(&self.system), Message::user(&self.user)]
    }
}

/// System prompt for choosing persona dimensions.
pub const PERSONA_ASPECT_SYSTEM: &str = r#"你是一名教育调查研究专家，擅长根据问卷结构提炼用户画像的维度。

请只输出一个 JSON 对象，不要输出任何解释，格式为：
{"base_attributes": ["..."], "cognitive_traits": ["..."], "behavior_patterns": ["..."]}

- base_attributes：人口学与基本属性（如年级、专业）
- cognitive_traits：认知与态度（如对AIGC的了解程度、信任程度）
- behavior_patterns：行为习惯（如使用频率、使用场景）
每组给出不超过三个维度，维度名称必须能从问卷题目中推断。"#;

/// User template for choosing persona dimensions.
pub const PERSONA_ASPECT_USER: &str = r#"以下是一份高校学生AIGC使用情况调查问卷的全部题目：

{{ HEADERS }}

请给出适合描述该问卷受访者的人物画像维度。"#;

/// System prompt for writing one cluster persona.
pub const PERSONA_GENERATION_SYSTEM: &str = r#"你是一名用户研究员，需要根据一个聚类的代表性问卷为该类受访者撰写典型用户画像。

请只输出一个 JSON 对象，键为画像维度名称，值为简洁的中文描述，不要输出任何解释。"#;

/// User template for writing one cluster persona.
pub const PERSONA_GENERATION_USER: &str = r#"画像维度：
{{ DIMENSION_SCHEMA }}

聚类概况：{{ CLUSTER_PROFILE }}

代表性问卷作答：
{{ SAMPLE_ANSWERS }}

请据此输出该聚类的典型用户画像。"#;

/// System prompt for filling one questionnaire.
pub const QUESTIONNAIRE_SYSTEM: &str = r#"你是一名正在填写问卷的中国大学生。请完全代入给定的人物画像，像真人一样作答。

作答规则：
1. 单选题只填一个大写字母，如 "A"。
2. 多选题填多个大写字母，用 "、" 分隔，如 "A、C"。
3. 量表题填 1 到 7 的数字，1 表示非常不同意，7 表示非常同意。
4. 第5题选 "B"（从未使用）时，第6至36题全部填 "(跳过)"。
5. 第35题选 "B" 时，第36题填 "(跳过)"。

只输出一个 JSON 对象，不要输出任何解释，格式为：
{"answers": [{"col_name": "题目原文", "answer": "答案"}]}"#;

/// User template for filling one questionnaire.
pub const QUESTIONNAIRE_USER: &str = r#"人物画像：
{{ PERSONA_TEXT }}

问卷题目：
{{ QUESTION_TEXT }}

请以该人物的身份完成全部题目。"#;

fn render(template: &str, context: &Context) -> Result<String, tera::Error> {
    Tera::one_off(template, context, false)
}

/// Builds the persona-dimension prompt from the survey's column labels.
pub fn build_aspect_prompt(headers: &[String]) -> Result<SurveyPrompt, tera::Error> {
    let mut context = Context::new();
    context.insert("HEADERS", &headers.join("\n"));
    Ok(SurveyPrompt::new(
        PERSONA_ASPECT_SYSTEM,
        render(PERSONA_ASPECT_USER, &context)?,
    ))
}

/// Builds the persona prompt for one cluster.
///
/// # Arguments
///
/// * `dimension_schema` - JSON text describing the persona dimensions
/// * `cluster_profile` - One-line cluster summary
/// * `sample_answers` - The representative respondent as `label: answer` lines
pub fn build_persona_prompt(
    dimension_schema: &str,
    cluster_profile: &str,
    sample_answers: &str,
) -> Result<SurveyPrompt, tera::Error> {
    let mut context = Context::new();
    context.insert("DIMENSION_SCHEMA", dimension_schema);
    context.insert("CLUSTER_PROFILE", cluster_profile);
    context.insert("SAMPLE_ANSWERS", sample_answers);
    Ok(SurveyPrompt::new(
        PERSONA_GENERATION_SYSTEM,
        render(PERSONA_GENERATION_USER, &context)?,
    ))
}

/// Builds the questionnaire prompt for one persona.
pub fn build_questionnaire_prompt(
    persona_text: &str,
    question_text: &str,
) -> Result<SurveyPrompt, tera::Error> {
    let mut context = Context::new();
    context.insert("PERSONA_TEXT", persona_text);
    context.insert("QUESTION_TEXT", question_text);
    Ok(SurveyPrompt::new(
        QUESTIONNAIRE_SYSTEM,
        render(QUESTIONNAIRE_USER, &context)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questionnaire_prompt_embeds_persona_and_questions() {
        let prompt = build_questionnaire_prompt(
            "年级: 大二\n专业: 理工科",
            "1. 您的年级\n选项：A. 大一、B. 大二",
        )
        .expect("renders");

        assert!(prompt.user.contains("年级: 大二"));
        assert!(prompt.user.contains("选项：A. 大一、B. 大二"));
        assert!(!prompt.user.contains("{{"));
        assert_eq!(prompt.messages().len(), 2);
        assert_eq!(prompt.messages()[0].role, "system");
    }

    #[test]
    fn test_values_are_not_escaped() {
        let prompt = build_persona_prompt(r#"{"base_attributes": ["年级"]}"#, "这是第0个聚类，样本量=3", "1. 年级: A & B")
            .expect("renders");
        assert!(prompt.user.contains(r#"{"base_attributes": ["年级"]}"#));
        assert!(prompt.user.contains("A & B"));
    }

    #[test]
    fn test_aspect_prompt_lists_headers() {
        let headers = vec!["1. 年级".to_string(), "2. 专业".to_string()];
        let prompt = build_aspect_prompt(&headers).expect("renders");
        assert!(prompt.user.contains("1. 年级\n2. 专业"));
    }
}
