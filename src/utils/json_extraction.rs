//! Pulling JSON out of model output.
//!
//! Reasoning models wrap their answer in prose or markdown fences, sometimes
//! with JSON-looking fragments in the preamble. Extraction tries, in order:
//! 1. The whole (trimmed) text
//! 2. The first fenced code block
//! 3. The largest balanced object anywhere, later occurrences winning ties
//!
//! ```
//! use survey_forge::utils::json_extraction::extract_json_object;
//!
//! let reply = "好的，结果如下：{\"answers\": []} 以上。";
//! assert_eq!(extract_json_object(reply).as_deref(), Some("{\"answers\": []}"));
//! ```

use std::sync::OnceLock;

use regex::Regex;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\n?([\s\S]*?)\n?```").expect("valid regex"))
}

/// Returns the content of the first fenced code block, or the trimmed text
/// when there is none.
pub fn strip_code_fences(text: &str) -> String {
    match fence_regex().captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Index of the `}` closing the object that `s` starts with.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parses_as_object(candidate: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(candidate),
        Ok(serde_json::Value::Object(_))
    )
}

fn balanced_object_at(content: &str, start: usize) -> Option<&str> {
    let tail = &content[start..];
    let end = find_matching_brace(tail)?;
    let candidate = &tail[..=end];
    parses_as_object(candidate).then_some(candidate)
}

/// Extracts a JSON object from free-form model output.
///
/// Returns `None` when no parsable object is present.
pub fn extract_json_object(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.starts_with('{') && parses_as_object(trimmed) {
        return Some(trimmed.to_string());
    }

    if let Some(inner) = fence_regex().captures(content).and_then(|caps| caps.get(1)) {
        let block = inner.as_str();
        if let Some(start) = block.find('{') {
            if let Some(candidate) = balanced_object_at(block, start) {
                return Some(candidate.to_string());
            }
        }
    }

    content
        .char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(|(start, _)| balanced_object_at(content, start).map(|json| (start, json)))
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_object() {
        let input = r#"{"answers": [{"col_name": "1. 年级", "answer": "A"}]}"#;
        assert_eq!(extract_json_object(input).as_deref(), Some(input));
    }

    #[test]
    fn test_json_code_block() {
        let input = "以下是问卷：\n```json\n{\"key\": \"value\"}\n```\n完毕";
        assert_eq!(
            extract_json_object(input).as_deref(),
            Some(r#"{"key": "value"}"#)
        );
    }

    #[test]
    fn test_prefers_largest_object() {
        let input = r#"例如 {"a": 1} 这样。最终答案：{"answers": [{"col_name": "5. 是否使用", "answer": "A"}]}"#;
        let json = extract_json_object(input).expect("object found");
        assert!(json.starts_with(r#"{"answers""#));
    }

    #[test]
    fn test_braces_inside_strings() {
        let input = r#"{"note": "包含 } 和 { 的文本", "ok": true}"#;
        assert_eq!(find_matching_brace(input), Some(input.len() - 1));
        assert_eq!(extract_json_object(input).as_deref(), Some(input));
    }

    #[test]
    fn test_no_json() {
        assert_eq!(extract_json_object("抱歉，我无法完成。"), None);
        assert_eq!(extract_json_object("{unterminated"), None);
        assert_eq!(extract_json_object("[1, 2, 3]"), None);
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n画像文本\n```"), "画像文本");
        assert_eq!(strip_code_fences("  纯文本  "), "纯文本");
    }
}
