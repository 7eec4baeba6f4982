//! 回答与评测的 prompt 构建、裁判响应解析

use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{PhaseError, PhaseResult};
use crate::models::{BenchmarkQuestion, Evaluation};

/// 构建回答 prompt：检索到的上下文 + 问题
pub fn build_answer_prompt(question: &BenchmarkQuestion, search_results: &[JsonValue]) -> String {
    let context = if search_results.is_empty() {
        "（没有检索到相关记忆）".to_string()
    } else {
        search_results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}", i + 1, render_result(r)))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let date_line = question
        .question_date
        .as_deref()
        .map(|d| format!("当前日期：{}\n", d))
        .unwrap_or_default();

    format!(
        r#"你是一个根据历史对话记忆回答问题的助手。

以下是从记忆系统中检索到的相关内容：
{}

{}问题：{}

请只根据上面的记忆内容简洁地回答问题。如果记忆中没有足够的信息，请回答"我不知道"。"#,
        context, date_line, question.question
    )
}

/// 构建裁判 prompt：要求返回 JSON `{"label": 0|1, "explanation": "..."}`
pub fn build_judge_prompt(question: &BenchmarkQuestion, hypothesis: &str) -> String {
    format!(
        r#"你是一个严格的评测裁判，需要判断模型回答是否与标准答案一致。

题型：{}
问题：{}
标准答案：{}
模型回答：{}

【判断标准】
- 回答包含标准答案的关键信息即视为正确，措辞可以不同
- 回答与标准答案矛盾、缺少关键信息或回答"不知道"视为错误
- 时间类问题允许一天以内的误差

只返回如下 JSON，不要返回任何其他内容：
{{"label": 1 或 0, "explanation": "一句话理由"}}"#,
        question.question_type, question.question, question.answer, hypothesis
    )
}

/// 检索结果通常是对象，优先取其中的文本字段
fn render_result(result: &JsonValue) -> String {
    for key in ["content", "memory", "text", "chunk"] {
        if let Some(text) = result.get(key).and_then(JsonValue::as_str) {
            return text.to_string();
        }
    }
    match result {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct JudgeVerdict {
    label: JsonValue,
    #[serde(default)]
    explanation: String,
}

fn json_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)\{.*\}").ok())
        .as_ref()
}

/// 解析裁判响应
///
/// 先尝试提取 JSON（允许包裹在代码块或说明文字中），
/// 失败后退回到首个单词 yes/no/correct/incorrect 的判断。
pub fn parse_judge_response(response: &str) -> PhaseResult<Evaluation> {
    let response = response.trim();

    if let Some(m) = json_object_pattern().and_then(|re| re.find(response)) {
        if let Ok(verdict) = serde_json::from_str::<JudgeVerdict>(m.as_str()) {
            let label = match &verdict.label {
                JsonValue::Number(n) => n.as_u64(),
                JsonValue::Bool(b) => Some(u64::from(*b)),
                JsonValue::String(s) => s.trim().parse::<u64>().ok(),
                _ => None,
            };
            if let Some(label @ (0 | 1)) = label {
                return Ok(Evaluation {
                    label: label as u8,
                    explanation: verdict.explanation,
                });
            }
        }
    }

    let first_word = response
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .unwrap_or_default();

    let label = match first_word.as_str() {
        "yes" | "correct" | "1" | "正确" => 1,
        "no" | "incorrect" | "wrong" | "0" | "错误" => 0,
        _ => {
            debug!("无法解析裁判响应: '{}'", response);
            return Err(PhaseError::MalformedResponse(format!(
                "裁判响应无法解析: {}",
                crate::utils::logging::truncate_text(response, 120)
            )));
        }
    };

    Ok(Evaluation {
        label,
        explanation: response.to_string(),
    })
}
