use crate::error::{BenchError, BenchResult};
use crate::models::question::{deserialize_answer, BenchmarkQuestion, Message, Session};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 数据集文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// 本项目格式：`sessions` 为对象数组
    Native,
    /// LongMemEval 格式：`haystack_sessions` 与 `haystack_session_ids` / `haystack_dates` 平行
    LongMemEval,
}

#[derive(Debug, Deserialize)]
struct LongMemEvalQuestion {
    question_id: String,
    question_type: String,
    question: String,
    #[serde(deserialize_with = "deserialize_answer")]
    answer: String,
    #[serde(default)]
    question_date: Option<String>,
    #[serde(default)]
    haystack_session_ids: Vec<String>,
    #[serde(default)]
    haystack_dates: Vec<String>,
    #[serde(default)]
    haystack_sessions: Vec<Vec<Message>>,
}

impl From<LongMemEvalQuestion> for BenchmarkQuestion {
    fn from(raw: LongMemEvalQuestion) -> Self {
        let sessions = raw
            .haystack_sessions
            .into_iter()
            .enumerate()
            .map(|(i, messages)| Session {
                session_id: raw
                    .haystack_session_ids
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| format!("session_{}", i + 1)),
                date: raw.haystack_dates.get(i).cloned(),
                messages,
            })
            .collect();

        Self {
            question_id: raw.question_id,
            question_type: raw.question_type,
            question: raw.question,
            answer: raw.answer,
            question_date: raw.question_date,
            sessions,
        }
    }
}

/// 从 JSON 文件加载数据集
pub async fn load_questions(path: &Path, format: DatasetFormat) -> BenchResult<Vec<BenchmarkQuestion>> {
    let path_str = path.display().to_string();

    let content = fs::read_to_string(path)
        .await
        .map_err(|e| BenchError::dataset(&path_str, format!("无法读取文件: {}", e)))?;

    let questions: Vec<BenchmarkQuestion> = match format {
        DatasetFormat::Native => serde_json::from_str(&content)
            .map_err(|e| BenchError::dataset(&path_str, format!("无法解析JSON: {}", e)))?,
        DatasetFormat::LongMemEval => {
            let raw: Vec<LongMemEvalQuestion> = serde_json::from_str(&content)
                .map_err(|e| BenchError::dataset(&path_str, format!("无法解析JSON: {}", e)))?;
            raw.into_iter().map(BenchmarkQuestion::from).collect()
        }
    };

    // 题目ID必须唯一，否则 containerTag 会冲突
    let mut seen = std::collections::HashSet::new();
    for q in &questions {
        if !seen.insert(q.question_id.as_str()) {
            return Err(BenchError::dataset(
                &path_str,
                format!("题目ID重复: {}", q.question_id),
            ));
        }
    }

    tracing::info!("成功加载 {} 个题目: {}", questions.len(), path_str);

    Ok(questions)
}
