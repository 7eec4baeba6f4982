use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{BenchError, BenchResult};
use crate::models::question::BenchmarkQuestion;
use crate::models::record::QuestionRecord;
use crate::models::run::Run;
use crate::pipeline::container_tag;

/// 当前写入的 checkpoint schema 版本
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// 持久化的运行状态：运行元数据 + 每道题的进度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Checkpoint {
    pub schema_version: u32,
    pub run: Run,
    pub questions: BTreeMap<String, QuestionRecord>,
}

impl Checkpoint {
    /// 从题目列表创建新的 checkpoint，所有题目处于 `Pending`
    pub fn new(run: Run, questions: &[BenchmarkQuestion]) -> BenchResult<Self> {
        let template = &run.config.container_tag_template;
        let mut records = BTreeMap::new();

        for question in questions {
            let tag = container_tag::derive(template, &question.question_id, &run.run_id)?;
            let record = QuestionRecord::new(&question.question_id, &question.question_type, tag);
            if records.insert(question.question_id.clone(), record).is_some() {
                return Err(BenchError::corrupt(
                    &run.run_id,
                    format!("题目ID重复: {}", question.question_id),
                ));
            }
        }

        let checkpoint = Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run,
            questions: records,
        };
        checkpoint
            .validate()
            .map_err(|reason| BenchError::corrupt(checkpoint.run_id(), reason))?;

        Ok(checkpoint)
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    /// 所有题目是否都已进入终止状态
    pub fn is_complete(&self) -> bool {
        self.questions.values().all(|r| r.state.is_terminal())
    }

    /// 各状态的题目数量
    pub fn state_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in self.questions.values() {
            *counts.entry(record.state.label()).or_insert(0) += 1;
        }
        counts
    }

    /// 本次运行使用过的全部 containerTag
    pub fn container_tags(&self) -> Vec<String> {
        self.questions
            .values()
            .map(|r| r.container_tag.clone())
            .collect()
    }

    /// 题目在 checkpoint 中的位置（从1开始，仅用于日志）
    pub fn position_of(&self, question_id: &str) -> usize {
        self.questions
            .keys()
            .position(|id| id == question_id)
            .map(|p| p + 1)
            .unwrap_or(0)
    }

    /// 校验所有记录的阶段顺序与 containerTag 唯一性
    pub fn validate(&self) -> Result<(), String> {
        let mut tags = std::collections::HashSet::new();
        for (id, record) in &self.questions {
            if id != &record.question_id {
                return Err(format!("题目键 {} 与记录 {} 不一致", id, record.question_id));
            }
            if record.container_tag.is_empty() {
                return Err(format!("题目 {} 缺少 containerTag", id));
            }
            if !tags.insert(record.container_tag.as_str()) {
                return Err(format!("containerTag 重复: {}", record.container_tag));
            }
            record.check_phase_order()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::PhaseState;
    use crate::models::run::RunConfigSnapshot;

    fn question(id: &str) -> BenchmarkQuestion {
        BenchmarkQuestion {
            question_id: id.to_string(),
            question_type: "multi-session".to_string(),
            question: "?".to_string(),
            answer: "!".to_string(),
            question_date: None,
            sessions: Vec::new(),
        }
    }

    #[test]
    fn test_new_checkpoint_starts_pending() {
        let run = Run::new("r1", "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let cp = Checkpoint::new(run, &[question("a"), question("b")]).unwrap();

        assert_eq!(cp.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(cp.questions.len(), 2);
        assert!(cp
            .questions
            .values()
            .all(|r| r.state == PhaseState::Pending));
        assert_eq!(cp.questions["a"].container_tag, "a-r1");
        assert_eq!(cp.position_of("b"), 2);
        assert!(cp.validate().is_ok());
        assert!(!cp.is_complete());
    }

    #[test]
    fn test_ids_containing_placeholders_get_distinct_tags() {
        let run = Run::new("r", "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let cp = Checkpoint::new(run, &[question("r"), question("{runId}")]).unwrap();

        assert_eq!(cp.questions["r"].container_tag, "r-r");
        assert_eq!(cp.questions["{runId}"].container_tag, "{runId}-r");
        assert!(cp.validate().is_ok());
    }

    #[test]
    fn test_new_rejects_duplicate_question_ids() {
        let run = Run::new("r1", "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let err = Checkpoint::new(run, &[question("a"), question("a")]).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_validate_rejects_duplicate_tags() {
        let run = Run::new("r1", "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let mut cp = Checkpoint::new(run, &[question("a"), question("b")]).unwrap();
        cp.questions.get_mut("b").unwrap().container_tag = "a-r1".to_string();
        assert!(cp.validate().is_err());
    }
}
