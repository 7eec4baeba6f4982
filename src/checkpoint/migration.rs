//! Checkpoint 编解码与 schema 升级
//!
//! ## 版本
//! - v1：记录只有单个 `retries` 计数，没有 `attempts` / `durationsMs`，没有 `schemaVersion` 字段
//! - v2：当前版本
//!
//! 更新的版本、未知字段、违反阶段顺序的记录一律视为损坏，不做任何猜测。

use serde_json::{json, Map, Value as JsonValue};

use crate::error::{BenchError, BenchResult};
use crate::models::{Checkpoint, PhaseState, CURRENT_SCHEMA_VERSION};

/// 序列化 checkpoint
pub fn encode(checkpoint: &Checkpoint) -> BenchResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(checkpoint)?)
}

/// 反序列化 checkpoint，必要时升级旧版本
pub fn decode(run_id: &str, bytes: &[u8]) -> BenchResult<Checkpoint> {
    let mut value: JsonValue = serde_json::from_slice(bytes)
        .map_err(|e| BenchError::corrupt(run_id, format!("JSON 解析失败: {}", e)))?;

    let version = match value.get("schemaVersion") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| BenchError::corrupt(run_id, format!("schemaVersion 不合法: {}", v)))?,
    };

    match version {
        1 => upgrade_v1(run_id, &mut value)?,
        CURRENT_SCHEMA_VERSION => {}
        other => {
            return Err(BenchError::corrupt(
                run_id,
                format!(
                    "不支持的 schema 版本 {} (当前版本 {})",
                    other, CURRENT_SCHEMA_VERSION
                ),
            ))
        }
    }

    let checkpoint: Checkpoint = serde_json::from_value(value)
        .map_err(|e| BenchError::corrupt(run_id, format!("字段不匹配: {}", e)))?;

    if checkpoint.run.run_id != run_id {
        return Err(BenchError::corrupt(
            run_id,
            format!("记录中的 runId 为 {}", checkpoint.run.run_id),
        ));
    }

    checkpoint
        .validate()
        .map_err(|reason| BenchError::corrupt(run_id, reason))?;

    Ok(checkpoint)
}

/// v1 → v2：`retries` 归入当前阶段的 `attempts`，补齐 `durationsMs`
fn upgrade_v1(run_id: &str, value: &mut JsonValue) -> BenchResult<()> {
    let root = value
        .as_object_mut()
        .ok_or_else(|| BenchError::corrupt(run_id, "顶层不是对象"))?;

    let questions = root
        .get_mut("questions")
        .and_then(JsonValue::as_object_mut)
        .ok_or_else(|| BenchError::corrupt(run_id, "缺少 questions 字段"))?;

    for (id, record) in questions.iter_mut() {
        let record = record
            .as_object_mut()
            .ok_or_else(|| BenchError::corrupt(run_id, format!("题目 {} 不是对象", id)))?;

        let retries = match record.remove("retries") {
            None => 0,
            Some(v) => v.as_u64().ok_or_else(|| {
                BenchError::corrupt(run_id, format!("题目 {} 的 retries 不合法", id))
            })?,
        };

        let state: PhaseState = record
            .get("state")
            .cloned()
            .ok_or_else(|| BenchError::corrupt(run_id, format!("题目 {} 缺少 state", id)))
            .and_then(|s| {
                serde_json::from_value(s).map_err(|e| {
                    BenchError::corrupt(run_id, format!("题目 {} 的 state 不合法: {}", id, e))
                })
            })?;

        let mut attempts = Map::new();
        if retries > 0 {
            if let Some(phase) = state.next_phase() {
                attempts.insert(phase.name().to_string(), json!(retries));
            }
        }
        record.insert("attempts".to_string(), JsonValue::Object(attempts));
        record
            .entry("durationsMs".to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }

    root.insert("schemaVersion".to_string(), json!(CURRENT_SCHEMA_VERSION));
    tracing::info!("[run {}] checkpoint 已从 v1 升级到 v{}", run_id, CURRENT_SCHEMA_VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkQuestion, Phase, Run, RunConfigSnapshot};

    fn checkpoint() -> Checkpoint {
        let run = Run::new("r1", "local", "longmemeval", "openai", RunConfigSnapshot::default());
        let q = BenchmarkQuestion {
            question_id: "q1".to_string(),
            question_type: "temporal-reasoning".to_string(),
            question: "?".to_string(),
            answer: "!".to_string(),
            question_date: None,
            sessions: Vec::new(),
        };
        Checkpoint::new(run, &[q]).unwrap()
    }

    #[test]
    fn test_encode_decode_current_version() {
        let cp = checkpoint();
        let bytes = encode(&cp).unwrap();
        assert_eq!(decode("r1", &bytes).unwrap(), cp);
    }

    #[test]
    fn test_upgrade_v1_moves_retries_into_attempts() {
        let mut value = serde_json::to_value(checkpoint()).unwrap();
        value.as_object_mut().unwrap().remove("schemaVersion");
        let record = value["questions"]["q1"].as_object_mut().unwrap();
        record.remove("attempts");
        record.remove("durationsMs");
        record.insert("retries".to_string(), json!(2));

        let cp = decode("r1", &serde_json::to_vec(&value).unwrap()).unwrap();
        assert_eq!(cp.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(cp.questions["q1"].attempts_for(Phase::Ingest), 2);
        assert!(cp.questions["q1"].durations_ms.is_empty());
    }

    #[test]
    fn test_newer_version_is_corrupt() {
        let mut value = serde_json::to_value(checkpoint()).unwrap();
        value["schemaVersion"] = json!(CURRENT_SCHEMA_VERSION + 1);
        let err = decode("r1", &serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_unknown_field_is_corrupt() {
        let mut value = serde_json::to_value(checkpoint()).unwrap();
        value["questions"]["q1"]["hypotheses"] = json!(["typo"]);
        let err = decode("r1", &serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_phase_order_violation_is_corrupt() {
        let mut value = serde_json::to_value(checkpoint()).unwrap();
        value["questions"]["q1"]["hypothesis"] = json!("提前出现的答案");
        let err = decode("r1", &serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let bytes = encode(&checkpoint()).unwrap();
        let err = decode("r1", &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }

    #[test]
    fn test_mismatched_run_id_is_corrupt() {
        let bytes = encode(&checkpoint()).unwrap();
        let err = decode("other", &bytes).unwrap_err();
        assert!(matches!(err, BenchError::CheckpointCorrupt { .. }));
    }
}
