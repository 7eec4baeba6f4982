//! 失败分类
//!
//! 将阶段调用抛出的错误映射为 {transient, fatal}。默认策略偏保守：
//! 超时、限流、5xx 视为可重试；输入错误、认证失败、资源不存在视为致命。
//! Provider 可以通过 `Provider::classify` 覆盖该策略。

use serde::{Deserialize, Serialize};

use crate::error::PhaseError;
use crate::models::Phase;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureClass {
    /// 可在有限次数内重试
    Transient,
    /// 题目立即进入 `Failed`
    Fatal,
}

/// 失败分类器，纯函数 (phase, error) -> class
pub trait FailureClassifier: Send + Sync {
    fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass;
}

/// 默认分类策略
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl FailureClassifier for DefaultClassifier {
    fn classify(&self, phase: Phase, error: &PhaseError) -> FailureClass {
        match error {
            PhaseError::Timeout { .. }
            | PhaseError::RateLimited { .. }
            | PhaseError::IndexingTimeout { .. } => FailureClass::Transient,

            PhaseError::Server { status, .. } => match status {
                408 | 429 | 500..=599 => FailureClass::Transient,
                _ => FailureClass::Fatal,
            },

            // 模型输出不稳定，重新生成通常可以解决
            PhaseError::MalformedResponse(_) => match phase {
                Phase::Answer | Phase::Evaluate => FailureClass::Transient,
                _ => FailureClass::Fatal,
            },

            PhaseError::MalformedInput(_)
            | PhaseError::Unauthorized(_)
            | PhaseError::NotFound(_)
            | PhaseError::Other(_) => FailureClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(phase: Phase, error: PhaseError) -> FailureClass {
        DefaultClassifier.classify(phase, &error)
    }

    #[test]
    fn test_network_conditions_are_transient() {
        assert_eq!(
            classify(Phase::Ingest, PhaseError::timeout("ingest", 1000)),
            FailureClass::Transient
        );
        assert_eq!(
            classify(Phase::Search, PhaseError::RateLimited { retry_after_secs: Some(3) }),
            FailureClass::Transient
        );
        assert_eq!(
            classify(Phase::Search, PhaseError::server(503, "unavailable")),
            FailureClass::Transient
        );
        assert_eq!(
            classify(
                Phase::Index,
                PhaseError::IndexingTimeout {
                    container_tag: "t".to_string(),
                    waited_ms: 10
                }
            ),
            FailureClass::Transient
        );
    }

    #[test]
    fn test_client_errors_are_fatal() {
        assert_eq!(
            classify(Phase::Ingest, PhaseError::server(400, "bad request")),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(Phase::Ingest, PhaseError::Unauthorized("key".to_string())),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(Phase::Search, PhaseError::NotFound("container".to_string())),
            FailureClass::Fatal
        );
        assert_eq!(
            classify(Phase::Ingest, PhaseError::MalformedInput("empty".to_string())),
            FailureClass::Fatal
        );
    }

    #[test]
    fn test_malformed_response_depends_on_phase() {
        let err = || PhaseError::MalformedResponse("not json".to_string());
        assert_eq!(classify(Phase::Evaluate, err()), FailureClass::Transient);
        assert_eq!(classify(Phase::Answer, err()), FailureClass::Transient);
        assert_eq!(classify(Phase::Search, err()), FailureClass::Fatal);
    }
}
