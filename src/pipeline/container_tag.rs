//! containerTag 推导
//!
//! containerTag 是 Provider 侧隔离每道题数据的键，对编排层不透明。
//! 它是 (questionId, runId) 的纯函数，重试时会指向同一份 Provider 资源。

use crate::error::{BenchError, BenchResult};

pub const DEFAULT_TEMPLATE: &str = "{questionId}-{runId}";

const QUESTION_ID: &str = "{questionId}";
const RUN_ID: &str = "{runId}";

/// 校验模板：必须同时包含 `{questionId}` 和 `{runId}`，否则无法保证唯一性
pub fn validate_template(template: &str) -> BenchResult<()> {
    if !template.contains(QUESTION_ID) || !template.contains(RUN_ID) {
        return Err(BenchError::Config(format!(
            "containerTag 模板必须同时包含 {} 和 {}: {}",
            QUESTION_ID, RUN_ID, template
        )));
    }
    Ok(())
}

/// 按模板推导 containerTag
///
/// 从左到右单次替换，题目ID或运行ID里出现的占位符原样保留
pub fn derive(template: &str, question_id: &str, run_id: &str) -> BenchResult<String> {
    validate_template(template)?;

    let mut tag = String::with_capacity(template.len() + question_id.len() + run_id.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        tag.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix(QUESTION_ID) {
            tag.push_str(question_id);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(RUN_ID) {
            tag.push_str(run_id);
            rest = after;
        } else {
            tag.push('{');
            rest = &tail[1..];
        }
    }
    tag.push_str(rest);

    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        assert_eq!(derive(DEFAULT_TEMPLATE, "q7", "run-1").unwrap(), "q7-run-1");
    }

    #[test]
    fn test_custom_template_is_stable() {
        let template = "bench_{runId}_{questionId}";
        let first = derive(template, "q7", "r").unwrap();
        let second = derive(template, "q7", "r").unwrap();
        assert_eq!(first, "bench_r_q7");
        assert_eq!(first, second);
        assert_ne!(first, derive(template, "q8", "r").unwrap());
    }

    #[test]
    fn test_placeholder_inside_ids_is_not_expanded() {
        assert_eq!(derive(DEFAULT_TEMPLATE, "{runId}", "r").unwrap(), "{runId}-r");
        assert_eq!(derive(DEFAULT_TEMPLATE, "q", "{questionId}").unwrap(), "q-{questionId}");
        assert_ne!(
            derive(DEFAULT_TEMPLATE, "r", "r").unwrap(),
            derive(DEFAULT_TEMPLATE, "{runId}", "r").unwrap()
        );
    }

    #[test]
    fn test_literal_braces_are_kept() {
        let template = "{x}{questionId}/{runId}{";
        assert_eq!(derive(template, "q", "r").unwrap(), "{x}q/r{");
    }

    #[test]
    fn test_template_must_contain_both_ids() {
        assert!(derive("{questionId}", "q", "r").is_err());
        assert!(derive("static", "q", "r").is_err());
    }
}
