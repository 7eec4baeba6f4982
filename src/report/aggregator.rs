//! 报告聚合
//!
//! 纯函数：同一个 checkpoint 永远得到同一份报告。
//! 失败的题目单独计数，不进入准确率分母。

use std::collections::BTreeMap;

use crate::models::{
    Checkpoint, FailureEntry, LatencyStats, Phase, PhaseState, PhaseStats, QuestionRecord, Report,
    ReportSummary, TypeStats,
};

/// 总延迟在报告中的键
pub const TOTAL_LATENCY_KEY: &str = "total";

pub fn aggregate(checkpoint: &Checkpoint) -> Report {
    let mut summary = ReportSummary::default();
    let mut by_type: BTreeMap<String, TypeStats> = BTreeMap::new();
    let mut by_phase: BTreeMap<Phase, PhaseStats> =
        Phase::ALL.iter().map(|p| (*p, PhaseStats::default())).collect();
    let mut samples: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    let mut failures = Vec::new();

    for record in checkpoint.questions.values() {
        let type_stats = by_type.entry(record.question_type.clone()).or_default();
        summary.total += 1;
        type_stats.total += 1;

        let correct = is_correct(record);
        if record.state.reached_evaluation() {
            summary.evaluated += 1;
            type_stats.evaluated += 1;
            if correct {
                summary.correct += 1;
                type_stats.correct += 1;
            }
        }

        match &record.state {
            PhaseState::Reported => summary.reported += 1,
            PhaseState::Failed { phase, reason } => {
                summary.failed += 1;
                type_stats.failed += 1;
                failures.push(FailureEntry {
                    question_id: record.question_id.clone(),
                    question_type: record.question_type.clone(),
                    phase: *phase,
                    reason: reason.clone(),
                });
            }
            _ => summary.in_progress += 1,
        }

        // ========== 按阶段统计 ==========
        let progress = record.state.progress();
        for phase in Phase::ALL {
            let stats = by_phase.entry(phase).or_default();
            if progress > phase.index() {
                stats.succeeded += 1;
            }
            if matches!(&record.state, PhaseState::Failed { phase: failed, .. } if *failed == phase) {
                stats.failed += 1;
            }
        }

        for (phase, ms) in &record.durations_ms {
            samples.entry(phase.name().to_string()).or_default().push(*ms);
        }
        if record.state == PhaseState::Reported {
            samples
                .entry(TOTAL_LATENCY_KEY.to_string())
                .or_default()
                .push(record.durations_ms.values().sum());
        }
    }

    summary.accuracy = ratio(summary.correct, summary.evaluated);
    for stats in by_type.values_mut() {
        stats.accuracy = ratio(stats.correct, stats.evaluated);
    }

    let latency = samples
        .into_iter()
        .map(|(key, values)| (key, latency_stats(values)))
        .collect();

    Report {
        run_id: checkpoint.run.run_id.clone(),
        provider: checkpoint.run.provider.clone(),
        benchmark: checkpoint.run.benchmark.clone(),
        judge: checkpoint.run.judge.clone(),
        summary,
        by_type,
        by_phase,
        latency,
        failures,
    }
}

/// 只有到达评测且未失败的题目才可能被计为正确
fn is_correct(record: &QuestionRecord) -> bool {
    record.state.reached_evaluation()
        && record
            .evaluation
            .as_ref()
            .map(|e| e.is_correct())
            .unwrap_or(false)
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// 最近秩法计算分位数
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn latency_stats(mut values: Vec<u64>) -> LatencyStats {
    if values.is_empty() {
        return LatencyStats::default();
    }
    values.sort_unstable();

    let count = values.len();
    let sum: u64 = values.iter().sum();

    LatencyStats {
        count,
        min: values[0],
        max: values[count - 1],
        mean: sum as f64 / count as f64,
        median: percentile(&values, 50.0),
        p95: percentile(&values, 95.0),
        p99: percentile(&values, 99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BenchmarkQuestion, Evaluation, IngestResult, Run, RunConfigSnapshot};

    fn checkpoint(types: &[(&str, &str)]) -> Checkpoint {
        let questions: Vec<BenchmarkQuestion> = types
            .iter()
            .map(|(id, ty)| BenchmarkQuestion {
                question_id: id.to_string(),
                question_type: ty.to_string(),
                question: "?".to_string(),
                answer: "!".to_string(),
                question_date: None,
                sessions: Vec::new(),
            })
            .collect();
        let run = Run::new("run-agg", "local", "custom", "openai", RunConfigSnapshot::default());
        Checkpoint::new(run, &questions).unwrap()
    }

    fn finish(record: &mut QuestionRecord, label: u8, base_ms: u64) {
        record.ingest_result = Some(IngestResult::default());
        record.search_results = Some(Vec::new());
        record.hypothesis = Some("h".to_string());
        record.evaluation = Some(Evaluation {
            label,
            explanation: String::new(),
        });
        for (i, phase) in Phase::ALL.iter().enumerate() {
            record.durations_ms.insert(*phase, base_ms + i as u64);
        }
        record.state = PhaseState::Reported;
    }

    #[test]
    fn test_accuracy_for_three_reported_questions() {
        let mut cp = checkpoint(&[("a", "t1"), ("b", "t1"), ("c", "t2")]);
        for (id, label) in [("a", 1), ("b", 1), ("c", 0)] {
            finish(cp.questions.get_mut(id).unwrap(), label, 10);
        }

        let report = aggregate(&cp);
        assert_eq!(report.summary.reported, 3);
        assert_eq!(report.summary.evaluated, 3);
        assert_eq!(report.summary.correct, 2);
        assert_eq!(report.accuracy_percent(), "66.7%");
        assert_eq!(report.by_type["t1"].accuracy, 1.0);
        assert_eq!(report.by_type["t2"].accuracy, 0.0);
        assert_eq!(report.by_phase[&Phase::Report].succeeded, 3);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_failed_questions_are_excluded_from_denominator() {
        let mut cp = checkpoint(&[("a", "t1"), ("b", "t1"), ("c", "t1")]);
        finish(cp.questions.get_mut("a").unwrap(), 1, 10);
        {
            let b = cp.questions.get_mut("b").unwrap();
            b.ingest_result = Some(IngestResult::default());
            b.state = PhaseState::Failed {
                phase: Phase::Search,
                reason: "资源不存在".to_string(),
            };
        }

        let report = aggregate(&cp);
        assert_eq!(report.summary.evaluated, 1);
        assert_eq!(report.summary.accuracy, 1.0);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.in_progress, 1);
        assert_eq!(report.by_type["t1"].failed, 1);
        assert_eq!(report.by_phase[&Phase::Search].failed, 1);
        assert_eq!(report.by_phase[&Phase::Ingest].succeeded, 2);
        assert_eq!(report.failures[0].question_id, "b");
        assert_eq!(report.failures[0].phase, Phase::Search);
    }

    #[test]
    fn test_no_evaluations_gives_zero_accuracy() {
        let report = aggregate(&checkpoint(&[("a", "t1")]));
        assert_eq!(report.summary.accuracy, 0.0);
        assert_eq!(report.accuracy_percent(), "0.0%");
        assert!(report.latency.is_empty());
    }

    #[test]
    fn test_latency_percentiles() {
        let stats = latency_stats((1..=100).collect());
        assert_eq!(stats.count, 100);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.max, 100);
        assert_eq!(stats.median, 50);
        assert_eq!(stats.p95, 95);
        assert_eq!(stats.p99, 99);
        assert!((stats.mean - 50.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_total_latency_sums_phases() {
        let mut cp = checkpoint(&[("a", "t1")]);
        finish(cp.questions.get_mut("a").unwrap(), 1, 10);

        let report = aggregate(&cp);
        // 10 + 11 + ... + 15
        assert_eq!(report.latency[TOTAL_LATENCY_KEY].max, 75);
        assert_eq!(report.latency["search"].count, 1);
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let mut cp = checkpoint(&[("a", "t1"), ("b", "t2")]);
        finish(cp.questions.get_mut("a").unwrap(), 1, 3);
        assert_eq!(aggregate(&cp), aggregate(&cp));
    }
}
