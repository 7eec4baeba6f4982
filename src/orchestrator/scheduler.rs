//! 批量调度器 - 编排层
//!
//! 不分批次：任意一个调用结束就立即放入下一道可推进的题目，
//! 在途调用数量始终不超过 K。每道题按自己的阶段顺序独立推进。

use std::collections::{HashSet, VecDeque};

use crate::models::Checkpoint;
use crate::pipeline::RetryPolicy;

/// 当前可推进的题目：非终止状态，且下一阶段的尝试次数未用尽
pub fn eligible(checkpoint: &Checkpoint, policy: &RetryPolicy) -> Vec<String> {
    checkpoint
        .questions
        .values()
        .filter(|record| match record.state.next_phase() {
            Some(phase) => !policy.exhausted(record.attempts_for(phase)),
            None => false,
        })
        .map(|record| record.question_id.clone())
        .collect()
}

/// 尝试次数已用尽但尚未标记为失败的题目（例如调小了 max_attempts 后恢复）
pub fn exhausted(checkpoint: &Checkpoint, policy: &RetryPolicy) -> Vec<String> {
    checkpoint
        .questions
        .values()
        .filter(|record| match record.state.next_phase() {
            Some(phase) => policy.exhausted(record.attempts_for(phase)),
            None => false,
        })
        .map(|record| record.question_id.clone())
        .collect()
}

/// 有界的连续准入队列
///
/// 同一道题不会同时出现在队列和在途集合中，因此同一题目永远不会被并发推进。
#[derive(Debug)]
pub struct BatchScheduler {
    limit: usize,
    queue: VecDeque<String>,
    queued: HashSet<String>,
    in_flight: HashSet<String>,
}

impl BatchScheduler {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
        }
    }

    /// 加入待推进的题目，已在队列或在途的会被忽略
    pub fn refill(&mut self, question_ids: impl IntoIterator<Item = String>) {
        for id in question_ids {
            if self.in_flight.contains(&id) || self.queued.contains(&id) {
                continue;
            }
            self.queued.insert(id.clone());
            self.queue.push_back(id);
        }
    }

    /// 有空位时取出下一道题并标记为在途
    pub fn admit(&mut self) -> Option<String> {
        if self.in_flight.len() >= self.limit {
            return None;
        }
        let id = self.queue.pop_front()?;
        self.queued.remove(&id);
        self.in_flight.insert(id.clone());
        Some(id)
    }

    /// 调用结束（结果已保存）后释放空位
    pub fn complete(&mut self, question_id: &str) {
        self.in_flight.remove(question_id);
    }

    /// 题目仍可推进时放回队尾
    pub fn requeue(&mut self, question_id: String) {
        self.complete(&question_id);
        self.refill(std::iter::once(question_id));
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }
}
