//! 名称 → 构造函数的静态注册表
//!
//! 启动时按名称解析一次，之后编排层只持有 trait 对象。

use phf::phf_map;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{BenchError, BenchResult};
use crate::models::DatasetFormat;
use crate::services::benchmark::{Benchmark, JsonBenchmark};
use crate::services::llm_service::LlmService;
use crate::services::local_provider::LocalProvider;
use crate::services::provider::{Generator, Provider};

pub type ProviderFactory = fn(&Config) -> BenchResult<Arc<dyn Provider>>;
pub type GeneratorFactory = fn(&Config) -> BenchResult<Arc<dyn Generator>>;
pub type BenchmarkFactory = fn(&Path) -> Arc<dyn Benchmark>;

static PROVIDERS: phf::Map<&'static str, ProviderFactory> = phf_map! {
    "local" => local_provider as ProviderFactory,
    "local-async" => local_async_provider as ProviderFactory,
};

static JUDGES: phf::Map<&'static str, GeneratorFactory> = phf_map! {
    "openai" => openai_judge as GeneratorFactory,
};

static BENCHMARKS: phf::Map<&'static str, BenchmarkFactory> = phf_map! {
    "longmemeval" => longmemeval_benchmark as BenchmarkFactory,
    "custom" => custom_benchmark as BenchmarkFactory,
};

// ========== 解析 ==========

pub fn provider(name: &str, config: &Config) -> BenchResult<Arc<dyn Provider>> {
    let factory = PROVIDERS
        .get(name)
        .ok_or_else(|| BenchError::UnknownProvider(format!("{} (可选: {})", name, names(&PROVIDERS))))?;
    factory(config)
}

pub fn judge(name: &str, config: &Config) -> BenchResult<Arc<dyn Generator>> {
    let factory = JUDGES
        .get(name)
        .ok_or_else(|| BenchError::UnknownJudge(format!("{} (可选: {})", name, names(&JUDGES))))?;
    factory(config)
}

pub fn benchmark(name: &str, path: &Path) -> BenchResult<Arc<dyn Benchmark>> {
    let factory = BENCHMARKS
        .get(name)
        .ok_or_else(|| BenchError::UnknownBenchmark(format!("{} (可选: {})", name, names(&BENCHMARKS))))?;
    Ok(factory(path))
}

/// 回答者固定使用 OpenAI 兼容接口
pub fn answerer(config: &Config) -> BenchResult<Arc<dyn Generator>> {
    require_api_key(config)?;
    let service = LlmService::new(config, config.answer_model.clone())
        .with_system_message("你是一个根据记忆内容回答问题的助手，回答要简洁。");
    Ok(Arc::new(service))
}

fn names<V>(map: &phf::Map<&'static str, V>) -> String {
    let mut names: Vec<&str> = map.keys().copied().collect();
    names.sort_unstable();
    names.join(", ")
}

// ========== 构造函数 ==========

fn local_provider(_config: &Config) -> BenchResult<Arc<dyn Provider>> {
    Ok(Arc::new(LocalProvider::new()))
}

/// 模拟异步索引：写入后需要等待一个轮询间隔才能检索
fn local_async_provider(config: &Config) -> BenchResult<Arc<dyn Provider>> {
    let delay = Duration::from_millis(config.indexing_poll_interval_ms);
    Ok(Arc::new(LocalProvider::with_index_delay(delay)))
}

fn openai_judge(config: &Config) -> BenchResult<Arc<dyn Generator>> {
    require_api_key(config)?;
    let service = LlmService::new(config, config.judge_model.clone())
        .with_system_message("你是一个严格的评测裁判，只返回要求的 JSON。");
    Ok(Arc::new(service))
}

fn longmemeval_benchmark(path: &Path) -> Arc<dyn Benchmark> {
    Arc::new(JsonBenchmark::new("longmemeval", path, DatasetFormat::LongMemEval))
}

fn custom_benchmark(path: &Path) -> Arc<dyn Benchmark> {
    Arc::new(JsonBenchmark::new("custom", path, DatasetFormat::Native))
}

fn require_api_key(config: &Config) -> BenchResult<()> {
    if config.llm_api_key.trim().is_empty() {
        return Err(BenchError::Config(
            "缺少 LLM API Key，请设置 LLM_API_KEY 或在配置文件中填写 llm_api_key".to_string(),
        ));
    }
    Ok(())
}
