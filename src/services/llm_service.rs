//! LLM 服务 - 业务能力层
//!
//! 只负责"prompt → 文本"能力，回答者和裁判共用
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PhaseError, PhaseResult};
use crate::services::provider::Generator;

/// LLM 服务
///
/// 职责：
/// - 调用 OpenAI 兼容接口生成文本
/// - 把接口错误映射为可分类的 `PhaseError`
/// - 不关心 prompt 内容和流程顺序
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
    system_message: Option<String>,
    temperature: f32,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config, model_name: impl Into<String>) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: model_name.into(),
            system_message: None,
            temperature: 0.0,
        }
    }

    /// 设置系统消息
    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（已去除首尾空白）
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> PhaseResult<String> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(|e| map_openai_error(&self.model_name, e))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| map_openai_error(&self.model_name, e))?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| map_openai_error(&self.model_name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败 (模型: {}): {}", self.model_name, e);
            map_openai_error(&self.model_name, e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                PhaseError::MalformedResponse(format!("LLM 返回内容为空 (模型: {})", self.model_name))
            })?;

        let content = content.trim().to_string();
        if content.is_empty() {
            return Err(PhaseError::MalformedResponse(format!(
                "LLM 返回内容为空 (模型: {})",
                self.model_name
            )));
        }

        Ok(content)
    }
}

#[async_trait]
impl Generator for LlmService {
    fn model(&self) -> &str {
        &self.model_name
    }

    async fn generate(&self, prompt: &str) -> PhaseResult<String> {
        self.send_to_llm(prompt, self.system_message.as_deref()).await
    }
}

/// 将 OpenAI 接口错误映射为阶段错误
fn map_openai_error(model: &str, err: OpenAIError) -> PhaseError {
    match err {
        OpenAIError::Reqwest(e) => {
            if e.is_timeout() {
                PhaseError::timeout(format!("llm:{}", model), 0)
            } else if let Some(status) = e.status() {
                PhaseError::server(status.as_u16(), e.to_string())
            } else {
                // 连接失败等网络问题
                PhaseError::server(503, e.to_string())
            }
        }
        OpenAIError::ApiError(api) => {
            let kind = format!("{:?} {:?}", api.code, api.r#type);
            if kind.contains("rate_limit") || kind.contains("insufficient_quota") {
                PhaseError::RateLimited {
                    retry_after_secs: None,
                }
            } else if kind.contains("invalid_api_key") || kind.contains("authentication") {
                PhaseError::Unauthorized(api.message)
            } else if kind.contains("model_not_found") {
                PhaseError::NotFound(api.message)
            } else if kind.contains("invalid_request") {
                PhaseError::MalformedInput(api.message)
            } else {
                PhaseError::server(500, api.message)
            }
        }
        OpenAIError::InvalidArgument(msg) => PhaseError::MalformedInput(msg),
        other => PhaseError::MalformedResponse(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试通用 LLM 调用（需要真实的 API Key）
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... cargo test test_send_to_llm_simple -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_send_to_llm_simple() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = Config::from_env();
        let service = LlmService::new(&config, config.answer_model.clone());

        println!("\n========== 测试通用 LLM 调用 ==========");
        let result = service
            .send_to_llm("用一个词回答：天空是什么颜色？", Some("你是一个简洁的助手，回答要简短。"))
            .await;

        match result {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("测试失败: {}", e),
        }
    }

    #[test]
    fn test_invalid_argument_maps_to_malformed_input() {
        let err = map_openai_error("m", OpenAIError::InvalidArgument("missing model".to_string()));
        assert_eq!(err, PhaseError::MalformedInput("missing model".to_string()));
    }
}
