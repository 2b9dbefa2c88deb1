//! Gemini 流式客户端
//!
//! POST `{base_url}/v1beta/models/{model}:streamGenerateContent?alt=sse`，鉴权头 `x-goog-api-key`。
//! 每个 SSE `data:` 是一个 GenerateContentResponse；取首个候选的 parts 转成内部 Part。
//! functionCall 上的 `thoughtSignature` 作为不透明字符串原样保存与回传。

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::llm::{GenerateRequest, LlmClient, LlmError, PartStream};
use crate::memory::{Part, Role, Turn};
use crate::tools::ToolDeclaration;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

// ---- 线上格式 ----

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<WireFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<WireFunctionResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionResponse {
    name: String,
    response: Map<String, Value>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireThinkingConfig {
    include_thoughts: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    thinking_config: WireThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStreamResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    prompt_feedback: Option<WirePromptFeedback>,
    error: Option<WireApiError>,
}

#[derive(Debug, Deserialize)]
struct WireErrorEnvelope {
    error: WireApiError,
}

impl From<&Part> for WirePart {
    fn from(part: &Part) -> Self {
        match part {
            Part::Text(t) => WirePart {
                text: Some(t.clone()),
                ..Default::default()
            },
            Part::Thought(t) => WirePart {
                text: Some(t.clone()),
                thought: true,
                ..Default::default()
            },
            Part::FunctionCall {
                name,
                args,
                signature,
            } => WirePart {
                thought_signature: signature.clone(),
                function_call: Some(WireFunctionCall {
                    name: name.clone(),
                    args: args.clone(),
                }),
                ..Default::default()
            },
            Part::FunctionResponse { name, response } => WirePart {
                function_response: Some(WireFunctionResponse {
                    name: name.clone(),
                    response: response.clone(),
                }),
                ..Default::default()
            },
        }
    }
}

impl WirePart {
    fn into_part(self) -> Option<Part> {
        if let Some(call) = self.function_call {
            return Some(Part::FunctionCall {
                name: call.name,
                args: call.args,
                signature: self.thought_signature,
            });
        }
        if let Some(resp) = self.function_response {
            return Some(Part::FunctionResponse {
                name: resp.name,
                response: resp.response,
            });
        }
        match self.text {
            Some(t) if self.thought => Some(Part::Thought(t)),
            Some(t) => Some(Part::Text(t)),
            None => None,
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// 空文本 part 会被后端以 400 拒绝，编码时跳过；全部跳过后的 turn 也不发送
fn to_wire_content(turn: &Turn) -> Option<WireContent> {
    let parts: Vec<WirePart> = turn
        .parts
        .iter()
        .filter(|p| !matches!(p, Part::Text(t) | Part::Thought(t) if t.is_empty()))
        .map(WirePart::from)
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(WireContent {
        role: Some(role_name(turn.role).to_string()),
        parts,
    })
}

fn build_request_body(request: &GenerateRequest) -> WireRequest<'_> {
    let system_instruction = (!request.system_instruction.is_empty()).then(|| WireContent {
        role: None,
        parts: vec![WirePart {
            text: Some(request.system_instruction.clone()),
            ..Default::default()
        }],
    });
    let tools = if request.tools.is_empty() {
        Vec::new()
    } else {
        vec![WireTool {
            function_declarations: &request.tools,
        }]
    };
    let generation_config = request
        .config
        .include_thoughts
        .then_some(WireGenerationConfig {
            thinking_config: WireThinkingConfig {
                include_thoughts: true,
            },
        });
    WireRequest {
        contents: request.history.iter().filter_map(to_wire_content).collect(),
        system_instruction,
        tools,
        generation_config,
    }
}

/// 解析单个 SSE data；空数据返回 None
fn decode_event(data: &str) -> Result<Option<Vec<Part>>, LlmError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    let resp: WireStreamResponse =
        serde_json::from_str(data).map_err(|e| LlmError::Decode(format!("{e}: {data}")))?;
    if let Some(err) = resp.error {
        return Err(LlmError::ApiError {
            status: err.code,
            message: err.message,
        });
    }
    if resp.candidates.is_empty() {
        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Blocked(reason));
        }
    }
    let parts = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(WirePart::into_part).collect())
        .unwrap_or_default();
    Ok(Some(parts))
}

/// 非 2xx 响应体转错误：优先取 `error.message`
fn api_error(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<WireErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    LlmError::ApiError { status, message }
}

/// Gemini 客户端：持有 reqwest Client、base_url 与 API Key
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        connect_timeout: Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn stream_generate(&self, request: &GenerateRequest) -> Result<PartStream, LlmError> {
        let body = build_request_body(request);
        tracing::debug!(
            model = %request.model,
            turns = request.history.len(),
            include_thoughts = request.config.include_thoughts,
            "gemini stream request"
        );

        let response = self
            .http
            .post(self.endpoint(&request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &text));
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(ev) => decode_event(&ev.data).transpose(),
                    Err(e) => Some(Err(LlmError::Transport(e.to_string()))),
                }
            });
        Ok(Box::pin(stream))
    }
}
