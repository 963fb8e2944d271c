// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider-specific request payloads and response parsing.
//!
//! The three upstream APIs take different shapes; everything here maps
//! between them and the normalized `ChatMessage` list, so the client and
//! everything above it stay provider-agnostic.

use serde::Deserialize;
use serde_json::{Value, json};
use tally_core::{ChatMessage, ProviderId, Role};

/// Anthropic Messages API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Endpoint URL for a completion request.
///
/// Gemini authenticates via a key query parameter and embeds the model in
/// the path; the other providers take static paths.
pub fn request_url(provider: ProviderId, base_url: &str, model: &str, credential: &str) -> String {
    let base = base_url.trim_end_matches('/');
    match provider {
        ProviderId::OpenAi => format!("{base}/chat/completions"),
        ProviderId::Anthropic => format!("{base}/v1/messages"),
        ProviderId::Gemini => {
            format!("{base}/v1beta/models/{model}:generateContent?key={credential}")
        }
    }
}

/// Attach the provider's authentication scheme to a request.
pub fn apply_auth(
    provider: ProviderId,
    builder: reqwest::RequestBuilder,
    credential: &str,
) -> reqwest::RequestBuilder {
    match provider {
        ProviderId::OpenAi => builder.bearer_auth(credential),
        ProviderId::Anthropic => builder
            .header("x-api-key", credential)
            .header("anthropic-version", ANTHROPIC_VERSION),
        // Credential already carried in the URL.
        ProviderId::Gemini => builder,
    }
}

/// Build the provider-specific JSON body from the normalized message list.
pub fn build_request(
    provider: ProviderId,
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Value {
    match provider {
        ProviderId::OpenAi => json!({
            "model": model,
            "messages": messages
                .iter()
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect::<Vec<_>>(),
            "temperature": temperature,
            "max_tokens": max_tokens,
        }),
        ProviderId::Anthropic => {
            let system = messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let turns: Vec<Value> = messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| json!({"role": m.role.to_string(), "content": m.content}))
                .collect();
            let mut body = json!({
                "model": model,
                "messages": turns,
                "max_tokens": max_tokens,
                "temperature": temperature,
            });
            if !system.is_empty() {
                body["system"] = Value::String(system);
            }
            body
        }
        ProviderId::Gemini => {
            let system = messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            let contents: Vec<Value> = messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| {
                    let role = match m.role {
                        Role::Assistant => "model",
                        _ => "user",
                    };
                    json!({"role": role, "parts": [{"text": m.content}]})
                })
                .collect();
            let mut body = json!({
                "contents": contents,
                "generationConfig": {
                    "temperature": temperature,
                    "maxOutputTokens": max_tokens,
                },
            });
            if !system.is_empty() {
                body["systemInstruction"] = json!({"parts": [{"text": system}]});
            }
            body
        }
    }
}

// --- Response shapes ---

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default, rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiUsage {
    #[serde(default, rename = "totalTokenCount")]
    total_token_count: u32,
}

/// Extract `(content, total_tokens)` from a 2xx response body.
///
/// Any deserialization failure is reported as a reason string; the
/// client classifies it as a retryable parse error.
pub fn parse_response(provider: ProviderId, body: &str) -> Result<(String, u32), String> {
    match provider {
        ProviderId::OpenAi => {
            let resp: OpenAiResponse =
                serde_json::from_str(body).map_err(|e| format!("openai response: {e}"))?;
            let content = resp
                .choices
                .first()
                .and_then(|c| c.message.content.clone())
                .unwrap_or_default();
            let tokens = resp.usage.map(|u| u.total_tokens).unwrap_or_default();
            Ok((content, tokens))
        }
        ProviderId::Anthropic => {
            let resp: AnthropicResponse =
                serde_json::from_str(body).map_err(|e| format!("anthropic response: {e}"))?;
            let content = resp
                .content
                .iter()
                .filter(|b| b.block_type == "text")
                .map(|b| b.text.as_str())
                .collect::<Vec<_>>()
                .join("");
            let tokens = resp
                .usage
                .map(|u| u.input_tokens + u.output_tokens)
                .unwrap_or_default();
            Ok((content, tokens))
        }
        ProviderId::Gemini => {
            let resp: GeminiResponse =
                serde_json::from_str(body).map_err(|e| format!("gemini response: {e}"))?;
            let content = resp
                .candidates
                .first()
                .map(|c| {
                    c.content
                        .parts
                        .iter()
                        .filter_map(|p| p.text.as_deref())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();
            let tokens = resp
                .usage_metadata
                .map(|u| u.total_token_count)
                .unwrap_or_default();
            Ok((content, tokens))
        }
    }
}
