use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::image_file::ImageFile;
use crate::utils::http::get_http_client;
use crate::utils::timing::log_call_timing;

/// User-facing failures of the generation client, one variant per case
/// the UI has to message differently.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("GEMINI_API_KEY is not set. Add it to the environment before generating.")]
    MissingApiKey,
    #[error("Could not reach the generation service. Check the API key and network connection.")]
    Connectivity,
    #[error("Generation stopped early: {0}")]
    Aborted(String),
    #[error("The generation service returned no image.")]
    NoImage,
}

#[derive(Debug, thiserror::Error)]
#[error("Style analysis failed")]
pub struct AnalysisError;

const ANALYSIS_INSTRUCTION: &str = "Describe the aesthetics of this image (lighting, style, \
colors) so it can be used as a reference for generating similar product photos. Keep the \
answer very brief.";

/// Fallback description when the analysis model answers with empty text.
const DEFAULT_STYLE_DESCRIPTION: &str = "a polished professional studio aesthetic";

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

fn api_key() -> Result<&'static str, GenerationError> {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return Err(GenerationError::MissingApiKey);
    }
    Ok(key)
}

fn redact_api_key(text: &str) -> String {
    let key = CONFIG.gemini_api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn inline_image_part(image: &ImageFile) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": general_purpose::STANDARD.encode(&image.bytes)
        }
    })
}

/// Request parts in submission order: product image, prompt text, then
/// the optional style image.
fn build_generation_parts(product: &ImageFile, prompt: &str, style: Option<&ImageFile>) -> Vec<Value> {
    let mut parts = vec![inline_image_part(product), json!({ "text": prompt })];
    if let Some(style) = style {
        parts.push(inline_image_part(style));
    }
    parts
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();
    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized = Vec::new();
        for content in contents {
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_parts(parts))
                .unwrap_or_default();
            summarized.push(json!({ "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized));
    }
    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }
    Value::Object(summary)
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// One-shot call to the generateContent endpoint. No retry loop: a
/// failed attempt requires a new explicit user action.
async fn call_gemini_api(model: &str, payload: Value) -> Result<GeminiResponse> {
    let key = api_key().map_err(|err| anyhow!(err.to_string()))?;
    let client = get_http_client();
    let url = format!(
        "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={key}"
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(target: "studio.gemini", model = model, payload = %summarize_payload(&payload));
    }

    let response = client
        .post(&url)
        .timeout(Duration::from_secs(CONFIG.gemini_timeout_seconds))
        .json(&payload)
        .send()
        .await
        .map_err(|err| {
            let err_text = redact_api_key(&err.to_string());
            warn!(
                "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                err_text,
                err.is_timeout(),
                err.is_connect(),
                err.status()
            );
            anyhow!("Gemini request failed: {err_text}")
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, body_summary) = summarize_error_body(&body);
        warn!("Gemini API error: status={}, body={}", status, body_summary);
        let detail = message.unwrap_or(body_summary);
        return Err(anyhow!(
            "Gemini request failed with status {status}: {detail}"
        ));
    }

    Ok(response.json::<GeminiResponse>().await?)
}

/// Applies the extraction rule to a generation response: the first
/// image-bearing part of the first candidate wins; otherwise the finish
/// signal decides between an abort and a plain no-image failure.
fn extract_generated_image(response: GeminiResponse) -> Result<ImageFile, GenerationError> {
    let mut finish_reason = None;

    if let Some(candidate) = response.candidates.unwrap_or_default().into_iter().next() {
        finish_reason = candidate.finish_reason;
        let parts = candidate
            .content
            .and_then(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let GeminiPart::InlineData { inline_data } = part {
                if !inline_data.mime_type.starts_with("image/") {
                    continue;
                }
                let bytes = general_purpose::STANDARD
                    .decode(inline_data.data)
                    .map_err(|_| GenerationError::NoImage)?;
                return Ok(ImageFile::new(
                    bytes,
                    inline_data.mime_type,
                    "generated-image.png".to_string(),
                ));
            }
        }
    }

    match finish_reason.as_deref() {
        Some(reason) if reason != "STOP" => Err(GenerationError::Aborted(reason.to_string())),
        _ => Err(GenerationError::NoImage),
    }
}

fn extract_text(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            if let Some(parts) = content.parts {
                for part in parts {
                    if let GeminiPart::Text { text } = part {
                        if !text.trim().is_empty() {
                            text_parts.push(text.trim().to_string());
                        }
                    }
                }
            }
        }
    }
    text_parts.join("\n")
}

/// Submits the product image, prompt, and optional style image to the
/// image model and returns the generated image.
///
/// Preconditions (product present, prompt non-empty) are enforced by
/// the caller. Transport and backend errors are logged in full here and
/// surfaced to the caller only as a generic connectivity failure.
pub async fn generate_image(
    product: &ImageFile,
    prompt: &str,
    style: Option<&ImageFile>,
) -> Result<ImageFile, GenerationError> {
    api_key()?;

    let payload = json!({
        "contents": [{ "parts": build_generation_parts(product, prompt, style) }],
        "generationConfig": { "responseModalities": ["IMAGE"] },
    });

    let model = &CONFIG.gemini_image_model;
    let response = log_call_timing("gemini", model, "generate_image", || async {
        call_gemini_api(model, payload).await
    })
    .await
    .map_err(|err| {
        warn!("Image generation call failed: {}", redact_api_key(&err.to_string()));
        GenerationError::Connectivity
    })?;

    extract_generated_image(response)
}

/// Asks the analysis model for a short description of the reference
/// image's aesthetic. Non-fatal on failure: the prompt composer falls
/// back to its generic style clause.
pub async fn analyze_style(style: &ImageFile) -> Result<String, AnalysisError> {
    if api_key().is_err() {
        warn!("Style analysis skipped: GEMINI_API_KEY is not set");
        return Err(AnalysisError);
    }

    let payload = json!({
        "contents": [{
            "parts": [inline_image_part(style), { "text": ANALYSIS_INSTRUCTION }]
        }],
    });

    let model = &CONFIG.gemini_analysis_model;
    let response = log_call_timing("gemini", model, "analyze_style", || async {
        call_gemini_api(model, payload).await
    })
    .await
    .map_err(|err| {
        warn!("Style analysis call failed: {}", redact_api_key(&err.to_string()));
        AnalysisError
    })?;

    let description = extract_text(response);
    if description.is_empty() {
        return Ok(DEFAULT_STYLE_DESCRIPTION.to_string());
    }
    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_from(value: Value) -> GeminiResponse {
        serde_json::from_value(value).expect("valid response fixture")
    }

    #[test]
    fn extracts_the_first_inline_image_part() {
        let payload = general_purpose::STANDARD.encode(b"raster-bytes");
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "here is your render" },
                    { "inlineData": { "mimeType": "image/png", "data": payload } },
                    { "inlineData": { "mimeType": "image/jpeg", "data": payload } }
                ]},
                "finishReason": "STOP"
            }]
        }));

        let image = extract_generated_image(response).unwrap();
        assert_eq!(image.bytes, b"raster-bytes");
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn abnormal_finish_reason_is_surfaced_in_the_error() {
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [] },
                "finishReason": "SAFETY"
            }]
        }));

        let err = extract_generated_image(response).unwrap_err();
        assert!(matches!(err, GenerationError::Aborted(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn normal_finish_without_image_reports_no_image() {
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "sorry" }] },
                "finishReason": "STOP"
            }]
        }));

        assert!(matches!(
            extract_generated_image(response).unwrap_err(),
            GenerationError::NoImage
        ));
    }

    #[test]
    fn empty_candidate_list_reports_no_image() {
        let response = response_from(json!({ "candidates": [] }));
        assert!(matches!(
            extract_generated_image(response).unwrap_err(),
            GenerationError::NoImage
        ));
    }

    #[test]
    fn generation_parts_keep_product_prompt_style_order() {
        let product = ImageFile::new(vec![1], "image/png".to_string(), "p.png".to_string());
        let style = ImageFile::new(vec![2], "image/jpeg".to_string(), "s.jpg".to_string());

        let parts = build_generation_parts(&product, "make it pop", Some(&style));
        assert_eq!(parts.len(), 3);
        assert!(parts[0].get("inlineData").is_some());
        assert_eq!(parts[1], json!({ "text": "make it pop" }));
        assert_eq!(
            parts[2].pointer("/inlineData/mimeType").and_then(Value::as_str),
            Some("image/jpeg")
        );

        let without_style = build_generation_parts(&product, "make it pop", None);
        assert_eq!(without_style.len(), 2);
    }

    #[test]
    fn text_extraction_joins_non_empty_parts() {
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "  soft rim light  " },
                    { "text": "" },
                    { "text": "pastel palette" }
                ]}
            }]
        }));

        assert_eq!(extract_text(response), "soft rim light\npastel palette");
    }

    #[test]
    fn error_bodies_prefer_the_nested_api_message() {
        let (message, _) = summarize_error_body(
            r#"{"error": {"code": 403, "message": "API key not valid"}}"#,
        );
        assert_eq!(message.as_deref(), Some("API key not valid"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }
}
