//! Grounded text generation.
//!
//! [`build_prompt`] renders the fixed report-writer template around the
//! packed context and the task query; [`generate`] sends it to a
//! [`TextGenerator`] and returns the model output verbatim. Retry policy
//! lives with the caller (see [`crate::report`]), not here.
//!
//! The production generator is [`GeminiGenerator`], which picks its model
//! once at startup by listing the models available to the API key.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GenerationConfig;

/// Phrase the model is told to use when the context lacks an answer.
pub const DATA_NOT_AVAILABLE: &str = "Data not available in provided documents";

/// The method a model must support to be usable for generation.
const GENERATE_CONTENT: &str = "generateContent";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate_content(&self, prompt: &str) -> Result<String>;
}

/// Render the report-writer prompt for one task.
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        r#"
You are an expert NAAC SSR report writer.

STRICT RULES:
1) Use ONLY the provided context.
2) Do NOT invent numbers, departments, events, or dates.
3) If data is missing, say: "{fallback}".
4) Keep a formal academic NAAC SSR tone.
5) At the end, include an "Evidence Used" list referencing sources (source_file + chunk_name).

CONTEXT:
{context}

TASK:
Write a NAAC-ready response for:
{query}

OUTPUT FORMAT:
1) Overview
2) Key Practices / Activities
3) Outcomes / Impact
4) Evidence Used (source_file + chunk_name)
"#,
        fallback = DATA_NOT_AVAILABLE,
        context = context,
        query = query,
    )
}

/// Generate an answer for `query` grounded in `context`.
pub async fn generate(generator: &dyn TextGenerator, query: &str, context: &str) -> Result<String> {
    generator.generate_content(&build_prompt(query, context)).await
}

// ============ Disabled ============

pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate_content(&self, _prompt: &str) -> Result<String> {
        bail!("Generation provider is disabled. Set [generation] provider in config.")
    }
}

// ============ Gemini ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

fn qualified(name: &str) -> String {
    if name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{}", name)
    }
}

/// Choose the generation model.
///
/// A pinned model must appear in `models` with `generateContent` support;
/// otherwise the first capable model in listing order wins.
pub fn select_model(models: &[ModelInfo], pinned: Option<&str>) -> Result<String> {
    let capable: Vec<&ModelInfo> = models
        .iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|g| g == GENERATE_CONTENT)
        })
        .collect();

    if let Some(pin) = pinned {
        let pin = qualified(pin);
        return match capable.iter().find(|m| m.name == pin) {
            Some(m) => Ok(m.name.clone()),
            None => bail!(
                "Configured generation.model '{}' is not available or does not support {} for this API key.",
                pin,
                GENERATE_CONTENT
            ),
        };
    }

    match capable.first() {
        Some(m) => Ok(m.name.clone()),
        None => bail!(
            "No available Gemini models support {} for your API key.\n\
             Check the key's permissions in Google AI Studio.",
            GENERATE_CONTENT
        ),
    }
}

/// Gemini `generateContent` client.
pub struct GeminiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    /// Read the credential, list models, and pick one.
    ///
    /// Fails fatally when the credential is absent or no listed model
    /// supports content generation.
    pub async fn connect(config: &GenerationConfig) -> Result<Self> {
        let api_key = match std::env::var(&config.api_key_env) {
            Ok(k) if !k.trim().is_empty() => k,
            _ => bail!(
                "{var} not found.\n\n\
                 Set it in your shell before running, e.g.:\n  export {var}='your_key_here'",
                var = config.api_key_env
            ),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let base_url = config.base_url.trim_end_matches('/').to_string();

        let models = list_models(&client, &base_url, &api_key).await?;
        let model = select_model(&models, config.model.as_deref())?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }
}

async fn list_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
) -> Result<Vec<ModelInfo>> {
    let mut models = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut req = client
            .get(format!("{}/models", base_url))
            .header("x-goog-api-key", api_key)
            .query(&[("pageSize", "1000")]);
        if let Some(token) = &page_token {
            req = req.query(&[("pageToken", token.as_str())]);
        }

        let response = req.send().await.context("Failed to list Gemini models")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Gemini API error {} listing models: {}", status, body);
        }

        let page: ListModelsResponse = response.json().await?;
        models.extend(page.models);

        match page.next_page_token {
            Some(t) if !t.is_empty() => page_token = Some(t),
            _ => break,
        }
    }

    Ok(models)
}

/// Concatenate the text parts of the first candidate.
fn response_text(resp: GenerateContentResponse) -> Result<String> {
    let candidate = match resp.candidates.into_iter().next() {
        Some(c) => c,
        None => bail!(
            "Gemini returned no candidates (prompt feedback: {})",
            resp.prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "none".to_string())
        ),
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        });

        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Gemini generateContent request failed")?;

        let status = response.status();
        if !status.is_success() {
            // Status code stays in the message; callers classify 429s from it.
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let parsed: GenerateContentResponse = response.json().await?;
        response_text(parsed)
    }
}

/// Create the configured generator, contacting the API when enabled.
pub async fn create_generator(config: &GenerationConfig) -> Result<Box<dyn TextGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "gemini" => Ok(Box::new(GeminiGenerator::connect(config).await?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, methods: &[&str]) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            supported_generation_methods: methods.iter().map(|m| m.to_string()).collect(),
        }
    }

    struct Echo;

    #[async_trait]
    impl TextGenerator for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }
        async fn generate_content(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn prompt_embeds_context_query_and_outline() {
        let p = build_prompt("Criterion 4 facilities", "[SOURCE: a | chunk_0]\nLabs\n");
        assert!(p.contains("CONTEXT:\n[SOURCE: a | chunk_0]\nLabs\n"));
        assert!(p.contains("Criterion 4 facilities"));
        assert!(p.contains(DATA_NOT_AVAILABLE));
        for heading in [
            "1) Overview",
            "2) Key Practices / Activities",
            "3) Outcomes / Impact",
            "4) Evidence Used",
        ] {
            assert!(p.contains(heading), "missing {}", heading);
        }
        assert!(p.find("CONTEXT:").unwrap() < p.find("TASK:").unwrap());
    }

    #[tokio::test]
    async fn generate_returns_output_verbatim() {
        let out = generate(&Echo, "q", "ctx").await.unwrap();
        assert_eq!(out, build_prompt("q", "ctx"));
    }

    #[test]
    fn select_first_capable() {
        let models = vec![
            model("models/embedding-001", &["embedContent"]),
            model("models/gemini-1.5-flash", &["generateContent", "countTokens"]),
            model("models/gemini-1.5-pro", &["generateContent"]),
        ];
        assert_eq!(select_model(&models, None).unwrap(), "models/gemini-1.5-flash");
    }

    #[test]
    fn select_pinned_model() {
        let models = vec![
            model("models/gemini-1.5-flash", &["generateContent"]),
            model("models/gemini-1.5-pro", &["generateContent"]),
        ];
        assert_eq!(
            select_model(&models, Some("gemini-1.5-pro")).unwrap(),
            "models/gemini-1.5-pro"
        );
        assert!(select_model(&models, Some("gemini-ultra")).is_err());
    }

    #[test]
    fn no_capable_model_is_fatal() {
        let models = vec![model("models/embedding-001", &["embedContent"])];
        let err = select_model(&models, None).unwrap_err();
        assert!(err.to_string().contains("generateContent"));
    }

    #[test]
    fn response_text_joins_parts() {
        let resp: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Over"}, {"text": "view"}]}}]
        }))
        .unwrap();
        assert_eq!(response_text(resp).unwrap(), "Overview");
    }

    #[test]
    fn response_without_candidates_errors() {
        let resp: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        assert!(response_text(resp).unwrap_err().to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn missing_credential_is_fatal() {
        let config = GenerationConfig {
            api_key_env: "SSR_HARNESS_TEST_UNSET_KEY".to_string(),
            ..GenerationConfig::default()
        };
        let err = GeminiGenerator::connect(&config).await.err().unwrap();
        assert!(err.to_string().contains("SSR_HARNESS_TEST_UNSET_KEY not found"));
    }
}
