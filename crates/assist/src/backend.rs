use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use bankin_core::AssistConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssistError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Model API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Model returned no choices")]
    NoChoices,
    #[error("Response violates schema: {0}")]
    Schema(String),
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("API key environment variable not set: {0}")]
    MissingApiKey(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for AssistError {
    fn from(e: serde_json::Error) -> Self {
        AssistError::Schema(e.to_string())
    }
}

/// A chat model that answers one system/user prompt pair with a JSON object.
pub trait LanguageModel: Send + Sync {
    fn complete_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> impl Future<Output = Result<String, AssistError>> + Send;
}

// ── OpenAI-compatible backend ────────────────────────────────────────────────

/// Chat-completions client in JSON mode.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(config: &AssistConfig, api_key: String) -> Result<Self, AssistError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// Reads the API key from the variable named in `config.api_key_env`.
    pub fn from_env(config: &AssistConfig) -> Result<Self, AssistError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| AssistError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"}
        })
    }
}

impl LanguageModel for OpenAiBackend {
    async fn complete_json(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AssistError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(system_prompt, user_prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::Status { status, body });
        }

        #[derive(Deserialize)]
        struct Message {
            content: Option<String>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AssistError::NoChoices)
    }
}

// ── Scripted backend (tests and dry runs) ────────────────────────────────────

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
    Hang,
}

/// Plays back queued replies in order and records every prompt it receives.
/// An exhausted script answers with a backend error.
#[derive(Default)]
pub struct ScriptedModel {
    script: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, json: impl Into<String>) -> Self {
        self.push(Scripted::Reply(json.into()))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()))
    }

    /// Never answers; the caller's timeout must fire.
    pub fn hang(self) -> Self {
        self.push(Scripted::Hang)
    }

    fn push(self, step: Scripted) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    /// User prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl LanguageModel for ScriptedModel {
    async fn complete_json(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, AssistError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_prompt.to_string());
        let step = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();

        match step {
            Some(Scripted::Reply(json)) => Ok(json),
            Some(Scripted::Fail(message)) => Err(AssistError::Backend(message)),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Err(AssistError::Backend("script exhausted".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_in_order() {
        let model = ScriptedModel::new().reply("{\"a\":1}").fail("boom");
        assert_eq!(model.complete_json("sys", "first").await.unwrap(), "{\"a\":1}");
        assert!(matches!(
            model.complete_json("sys", "second").await,
            Err(AssistError::Backend(m)) if m == "boom"
        ));
        assert!(model.complete_json("sys", "third").await.is_err());
        assert_eq!(model.prompts(), vec!["first", "second", "third"]);
    }

    #[test]
    fn openai_request_uses_json_mode() {
        let config = AssistConfig {
            base_url: "http://localhost:8080/".into(),
            ..AssistConfig::default()
        };
        let backend = OpenAiBackend::new(&config, "sk-test".into()).unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:8080/v1/chat/completions");

        let body = backend.request_body("system", "user");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn missing_api_key_is_reported() {
        let config = AssistConfig {
            api_key_env: "BANKIN_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..AssistConfig::default()
        };
        assert!(matches!(
            OpenAiBackend::from_env(&config),
            Err(AssistError::MissingApiKey(var)) if var == "BANKIN_TEST_KEY_THAT_IS_NEVER_SET"
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let config = AssistConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..AssistConfig::default()
        };
        let backend = OpenAiBackend::new(&config, "sk-test".into()).unwrap();
        assert!(matches!(
            backend.complete_json("s", "u").await,
            Err(AssistError::Transport(_))
        ));
    }
}
