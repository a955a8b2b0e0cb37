//! Purpose: Talk to an OpenAI-compatible chat completion endpoint.
//! Exports: `Completion`, `CompletionRequest`, `OpenAiClient`, `clean_sql`.
//! Role: Backend behind the AI meta-commands; swapped for fakes in tests.
//! Invariants: Requests are deterministic (temperature 0) and carry one system + one user message.
//! Invariants: A missing API key is reported before any network call.
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::AiConfig;
use crate::core::error::{Error, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

pub trait Completion: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, Error>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

pub struct OpenAiClient {
    agent: ureq::Agent,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &AiConfig) -> Result<Self, Error> {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            agent,
            endpoint: completions_endpoint(&config.base_url)?,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn payload(&self, request: &CompletionRequest) -> Result<String, Error> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.0,
        };
        serde_json::to_string(&body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode completion request")
                .with_source(err)
        })
    }
}

impl Completion for OpenAiClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, Error> {
        let Some(api_key) = &self.api_key else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("OPENAI_API_KEY is missing")
                .with_hint(
                    "Set OPENAI_API_KEY=... before starting psql to enable AI meta-commands.",
                ));
        };
        let payload = self.payload(request)?;
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "requesting completion");

        let response = self
            .agent
            .post(self.endpoint.as_str())
            .set("Authorization", &format!("Bearer {api_key}"))
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
            .send_string(&payload);

        match response {
            Ok(resp) => {
                let body = resp.into_string().map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to read completion response")
                        .with_source(err)
                })?;
                content_from_response(&body)
            }
            Err(ureq::Error::Status(code, resp)) => {
                Err(error_from_status(code, &resp.into_string().unwrap_or_default()))
            }
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("completion request failed")
                .with_source(err)),
        }
    }
}

fn completions_endpoint(base_url: &Url) -> Result<Url, Error> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("chat/completions").map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("cannot build completion endpoint from `{base_url}`"))
            .with_source(err)
    })
}

fn content_from_response(body: &str) -> Result<String, Error> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|err| {
        Error::new(ErrorKind::Upstream)
            .with_message("invalid completion response json")
            .with_source(err)
    })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::new(ErrorKind::Upstream).with_message("no choices in response"))?;
    choice
        .message
        .content
        .ok_or_else(|| Error::new(ErrorKind::Upstream).with_message("no content in response"))
}

fn error_from_status(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .unwrap_or_else(|| format!("completion backend returned status {status}"));
    let err = Error::new(ErrorKind::Upstream).with_message(message);
    match status {
        401 | 403 => err.with_hint("Check that OPENAI_API_KEY is valid."),
        429 => err.with_hint("Rate limited; wait a moment and retry."),
        _ => err,
    }
}

/// Strips markdown code fences that models add despite instructions.
pub fn clean_sql(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(fenced) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let body = match fenced.split_once('\n') {
        Some((_language, rest)) => rest,
        None => fenced,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{
        Completion, CompletionRequest, OpenAiClient, clean_sql, content_from_response,
        error_from_status,
    };
    use crate::config::AiConfig;
    use crate::core::error::ErrorKind;
    use url::Url;

    #[test]
    fn endpoint_keeps_base_path() {
        let config = AiConfig {
            base_url: Url::parse("http://localhost:8080/v1").expect("url"),
            ..AiConfig::default()
        };
        let client = OpenAiClient::new(&config).expect("client");
        assert_eq!(
            client.endpoint().as_str(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn missing_api_key_fails_without_network() {
        let client = OpenAiClient::new(&AiConfig::default()).expect("client");
        let err = client
            .complete(&CompletionRequest {
                system: "s".to_string(),
                user: "u".to_string(),
            })
            .expect_err("no key");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.hint().expect("hint").contains("OPENAI_API_KEY"));
    }

    #[test]
    fn payload_has_model_and_messages() {
        let client = OpenAiClient::new(&AiConfig::default()).expect("client");
        let payload = client
            .payload(&CompletionRequest {
                system: "sys".to_string(),
                user: "usr".to_string(),
            })
            .expect("payload");
        let value: serde_json::Value = serde_json::from_str(&payload).expect("json");
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "usr");
        assert_eq!(value["temperature"], 0.0);
    }

    #[test]
    fn first_choice_content_is_returned() {
        let body =
            r#"{"choices":[{"message":{"content":"SELECT 1;"}},{"message":{"content":"x"}}]}"#;
        assert_eq!(content_from_response(body).expect("content"), "SELECT 1;");

        let err = content_from_response(r#"{"choices":[]}"#).expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::Upstream);
        let err = content_from_response(r#"{"choices":[{"message":{}}]}"#).expect_err("none");
        assert_eq!(err.message(), Some("no content in response"));
    }

    #[test]
    fn status_errors_use_backend_message() {
        let err = error_from_status(401, r#"{"error":{"message":"Incorrect API key"}}"#);
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.message(), Some("Incorrect API key"));
        assert!(err.hint().is_some());

        let err = error_from_status(502, "bad gateway");
        assert_eq!(err.message(), Some("completion backend returned status 502"));
    }

    #[test]
    fn clean_sql_strips_fences() {
        assert_eq!(clean_sql("  SELECT 1;\n"), "SELECT 1;");
        assert_eq!(clean_sql("```sql\nSELECT 1;\n```"), "SELECT 1;");
        assert_eq!(clean_sql("```\nSELECT 2;\n```\n"), "SELECT 2;");
    }
}
