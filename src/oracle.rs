//! Oracle capability traits and their implementations.
//!
//! The simulation core only ever sees text in and text out: an action oracle
//! proposes labeled moves for a state, a prediction oracle projects the state
//! one month forward. Production uses a remote chat-completion endpoint;
//! tests and offline runs use the deterministic stubs.

use async_trait::async_trait;
use serde_json::json;

use crate::error::OracleError;

/// Proposes candidate action labels for a business state.
///
/// An empty list means the branch does not expand this month.
#[async_trait]
pub trait ActionOracle: Send + Sync {
    async fn generate(&self, state: &str) -> Result<Vec<String>, OracleError>;
}

/// Projects a state one month forward under a chosen action.
#[async_trait]
pub trait PredictionOracle: Send + Sync {
    async fn predict(&self, state: &str, action: &str, month: u32)
        -> Result<String, OracleError>;
}

const ACTIONS_INSTRUCTIONS: &str = "You are a business strategy assistant. Given the \
current state of a business, list the distinct actions it could plausibly take next \
month. Respond with a JSON object of the form {\"actions\": [\"label\", ...]} using \
short action labels, most promising first. Omit the key entirely if no action makes \
sense.";

const PREDICTION_INSTRUCTIONS: &str = "You are a business state predictor. You receive \
a business state, the action taken, and the month number. Describe the resulting state \
of the business one month later in a short paragraph, always including concrete revenue \
and funding figures, e.g. \"revenue: $120K, funding: $1M\".";

/// Connection settings for the remote completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub api_url: String,
    /// Read from `OPENAI_API_KEY` by default.
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 3500,
        }
    }
}

/// Thin chat-completion client shared by the two remote oracles.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn complete(
        &self,
        instructions: &str,
        input: &str,
        json_output: bool,
    ) -> Result<String, OracleError> {
        let mut body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {"role": "system", "content": instructions},
                {"role": "user", "content": input}
            ]
        });
        if json_output {
            body["response_format"] = json!({"type": "json_object"});
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api { status, body });
        }

        let payload: serde_json::Value = response.json().await?;
        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                OracleError::Parse("completion response carried no message content".to_string())
            })
    }
}

/// Production action oracle backed by the completion endpoint.
#[derive(Debug, Clone)]
pub struct RemoteActionOracle {
    client: CompletionClient,
}

impl RemoteActionOracle {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ActionOracle for RemoteActionOracle {
    async fn generate(&self, state: &str) -> Result<Vec<String>, OracleError> {
        let raw = self
            .client
            .complete(ACTIONS_INSTRUCTIONS, state, true)
            .await?;
        parse_action_list(&raw)
    }
}

/// Production prediction oracle backed by the completion endpoint.
#[derive(Debug, Clone)]
pub struct RemotePredictionOracle {
    client: CompletionClient,
}

impl RemotePredictionOracle {
    pub fn new(client: CompletionClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PredictionOracle for RemotePredictionOracle {
    async fn predict(
        &self,
        state: &str,
        action: &str,
        month: u32,
    ) -> Result<String, OracleError> {
        let input = format!("{state} Action: {action} Month: {month}");
        self.client
            .complete(PREDICTION_INSTRUCTIONS, &input, false)
            .await
    }
}

/// Parses the actions agent's `{"actions": [...]}` response.
///
/// A missing `"actions"` key reads as "no viable moves" and yields an empty
/// list; anything that is not valid JSON or not an array of strings is a
/// parse failure.
pub fn parse_action_list(raw: &str) -> Result<Vec<String>, OracleError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|err| OracleError::Parse(format!("action list is not valid JSON: {err}")))?;

    match value.get("actions") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    OracleError::Parse("non-string entry in actions array".to_string())
                })
            })
            .collect(),
        Some(other) => Err(OracleError::Parse(format!(
            "\"actions\" is not an array: {other}"
        ))),
        None => Ok(Vec::new()),
    }
}

/// Deterministic action oracle for tests and offline runs: always proposes
/// the same labels.
#[derive(Debug, Clone)]
pub struct StubActionOracle {
    pub actions: Vec<String>,
}

impl StubActionOracle {
    pub fn new<S: Into<String>>(actions: impl IntoIterator<Item = S>) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ActionOracle for StubActionOracle {
    async fn generate(&self, _state: &str) -> Result<Vec<String>, OracleError> {
        Ok(self.actions.clone())
    }
}

/// Deterministic prediction oracle for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StubPredictionOracle;

#[async_trait]
impl PredictionOracle for StubPredictionOracle {
    async fn predict(
        &self,
        _state: &str,
        action: &str,
        month: u32,
    ) -> Result<String, OracleError> {
        // Action length stands in for a real signal so the beam has
        // something to rank.
        Ok(format!(
            "Month {month}: took '{action}'. Revenue: ${}K, funding: $50K.",
            100 + action.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ordered_action_list() {
        let actions = parse_action_list(r#"{"actions": ["expand", "hire", "pivot"]}"#).unwrap();
        assert_eq!(actions, ["expand", "hire", "pivot"]);
    }

    #[test]
    fn missing_actions_key_means_no_expansion() {
        let actions = parse_action_list(r#"{"note": "nothing to do"}"#).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let err = parse_action_list("not json at all").unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn non_string_entry_is_a_parse_failure() {
        let err = parse_action_list(r#"{"actions": ["ok", 42]}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn non_array_actions_is_a_parse_failure() {
        let err = parse_action_list(r#"{"actions": "expand"}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[tokio::test]
    async fn stubs_are_deterministic() {
        let actions = StubActionOracle::new(["grow"]);
        assert_eq!(actions.generate("any state").await.unwrap(), ["grow"]);

        let predictor = StubPredictionOracle;
        let first = predictor.predict("s", "grow", 1).await.unwrap();
        let second = predictor.predict("s", "grow", 1).await.unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Month 1"));
    }
}
