//! Completion driver.
//!
//! Talks either to an OpenAI-compatible chat-completion API (buffered or
//! streamed as server-sent events) or to a custom endpoint that receives the
//! prompt and example messages as JSON and answers with the test file as
//! plain text. Which one is used is decided once per run by
//! [`Backend::from_config`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::message::{CompletionRequest, Message};
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const FENCE: &str = "```";
const STREAM_DONE: &str = "[DONE]";
const ERROR_EVENT: &str = "error";

/// Removes the text of every line that starts with a code fence.
///
/// Line terminators are kept, so fenced lines become empty lines. A fence
/// that is really part of the generated code is removed as well.
#[must_use]
pub fn strip_fences(text: &str) -> String {
    text.split_inclusive('\n')
        .map(|line| {
            if line.starts_with(FENCE) {
                let end = line.find(['\r', '\n']).unwrap_or(line.len());
                &line[end..]
            } else {
                line
            }
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Body posted to a custom endpoint.
#[derive(Debug, Serialize)]
pub struct EndpointPayload<'a> {
    /// Rendered prompt for the file under test
    pub prompt: &'a str,
    /// Expanded example messages
    pub examples: &'a [Message],
}

/// What one server-sent event contributes to the stream.
#[derive(Debug, PartialEq, Eq)]
enum StreamStep {
    Tokens(Vec<String>),
    Done,
}

/// Interprets one event of a chat-completion stream.
fn read_event(event: &str, data: &str) -> Result<StreamStep> {
    let data = data.trim();

    if event == ERROR_EVENT {
        return Err(Error::transport(format!("stream error event: {data}")));
    }
    if data == STREAM_DONE {
        return Ok(StreamStep::Done);
    }
    if data.is_empty() {
        return Ok(StreamStep::Tokens(Vec::new()));
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::transport(format!("malformed stream event: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::transport(format!("stream error: {}", error.message)));
    }

    Ok(StreamStep::Tokens(
        chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .collect(),
    ))
}

/// Forwards each non-empty content delta to `on_token` in arrival order and
/// returns how many were forwarded.
async fn forward_events<F>(events: &mut EventSource, on_token: &mut F) -> Result<usize>
where
    F: FnMut(&str) -> Result<()>,
{
    let mut forwarded = 0;

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Open) => debug!("Stream opened"),
            Ok(Event::Message(message)) => match read_event(&message.event, &message.data)? {
                StreamStep::Done => break,
                StreamStep::Tokens(tokens) => {
                    for token in tokens {
                        trace!("token: {:?}", token);
                        on_token(&token)?;
                        forwarded += 1;
                    }
                }
            },
            Err(EventSourceError::StreamEnded) => break,
            Err(EventSourceError::InvalidStatusCode(status, response)) => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::transport(format!("HTTP {status}: {}", body.trim())));
            }
            Err(e) => return Err(Error::transport(format!("stream failed: {e}"))),
        }
    }

    Ok(forwarded)
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::transport(format!("HTTP {status}: {}", body.trim())))
}

fn http_client(config: &Config) -> Result<Client> {
    Ok(Client::builder().timeout(config.timeout).build()?)
}

/// Client for OpenAI-compatible chat-completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    url: String,
}

impl OpenAiClient {
    /// Creates a client for `{api_base}/chat/completions`.
    #[must_use]
    pub fn new(http: Client, api_key: impl Into<String>, api_base: &str) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            url: format!("{}/chat/completions", api_base.trim_end_matches('/')),
        }
    }

    fn post(&self, request: &CompletionRequest, stream: bool) -> RequestBuilder {
        debug!(
            "POST {} ({} messages, stream={})",
            self.url,
            request.messages.len(),
            stream
        );

        self.http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &request.model,
                messages: &request.messages,
                stream,
            })
    }

    /// Requests a full completion and returns it with fence lines stripped.
    ///
    /// A reply without message content yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails or the status is not
    /// a success.
    pub async fn get_completion(&self, request: &CompletionRequest) -> Result<String> {
        let response = check_status(self.post(request, false).send().await?).await?;
        let response: ChatResponse = response.json().await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .map(|c| strip_fences(&c))
            .unwrap_or_default())
    }

    /// Streams a completion, calling `on_token` once per non-empty chunk.
    ///
    /// Returns the number of tokens forwarded.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails, the stream breaks or
    /// carries an error event. Errors from `on_token` are propagated.
    pub async fn stream_completion<F>(
        &self,
        request: &CompletionRequest,
        mut on_token: F,
    ) -> Result<usize>
    where
        F: FnMut(&str) -> Result<()>,
    {
        let mut events = EventSource::new(self.post(request, true))
            .map_err(|e| Error::transport(e.to_string()))?;

        let forwarded = forward_events(&mut events, &mut on_token).await;
        events.close();
        forwarded
    }
}

/// Client for a custom generation endpoint.
#[derive(Debug, Clone)]
pub struct EndpointClient {
    http: Client,
    url: String,
}

impl EndpointClient {
    /// Creates a client posting to `url`.
    #[must_use]
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    /// Posts the prompt and example messages and returns the response body
    /// verbatim.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request fails or the status is not
    /// a success.
    pub async fn generate(&self, prompt: &str, examples: &[Message]) -> Result<String> {
        debug!("POST {} ({} example messages)", self.url, examples.len());

        let response = self
            .http
            .post(&self.url)
            .json(&EndpointPayload { prompt, examples })
            .send()
            .await?;

        Ok(check_status(response).await?.text().await?)
    }
}

/// Where completions come from, chosen once per run.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Standard chat-completion API
    OpenAi {
        /// API client
        client: OpenAiClient,
        /// Model identifier
        model: String,
        /// System message override
        system_message: Option<String>,
        /// Stream tokens instead of waiting for the full reply
        stream: bool,
    },
    /// Custom endpoint returning the test file as plain text
    Endpoint(EndpointClient),
}

/// Text produced for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Full text, to be written in one piece
    Text(String),
    /// Tokens were already delivered to the sink; holds their count
    Streamed(usize),
}

impl Completion {
    /// Returns true if no test content was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Streamed(tokens) => *tokens == 0,
        }
    }
}

impl Backend {
    /// Selects the backend for a run: the custom endpoint when one is
    /// configured, the standard API otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the standard
    /// API is selected without a key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = http_client(config)?;

        if let Some(url) = &config.endpoint {
            return Ok(Self::Endpoint(EndpointClient::new(http, url)));
        }

        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(Error::MissingApiKey)?;

        Ok(Self::OpenAi {
            client: OpenAiClient::new(http, api_key, &config.api_base),
            model: config.model.clone(),
            system_message: config.system_message.clone(),
            stream: config.stream,
        })
    }

    /// Returns true if tokens are delivered incrementally.
    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, Self::OpenAi { stream: true, .. })
    }

    /// Obtains the tests for one prompt.
    ///
    /// When streaming, each token goes to `on_token` as it arrives and
    /// [`Completion::Streamed`] is returned; otherwise the whole text comes
    /// back as [`Completion::Text`]. Callers decide what an empty
    /// [`Completion`] means for their file.
    ///
    /// # Errors
    ///
    /// Propagates transport and sink errors.
    pub async fn complete<F>(
        &self,
        prompt: &str,
        examples: &[Message],
        on_token: F,
    ) -> Result<Completion>
    where
        F: FnMut(&str) -> Result<()>,
    {
        match self {
            Self::Endpoint(client) => client.generate(prompt, examples).await.map(Completion::Text),
            Self::OpenAi {
                client,
                model,
                system_message,
                stream,
            } => {
                let request =
                    CompletionRequest::build(model, system_message.as_deref(), prompt, examples);

                if *stream {
                    client
                        .stream_completion(&request, on_token)
                        .await
                        .map(Completion::Streamed)
                } else {
                    client.get_completion(&request).await.map(Completion::Text)
                }
            }
        }
    }
}
