use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::drain_limited;
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ai-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    Claude,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Gemini, Provider::Claude];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Claude => "claude",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Provider::OpenAi => "ChatGPT",
            Provider::Gemini => "Gemini",
            Provider::Claude => "Claude",
        }
    }

    pub fn next(self) -> Provider {
        match self {
            Provider::OpenAi => Provider::Gemini,
            Provider::Gemini => Provider::Claude,
            Provider::Claude => Provider::OpenAi,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeContext {
    pub language: Language,
    pub code: String,
}

/// Request bodies; serialized flat as the HTTP JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AiRequest {
    Chat {
        provider: Provider,
        message: String,
        context: Option<CodeContext>,
    },
    Explain {
        provider: Provider,
        code: String,
        language: Language,
    },
    Fix {
        provider: Provider,
        code: String,
        error: String,
        language: Language,
    },
}

impl AiRequest {
    pub fn path(&self) -> &'static str {
        match self {
            AiRequest::Chat { .. } => "chat",
            AiRequest::Explain { .. } => "explain",
            AiRequest::Fix { .. } => "fix",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOutcome {
    Answer(String),
    /// The backend answered with `success: false`.
    Rejected(String),
    /// The request never produced an envelope.
    Transport(String),
}

impl From<AiEnvelope> for AiOutcome {
    fn from(envelope: AiEnvelope) -> Self {
        if envelope.success {
            AiOutcome::Answer(envelope.response.unwrap_or_default())
        } else {
            AiOutcome::Rejected(
                envelope
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiCompletion {
    pub id: RequestId,
    pub outcome: AiOutcome,
}

/// Fire-and-forget request dispatch. Completions are queued in arrival
/// order and drained by the UI loop.
pub trait AiBackend {
    fn dispatch(&self, id: RequestId, request: AiRequest);
    fn drain_completions_limited(&self, max_events: usize) -> Vec<AiCompletion>;
}

pub struct HttpAiBackend {
    endpoint: String,
    client: reqwest::blocking::Client,
    completion_tx: Sender<AiCompletion>,
    completion_rx: Receiver<AiCompletion>,
}

impl HttpAiBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> io::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(io::Error::other)?;
        let (completion_tx, completion_rx) = mpsc::channel();
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
            completion_tx,
            completion_rx,
        })
    }

    pub fn url_for(&self, request: &AiRequest) -> String {
        format!("{}/api/ai/{}", self.endpoint, request.path())
    }
}

impl AiBackend for HttpAiBackend {
    fn dispatch(&self, id: RequestId, request: AiRequest) {
        let url = self.url_for(&request);
        let client = self.client.clone();
        let tx = self.completion_tx.clone();
        thread::spawn(move || {
            tracing::info!(%id, %url, "ai request dispatched");
            let outcome = match post_envelope(&client, &url, &request) {
                Ok(envelope) => AiOutcome::from(envelope),
                Err(err) => {
                    tracing::warn!(%id, "ai request failed: {err}");
                    AiOutcome::Transport(err.to_string())
                }
            };
            let _ = tx.send(AiCompletion { id, outcome });
        });
    }

    fn drain_completions_limited(&self, max_events: usize) -> Vec<AiCompletion> {
        drain_limited(&self.completion_rx, max_events)
    }
}

fn post_envelope(
    client: &reqwest::blocking::Client,
    url: &str,
    request: &AiRequest,
) -> reqwest::Result<AiEnvelope> {
    client
        .post(url)
        .json(request)
        .send()?
        .error_for_status()?
        .json::<AiEnvelope>()
}
