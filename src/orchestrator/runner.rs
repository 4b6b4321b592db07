//! Agent invocation seam.
//!
//! [`ProcessAgentRunner`] is the real thing: it builds the provider's command
//! line, spawns it through the subprocess orchestrator and normalizes every
//! record. Tests swap in a scripted runner.

use crate::config::ProviderProfile;
use crate::error::Result;
use crate::provider::{ExecutionRequest, ProviderKind, ProviderMessage, StreamSession};
use crate::subprocess::{Record, SpawnSpec, spawn_json_process};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub provider: ProviderKind,
    pub execution: ExecutionRequest,
    pub profile: Option<ProviderProfile>,
    pub idle_timeout: Duration,
}

/// Normalized messages of one invocation. Ends when the process ends or the
/// token is cancelled.
pub struct MessageStream {
    inner: BoxStream<'static, ProviderMessage>,
}

impl MessageStream {
    pub fn new(inner: BoxStream<'static, ProviderMessage>) -> Self {
        Self { inner }
    }

    pub async fn next(&mut self) -> Option<ProviderMessage> {
        self.inner.next().await
    }
}

pub trait AgentRunner: Send + Sync {
    fn start(&self, request: AgentRequest, cancel: CancellationToken) -> Result<MessageStream>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAgentRunner;

impl AgentRunner for ProcessAgentRunner {
    fn start(&self, request: AgentRequest, cancel: CancellationToken) -> Result<MessageStream> {
        let provider = request.provider.provider();
        let mut invocation = provider.build_invocation(&request.execution);
        if let Some(profile) = &request.profile {
            invocation = invocation.with_profile(profile)?;
        }

        info!(
            provider = provider.name(),
            program = %invocation.program,
            model = %request.execution.model,
            resume = request.execution.resume_session.is_some(),
            "starting agent"
        );

        let mut spec = SpawnSpec::new(invocation.program, &request.execution.cwd)
            .args(invocation.args)
            .idle_timeout(request.idle_timeout);
        for (key, value) in invocation.env {
            spec = spec.env(key, value);
        }
        if let Some(stdin) = invocation.stdin {
            spec = spec.stdin(stdin);
        }

        let process = spawn_json_process(spec, cancel)?;
        let session = StreamSession::new(request.execution.resume_session);

        let messages = stream::unfold((process, session), move |(mut process, mut session)| async move {
            loop {
                let message = match process.next().await? {
                    Record::Json(value) => match provider.normalize(&value, &mut session) {
                        Some(message) => message,
                        None => {
                            debug!(record_type = ?value.get("type"), "skipping record");
                            continue;
                        }
                    },
                    Record::Error(err) => ProviderMessage::Error {
                        message: err.to_string(),
                        exit_code: err.exit_code(),
                        session_id: session.session_id.clone(),
                    },
                };
                return Some((message, (process, session)));
            }
        });

        Ok(MessageStream::new(messages.boxed()))
    }
}
