//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use quantprep_core::{
    create_router, AppState, Config, GenerationService, LlmErrorKind, Orchestrator, QuantError,
    SessionSnapshot, TextStream,
};
use tokio::sync::Semaphore;

/// How the scripted service answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Stream a complete five-section reply.
    Complete,
    /// Stream the title, then fail.
    BreakAfterTitle,
    /// Fail before streaming anything.
    Refuse,
}

/// A generation service that replays a fixed reply split across chunks at
/// awkward boundaries.
///
/// Titles read `"{difficulty} #{n}"` where `n` counts calls, so tests can tell
/// which settings a question was generated with.
pub struct ScriptedService {
    calls: AtomicUsize,
    script: Mutex<Script>,
    gate: Option<Arc<Semaphore>>,
    models: Mutex<Vec<String>>,
    topics: Mutex<Vec<String>>,
}

impl ScriptedService {
    /// A service that answers immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(Script::Complete),
            gate: None,
            models: Mutex::new(Vec::new()),
            topics: Mutex::new(Vec::new()),
        })
    }

    /// A service whose replies stop after the title until [`Self::release`].
    pub fn held() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            script: Mutex::new(Script::Complete),
            gate: Some(Arc::new(Semaphore::new(0))),
            models: Mutex::new(Vec::new()),
            topics: Mutex::new(Vec::new()),
        })
    }

    /// Lets `n` held replies finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model ids requested so far, in call order.
    pub fn models(&self) -> Vec<String> {
        self.models.lock().unwrap().clone()
    }

    /// Prompt topics requested so far, in call order.
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

impl GenerationService for ScriptedService {
    fn stream<'a>(
        &'a self,
        model_id: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, quantprep_core::Result<TextStream>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.models.lock().unwrap().push(model_id.to_string());
        if let Some(topic) = prompt.lines().find_map(|line| line.strip_prefix("Topic: ")) {
            self.topics.lock().unwrap().push(topic.to_string());
        }
        let script = *self.script.lock().unwrap();
        let difficulty = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Difficulty: "))
            .unwrap_or("Unknown")
            .to_string();
        let gate = self.gate.clone();

        async move {
            if script == Script::Refuse {
                return Err(QuantError::llm_api_error(
                    LlmErrorKind::RateLimit,
                    "quota exceeded",
                ));
            }

            let head = stream::iter(vec![
                Ok("### TI".to_string()),
                Ok(format!("TLE\n{difficulty} #{n}\n### QUEST")),
            ]);
            let tail = stream::once(async move {
                if let Some(gate) = gate {
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                }
                if script == Script::BreakAfterTitle {
                    return Err(QuantError::llm_api_error(
                        LlmErrorKind::Network,
                        "connection reset",
                    ));
                }
                Ok("ION\nA fair coin is flipped until two heads in a row. Find $E[N]$.\n\
                    ### HINT\nCondition on the first flips.\n\
                    ### SOLUTION\n$E[N] = 6$.\n\
                    ### TAKEAWAY\nFirst-step analysis."
                    .to_string())
            });

            Ok(head.chain(tail).boxed())
        }
        .boxed()
    }
}

/// Config sized for tests: `batch_size` slots and a deep event buffer.
pub fn test_config(batch_size: usize) -> Config {
    Config {
        batch_size,
        event_capacity: 1024,
        ..Default::default()
    }
}

/// Builds an orchestrator over `service`.
pub fn orchestrator(service: Arc<ScriptedService>, batch_size: usize) -> Orchestrator {
    Orchestrator::from_config(&test_config(batch_size), service)
}

/// Polls the orchestrator until `pred` holds, failing after five seconds.
pub async fn wait_for(orchestrator: &Orchestrator, pred: impl Fn(&SessionSnapshot) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if pred(&orchestrator.snapshot()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Serves the full router for `orchestrator` on a free local port and
/// returns its base HTTP URL.
pub async fn spawn_test_server(orchestrator: Orchestrator) -> (String, tokio::task::JoinHandle<()>) {
    let router = create_router(AppState::new(orchestrator));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (format!("http://{addr}"), handle)
}
