//! Test server wrapper that serves the Concord routes on a random port

use std::net::SocketAddr;
use std::sync::Arc;

use concord_config::Config;
use concord_llm::{Backend, BackendRegistry, Dispatcher, LlmState, llm_router};
use tokio_util::sync::CancellationToken;

/// Backends used by most tests, in resolution order
pub const DEFAULT_CONFIG: &str = r#"
[llm]
default_model = "anthropic.claude-3-haiku-20240307-v1:0"
log_confidence = true

[llm.backends.claude]
format = "bedrock_claude"
models.include = ["^anthropic\\."]

[llm.backends.titan]
format = "bedrock_titan"
models.include = ["^amazon\\.titan"]

[llm.backends.openai]
format = "openai"
models.exclude = ["^anthropic\\.", "^amazon\\."]
models.overrides."gpt-4o" = { alias = "smart" }
"#;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
}

impl TestServer {
    /// Start a server for `config`, attaching the given backends
    ///
    /// Binds to port 0 for automatic port assignment
    pub async fn start(config: &str, backends: Vec<Arc<dyn Backend>>) -> anyhow::Result<Self> {
        let config = Config::parse(config)?;

        // every test in a binary shares one global subscriber
        let _ = concord_telemetry::init(&config.telemetry);

        let mut registry = BackendRegistry::from_config(&config.llm)?;
        for backend in backends {
            registry.register(backend)?;
        }

        let state = LlmState::new(Dispatcher::new(&config.llm), Arc::new(registry));
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, llm_router(state))
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self { addr, shutdown, client })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST a JSON body and return the response
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("request should reach the test server")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Parse SSE `data:` payloads from raw response text
pub fn sse_data(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(str::to_owned)
        .collect()
}

/// Parse SSE `event:` names from raw response text
pub fn sse_event_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("event: "))
        .map(str::to_owned)
        .collect()
}
