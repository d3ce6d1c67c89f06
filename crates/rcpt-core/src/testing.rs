//! In-crate fakes for recognition and completion collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::{RecognitionError, StructuringError};
use crate::recognition::{BackendKind, RecognitionBackend, RecognitionOutcome};
use crate::structured::{CompletionClient, CompletionRequest};

/// Shared, ordered record of backend start/end events.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// A recognition backend with a fixed answer.
pub struct ScriptedBackend {
    kind: BackendKind,
    result: Result<String, RecognitionError>,
    confidence: Option<f32>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    log: CallLog,
}

impl ScriptedBackend {
    pub fn succeeding(kind: BackendKind, text: &str, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            kind,
            result: Ok(text.to_string()),
            confidence: None,
            delay: None,
            calls: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    pub fn failing(error: RecognitionError, log: &CallLog) -> Arc<Self> {
        Arc::new(Self {
            kind: error.backend(),
            result: Err(error),
            confidence: None,
            delay: None,
            calls: AtomicUsize::new(0),
            log: log.clone(),
        })
    }

    pub fn with_confidence(self: Arc<Self>, confidence: f32) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).ok().unwrap();
        inner.confidence = Some(confidence);
        Arc::new(inner)
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).ok().unwrap();
        inner.delay = Some(delay);
        Arc::new(inner)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecognitionBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn recognize(&self, _document: &Document) -> Result<RecognitionOutcome, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.push(format!("{}:start", self.kind));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.log.push(format!("{}:end", self.kind));

        self.result.clone().map(|raw_text| RecognitionOutcome {
            raw_text,
            confidence: self.confidence,
            elapsed_ms: 0,
            backend: self.kind,
        })
    }
}

/// A completion client with a fixed answer that records the requests it saw.
pub struct ScriptedCompletion {
    response: Result<Option<String>, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn replying(content: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(Some(content.to_string())),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn without_content() -> Arc<Self> {
        Arc::new(Self {
            response: Ok(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn erroring(message: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Option<String>, StructuringError> {
        self.requests.lock().unwrap().push(request.clone());
        self.response
            .clone()
            .map_err(StructuringError::CompletionFailed)
    }
}

/// Serve one canned HTTP response on a loopback port.
///
/// Returns the base URL and a handle resolving to the raw request text. A
/// `None` response keeps the connection open without answering.
pub async fn serve_once(response: Option<String>) -> (String, tokio::task::JoinHandle<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];

        while !request_complete(&request) {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        match response {
            Some(response) => {
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            None => tokio::time::sleep(Duration::from_secs(30)).await,
        }

        String::from_utf8_lossy(&request).into_owned()
    });

    (url, handle)
}

/// A complete HTTP/1.1 response with a JSON body.
pub fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Base URL of a loopback port with nothing listening on it.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    url
}

fn request_complete(request: &[u8]) -> bool {
    let Some(header_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
    let body = &request[header_end + 4..];

    match head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        Some(length) => body.len() >= length,
        None if head.contains("transfer-encoding: chunked") => body.ends_with(b"0\r\n\r\n"),
        None => true,
    }
}
