//! Scripted stand-in for an Ollama server, speaking just enough HTTP/1.1.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ollama_chat_lib::llm::{OllamaClient, OllamaConfig};
use ollama_chat_lib::InferenceSession;

/// What the fake server does with one connection.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Complete response with a `Content-Length`.
    Json { status: u16, body: String },
    /// Body delimited by connection close, one line per write.
    Stream(Vec<String>),
    /// Declares a longer body than it sends, then hangs up.
    Truncated(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub body: String,
}

pub struct FakeOllama {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub handle: tokio::task::JoinHandle<()>,
}

/// Route library logs to the test output; `RUST_LOG=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl FakeOllama {
    pub async fn start(script: Vec<Scripted>) -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            for step in script {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                if let Some(request) = read_request(&mut socket).await {
                    recorded.lock().unwrap().push(request);
                }
                respond(&mut socket, step).await;
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn session(&self, model: Option<&str>) -> InferenceSession {
        session_for(&self.url(), model)
    }
}

pub fn session_for(url: &str, model: Option<&str>) -> InferenceSession {
    let config = OllamaConfig {
        base_url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(5),
        list_timeout: Duration::from_secs(5),
    };
    let client = OllamaClient::new(&config).unwrap();
    InferenceSession::with_client(client, model.map(str::to_string))
}

/// An address with nothing listening on it.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn ndjson(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    Some(Recorded { method, path, body })
}

async fn respond(socket: &mut TcpStream, step: Scripted) {
    match step {
        Scripted::Json { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        }
        Scripted::Stream(lines) => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for line in lines {
                let _ = socket.write_all(line.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Scripted::Truncated(lines) => {
            let sent: usize = lines.iter().map(String::len).sum();
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                sent + 1024
            );
            let _ = socket.write_all(head.as_bytes()).await;
            for line in lines {
                let _ = socket.write_all(line.as_bytes()).await;
                let _ = socket.flush().await;
            }
        }
    }
    let _ = socket.shutdown().await;
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
