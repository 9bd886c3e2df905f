//! Minimal HTTP/1.1 server for exercising the provider clients in tests.
//!
//! Each connection carries one request; the reply closes it.

use crate::error::ProviderError;
use crate::provider::ProviderEndpoint;
use serde_json::Value;
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

pub struct StubReply {
    status: u16,
    body: String,
    delay: Duration,
}

impl StubReply {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> StubReply + Send + Sync>;

#[derive(Default)]
struct Traffic {
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

pub struct StubServer {
    base_url: String,
    traffic: Arc<Traffic>,
}

impl StubServer {
    pub async fn start<F>(handler: F) -> std::io::Result<Self>
    where
        F: Fn(&RecordedRequest) -> StubReply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}/v1", listener.local_addr()?);
        let handler: Handler = Arc::new(handler);
        let traffic = Arc::new(Traffic::default());

        let shared = Arc::clone(&traffic);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let traffic = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, handler, traffic).await;
                });
            }
        });

        Ok(Self { base_url, traffic })
    }

    /// Endpoint pointed at this server, bypassing any proxy configured in the environment.
    pub fn endpoint(&self, api_key: Option<&str>) -> Result<ProviderEndpoint, ProviderError> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(ProviderEndpoint::new(&self.base_url, api_key.map(str::to_string))?.with_client(client))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.traffic
            .requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.traffic.peak_in_flight.load(Ordering::SeqCst)
    }
}

async fn serve(mut stream: TcpStream, handler: Handler, traffic: Arc<Traffic>) -> std::io::Result<()> {
    let request = read_request(&mut stream).await?;
    if let Ok(mut requests) = traffic.requests.lock() {
        requests.push(request.clone());
    }

    let current = traffic.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    traffic.peak_in_flight.fetch_max(current, Ordering::SeqCst);

    let reply = handler(&request);
    tokio::time::sleep(reply.delay).await;
    traffic.in_flight.fetch_sub(1, Ordering::SeqCst);

    let head = format!(
        "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
        reply.status,
        reply.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(reply.body.as_bytes()).await?;
    stream.shutdown().await
}

async fn read_request(stream: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            return Err(Error::new(ErrorKind::UnexpectedEof, "closed before headers"));
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).into_owned();
    let mut lines = head.lines();
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0;
    let mut authorization = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.trim().parse().unwrap_or(0);
        } else if name.eq_ignore_ascii_case("authorization") {
            authorization = Some(value.trim().to_string());
        }
    }

    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    Ok(RecordedRequest {
        path,
        authorization,
        body: serde_json::from_slice(&buffer[header_end..]).unwrap_or(Value::Null),
    })
}
