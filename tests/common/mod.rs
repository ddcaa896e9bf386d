//! Shared scaffolding for the end-to-end pipeline/auth tests.
//!
//! The remote MCP server is faked with a small hand-rolled HTTP/1.1
//! listener rather than `wiremock`, because the SSE connection in these
//! scenarios must stay open across multiple requests on the *same* host
//! (GET for the event stream, POST for replies, GET for OIDC discovery) the
//! way a real MCP server would, and `wiremock`'s request/response model
//! closes the body as soon as a response is built.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

/// A canned reply to the next POST the fake server receives.
#[derive(Clone)]
pub struct PostReply {
    pub status: u16,
    pub body: String,
    pub www_authenticate: Option<String>,
}

impl PostReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            www_authenticate: None,
        }
    }

    pub fn accepted() -> Self {
        Self {
            status: 202,
            body: String::new(),
            www_authenticate: None,
        }
    }

    pub fn unauthorized(www_authenticate: impl Into<String>) -> Self {
        Self {
            status: 401,
            body: String::new(),
            www_authenticate: Some(www_authenticate.into()),
        }
    }
}

/// A running fake MCP server plus handles to observe and steer it.
pub struct FakeServer {
    pub addr: SocketAddr,
    pub posts: Arc<Mutex<Vec<(String, String)>>>,
    responses: Arc<Mutex<VecDeque<PostReply>>>,
    discovery: Arc<Mutex<Option<String>>>,
}

impl FakeServer {
    /// `sse_path` streams `sse_frames` (already-formatted `data: ...`
    /// payloads, one per SSE event) once chunked, then holds the
    /// connection open indefinitely, matching a real long-lived SSE
    /// subscription. POST responses are served from a queue, oldest first;
    /// an exhausted queue serves `202`.
    pub async fn start(sse_path: &str, sse_frames: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");

        let posts = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(Mutex::new(VecDeque::new()));
        let discovery: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let sse_path = sse_path.to_string();
        let posts_bg = posts.clone();
        let responses_bg = responses.clone();
        let discovery_bg = discovery.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(handle_connection(
                    stream,
                    sse_path.clone(),
                    sse_frames.clone(),
                    posts_bg.clone(),
                    responses_bg.clone(),
                    discovery_bg.clone(),
                ));
            }
        });

        Self {
            addr,
            posts,
            responses,
            discovery,
        }
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn queue_post_reply(&self, reply: PostReply) {
        self.responses.lock().unwrap().push_back(reply);
    }

    pub fn set_discovery_body(&self, body: impl Into<String>) {
        *self.discovery.lock().unwrap() = Some(body.into());
    }

    pub fn received_posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }
}

async fn handle_connection(
    stream: TcpStream,
    sse_path: String,
    sse_frames: Vec<String>,
    posts: Arc<Mutex<Vec<(String, String)>>>,
    responses: Arc<Mutex<VecDeque<PostReply>>>,
    discovery: Arc<Mutex<Option<String>>>,
) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let path = parts.next().unwrap_or("/").to_string();
    let path_only = path.split('?').next().unwrap_or("/").to_string();

    let mut content_length: usize = 0;
    loop {
        let mut header_line = String::new();
        if reader.read_line(&mut header_line).await.unwrap_or(0) == 0 {
            return;
        }
        let trimmed = header_line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if let Some(value) = trimmed
            .split_once(':')
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .map(|(_, v)| v.trim())
        {
            content_length = value.parse().unwrap_or(0);
        }
    }

    // `BufReader` forwards `AsyncWrite` straight to the wrapped socket, so
    // reusing it (rather than unwrapping back to the raw `TcpStream`) keeps
    // any request bytes it has already buffered past the header boundary
    // available to the body read below.
    let mut stream = reader;

    if method == "GET" && path_only == sse_path {
        let headers = "HTTP/1.1 200 OK\r\n\
             Content-Type: text/event-stream\r\n\
             Transfer-Encoding: chunked\r\n\r\n";
        if stream.write_all(headers.as_bytes()).await.is_err() {
            return;
        }
        for frame in sse_frames {
            let payload = format!("data: {frame}\n\n");
            if write_chunk(&mut stream, payload.as_bytes()).await.is_err() {
                return;
            }
        }
        // Hold the connection open, as a real SSE subscription would.
        std::future::pending::<()>().await;
        return;
    }

    if method == "GET" {
        if let Some(body) = discovery.lock().unwrap().clone() {
            let _ = write_full_response(&mut stream, 200, "application/json", &body).await;
            return;
        }
        let _ = write_full_response(&mut stream, 404, "text/plain", "not found").await;
        return;
    }

    if method == "POST" {
        let mut body = vec![0u8; content_length];
        if content_length > 0 && stream.read_exact(&mut body).await.is_err() {
            return;
        }
        let body = String::from_utf8_lossy(&body).to_string();
        posts.lock().unwrap().push((path_only, body));

        let reply = responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(PostReply::accepted);

        let extra_header = reply
            .www_authenticate
            .as_ref()
            .map(|v| format!("WWW-Authenticate: {v}\r\n"))
            .unwrap_or_default();
        let status_line = status_line_for(reply.status);
        let response = format!(
            "HTTP/1.1 {status_line}\r\n{extra_header}Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            reply.body.len(),
            reply.body
        );
        let _ = stream.write_all(response.as_bytes()).await;
        return;
    }

    let _ = write_full_response(&mut stream, 404, "text/plain", "not found").await;
}

async fn write_chunk(stream: &mut BufReader<TcpStream>, data: &[u8]) -> std::io::Result<()> {
    stream.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
    stream.write_all(data).await?;
    stream.write_all(b"\r\n").await
}

async fn write_full_response(
    stream: &mut BufReader<TcpStream>,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
        status_line_for(status),
        body.len()
    );
    stream.write_all(response.as_bytes()).await
}

fn status_line_for(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        202 => "202 Accepted",
        400 => "400 Bad Request",
        401 => "401 Unauthorized",
        403 => "403 Forbidden",
        404 => "404 Not Found",
        _ => "500 Internal Server Error",
    }
}

/// A `std::io::Write` sink backed by a shared buffer, so a test can inspect
/// what the pipeline has written to "stdout" while it is still running.
#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl std::io::Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Polls `predicate(out.contents())` until it's true or `timeout` elapses.
pub async fn wait_for(out: &SharedWriter, timeout: std::time::Duration, predicate: impl Fn(&str) -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate(&out.contents()) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for output; got: {:?}", out.contents());
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
