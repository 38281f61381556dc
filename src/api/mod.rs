//! HTTP front end for the upload service.
//!
//! A single server thread accepts connections and handles them one at a time, so every upload
//! is counted to completion before the next request is read.

mod multipart;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::counter::CancelFlag;
use crate::error::CountError;
use crate::upload::{UploadError, UploadService};

const MAX_HEADER_BYTES: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub max_upload_bytes: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8800".to_string(),
            max_upload_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    cancel: CancelFlag,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections, cancel any count in flight and wait for the server thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: UploadService,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: UploadService) -> Self {
        Self { cfg, service }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cancel = CancelFlag::new();
        let cancel_thread = cancel.clone();
        let Self { cfg, mut service } = self;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, &cfg, &mut service, &cancel_thread, shutdown_thread)
            {
                log::error!("counter api stopped: {}", err);
            }
        });
        log::info!("counter api listening on {}", addr);

        Ok(ApiHandle {
            addr,
            shutdown,
            cancel,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: &ApiConfig,
    service: &mut UploadService,
    cancel: &CancelFlag,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, cfg, service, cancel) {
                    log::warn!("counter api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    service: &mut UploadService,
    cancel: &CancelFlag,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    if local.ip().is_loopback() && !peer.ip().is_loopback() {
        write_error(&mut stream, 403, "forbidden")?;
        return Ok(());
    }

    let request = match read_request(&mut stream, cfg.max_upload_bytes) {
        Ok(request) => request,
        Err(RequestError::TooLarge) => {
            write_error(&mut stream, 413, "payload_too_large")?;
            return Err(anyhow!("request exceeds {} bytes", cfg.max_upload_bytes));
        }
        Err(RequestError::Malformed(err)) => {
            write_error(&mut stream, 400, "bad_request")?;
            return Err(err);
        }
    };

    let route = route(&request.path);
    match (request.method.as_str(), route) {
        ("GET", Route::Root) => write_json(
            &mut stream,
            200,
            &serde_json::json!({"message": "Backend is running!"}),
        ),
        ("GET", Route::Health) => write_json(&mut stream, 200, &serde_json::json!({"status": "ok"})),
        ("POST", Route::Upload) => handle_upload(&mut stream, &request, service, cancel),
        ("GET", Route::Result(id)) => match service.result(id) {
            Ok(Some(doc)) => write_json(&mut stream, 200, &doc),
            Ok(None) => write_error(&mut stream, 404, "not_found"),
            Err(err) => {
                write_error(&mut stream, 500, "store")?;
                Err(err.context(format!("failed to read result {}", id)))
            }
        },
        (_, Route::NotFound) => write_error(&mut stream, 404, "not_found"),
        _ => write_error(&mut stream, 405, "method_not_allowed"),
    }
}

fn handle_upload(
    stream: &mut TcpStream,
    request: &HttpRequest,
    service: &mut UploadService,
    cancel: &CancelFlag,
) -> Result<()> {
    let content_type = request
        .headers
        .get("content-type")
        .map(String::as_str)
        .unwrap_or("");
    let (bytes, filename) = match multipart::boundary(content_type) {
        Some(boundary) => {
            let parts = match multipart::parse(&request.body, &boundary) {
                Ok(parts) => parts,
                Err(err) => {
                    write_error(stream, 400, "bad_multipart")?;
                    return Err(err);
                }
            };
            match parts.into_iter().find(|part| part.name.as_deref() == Some("file")) {
                Some(part) => (part.data, part.filename),
                None => {
                    write_error(stream, 400, "missing_file")?;
                    return Err(anyhow!("multipart upload has no 'file' part"));
                }
            }
        }
        None => (request.body.as_slice(), None),
    };

    match service.process(bytes, filename.as_deref(), cancel) {
        Ok(response) => write_json(stream, 200, &response),
        Err(err) => {
            let status = upload_error_status(&err);
            write_error(stream, status, err.kind())?;
            Err(anyhow!("upload failed: {}", err))
        }
    }
}

fn upload_error_status(err: &UploadError) -> u16 {
    match err {
        UploadError::Empty => 400,
        UploadError::Count(CountError::VideoOpen { .. }) => 422,
        _ => 500,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    Root,
    Health,
    Upload,
    Result(&'a str),
    NotFound,
}

fn route(path: &str) -> Route<'_> {
    match path {
        "/" => Route::Root,
        "/health" => Route::Health,
        "/upload-video" | "/upload-video/" => Route::Upload,
        _ => match path.strip_prefix("/results/") {
            Some(id) if !id.is_empty() && !id.contains('/') => Route::Result(id),
            _ => Route::NotFound,
        },
    }
}

enum RequestError {
    TooLarge,
    Malformed(anyhow::Error),
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Malformed(err.into())
    }
}

fn read_request(stream: &mut TcpStream, max_body: u64) -> Result<HttpRequest, RequestError> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut buf = [0u8; 8192];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Malformed(anyhow!(
                "connection closed before headers"
            )));
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::Malformed(anyhow!("request headers too large")));
        }
    };

    let text = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| RequestError::Malformed(anyhow!("empty request")))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RequestError::Malformed(anyhow!("missing method")))?;
    let raw_path = parts
        .next()
        .ok_or_else(|| RequestError::Malformed(anyhow!("missing path")))?;
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: u64 = match headers.get("content-length") {
        Some(value) => value
            .parse()
            .map_err(|_| RequestError::Malformed(anyhow!("invalid content-length")))?,
        None => 0,
    };
    if content_length > max_body {
        return Err(RequestError::TooLarge);
    }
    let mut body = data.split_off(header_end + 4);
    let content_length = content_length as usize;
    if body.len() > content_length {
        body.truncate(content_length);
    }
    while body.len() < content_length {
        let want = (content_length - body.len()).min(buf.len());
        let n = stream.read(&mut buf[..want])?;
        if n == 0 {
            return Err(RequestError::Malformed(anyhow!("request body truncated")));
        }
        body.extend_from_slice(&buf[..n]);
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn write_error(stream: &mut TcpStream, status: u16, kind: &str) -> Result<()> {
    write_json(stream, status, &serde_json::json!({ "error": kind }))
}

fn write_json<T: Serialize>(stream: &mut TcpStream, status: u16, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_known_paths() {
        assert_eq!(route("/"), Route::Root);
        assert_eq!(route("/upload-video/"), Route::Upload);
        assert_eq!(route("/upload-video"), Route::Upload);
        assert_eq!(route("/results/abc"), Route::Result("abc"));
        assert_eq!(route("/results/"), Route::NotFound);
        assert_eq!(route("/results/a/b"), Route::NotFound);
        assert_eq!(route("/events"), Route::NotFound);
    }

    #[test]
    fn video_errors_are_unprocessable() {
        let err = UploadError::Count(CountError::video_open("x", "bad header"));
        assert_eq!(upload_error_status(&err), 422);
        assert_eq!(upload_error_status(&UploadError::Empty), 400);
        let err = UploadError::Count(CountError::UnknownClass {
            class_id: 3,
            table_len: 1,
        });
        assert_eq!(upload_error_status(&err), 500);
    }
}
