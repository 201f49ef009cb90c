//! Static file server
//!
//! Serves the output directory over plain HTTP with `tiny_http`, on a
//! dedicated thread:
//!
//! - `index.html` resolution for directories
//! - Content type guessed from the file extension
//! - Percent-decoded URLs, query strings ignored
//! - Anything that would leave the root is a 404

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tiny_http::{Header, Request, Response, Server};

/// Port used when none is given
pub const DEFAULT_PORT: u16 = 8080;

/// A running server. Closing (or dropping) it stops listening.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<Server>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle").field("addr", &self.addr).finish()
    }
}

impl ServerHandle {
    /// Address the server is bound to
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop listening and wait for the server thread to exit
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.server.unblock();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            tracing::warn!("Server thread panicked");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Serve `root` on `0.0.0.0:port`. Port `0` picks a free port.
///
/// A missing root is a configuration error, raised before binding.
pub fn serve(root: impl Into<PathBuf>, port: u16) -> Result<ServerHandle> {
    let root = root.into();
    if !root.is_dir() {
        return Err(pipefold_core::Error::ConfigInvalid {
            message: format!("output directory {} does not exist", root.display()),
        }
        .into());
    }

    let bind = SocketAddr::from(([0, 0, 0, 0], port));
    let server = Server::http(bind).map_err(|err| anyhow!("Failed to bind {bind}: {err}"))?;
    let addr = server
        .server_addr()
        .to_ip()
        .context("Server is not listening on an IP address")?;
    let server = Arc::new(server);

    tracing::info!("Serving {} at http://{}", root.display(), addr);

    let thread = std::thread::Builder::new()
        .name("pipefold-serve".to_string())
        .spawn({
            let server = Arc::clone(&server);
            move || {
                for request in server.incoming_requests() {
                    if let Err(err) = handle_request(request, &root) {
                        tracing::warn!("Request error: {err}");
                    }
                }
                tracing::debug!("Server stopped");
            }
        })
        .context("Failed to spawn server thread")?;

    Ok(ServerHandle {
        addr,
        server,
        thread: Some(thread),
    })
}

fn handle_request(request: Request, root: &Path) -> Result<()> {
    match request_path(request.url()).and_then(|path| resolve(root, &path)) {
        Some(local) => serve_file(request, &local),
        None => {
            tracing::debug!("404 {}", request.url());
            request.respond(Response::from_string("404 Not Found").with_status_code(404))?;
            Ok(())
        }
    }
}

/// Percent-decoded path of a request URL, without query or edge slashes.
///
/// `None` when the decoded bytes are not UTF-8.
fn request_path(url: &str) -> Option<String> {
    let raw = url.split('?').next().unwrap_or(url);
    let decoded = urlencoding::decode(raw).ok()?;
    Some(decoded.trim_matches('/').to_string())
}

/// Map a request path to a file under `root`.
fn resolve(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = Path::new(request_path);
    if !relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return None;
    }

    let local = root.join(relative);
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    (local.is_dir() && index.is_file()).then_some(index)
}

fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let header = Header::from_bytes("Content-Type", guess_content_type(path))
        .map_err(|()| anyhow!("Invalid content type for {}", path.display()))?;

    request.respond(Response::from_data(content).with_header(header))?;
    Ok(())
}

/// Guess MIME content type from file extension.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}
