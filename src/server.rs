//! HTTP endpoints for the packaging service.
//!
//! - `GET /` serves the front-end page, or a status line if none is deployed
//! - `POST /generate` takes the multipart upload and answers with the zip

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, State, multipart::{MultipartError, MultipartRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::packager::Packager;
use crate::types::{PackageRequest, UploadedSample};
use crate::{Error, Result};

/// Body served by `GET /` when `static/index.html` is absent.
pub const INDEX_FALLBACK: &str = "<h1>NKI Generator backend is running.</h1>";

/// Multipart field names accepted by `POST /generate`.
pub mod fields {
    pub const ROOT_NOTE: &str = "root_note";
    pub const INSTRUMENT_NAME: &str = "instrument_name";
    pub const WAV_FILES: &str = "wav_files";
}

// ============================================================================
// Shared State
// ============================================================================

struct AppState {
    packager: Packager,
}

// ============================================================================
// HTTP Handlers
// ============================================================================

async fn home(State(state): State<Arc<AppState>>) -> Html<String> {
    let index = state.packager.config().static_dir.join("index.html");
    match tokio::fs::read_to_string(&index).await {
        Ok(html) => Html(html),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %index.display(), error = %e, "Failed to read index page");
            }
            Html(INDEX_FALLBACK.to_string())
        }
    }
}

async fn generate(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let multipart = multipart
        .map_err(|e| Error::InvalidRequest(format!("Malformed form data: {}", e.body_text())))?;
    let limit = state.packager.config().max_upload_bytes;
    let request = read_generate_form(multipart, limit).await?;

    info!(
        root_note = %request.root_note,
        instrument = %request.instrument_name,
        files = request.samples.len(),
        "POST generate"
    );

    let package = state.packager.generate(request).await?;
    let body = tokio::fs::read(&package.path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&package.file_name),
            ),
        ],
        body,
    )
        .into_response())
}

/// Collect the `/generate` form into a [`PackageRequest`].
///
/// `limit` is the body limit in force, reported when a part overruns it.
async fn read_generate_form(mut multipart: Multipart, limit: usize) -> Result<PackageRequest> {
    let malformed = |e: MultipartError| form_error(e, limit);
    let mut root_note = None;
    let mut instrument_name = None;
    let mut samples = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };

        match name.as_str() {
            fields::ROOT_NOTE => root_note = Some(field.text().await.map_err(malformed)?),
            fields::INSTRUMENT_NAME => {
                instrument_name = Some(field.text().await.map_err(malformed)?)
            }
            fields::WAV_FILES => {
                let file_name = field.file_name().unwrap_or_default().to_owned();
                let data = field.bytes().await.map_err(malformed)?;
                // Browsers send an empty part when no file was picked.
                if file_name.is_empty() && data.is_empty() {
                    debug!("Skipping empty file part");
                    continue;
                }
                samples.push(UploadedSample { file_name, data });
            }
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }

    Ok(PackageRequest {
        root_note: root_note.ok_or_else(|| missing(fields::ROOT_NOTE))?,
        instrument_name: instrument_name.ok_or_else(|| missing(fields::INSTRUMENT_NAME))?,
        samples,
    })
}

fn form_error(e: MultipartError, limit: usize) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(limit)
    } else {
        Error::InvalidRequest(format!("Malformed form data: {}", e.body_text()))
    }
}

fn missing(field: &str) -> Error {
    Error::InvalidRequest(format!("Missing form field: {field}"))
}

/// `attachment` disposition naming `file_name`.
///
/// Non-ASCII names also get an RFC 5987 `filename*` parameter.
fn content_disposition(file_name: &str) -> HeaderValue {
    let quoted = file_name.replace('\\', "\\\\").replace('"', "\\\"");
    let value = if file_name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        format!("attachment; filename=\"{quoted}\"")
    } else {
        let ascii: String = quoted
            .chars()
            .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
            .collect();
        format!(
            "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
            utf8_percent_encode(file_name, ATTR_CHAR)
        )
    };
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// RFC 5987 `attr-char`: alphanumerics and `!#$&+-.^_|~` plus backtick
/// pass through, everything else is escaped.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

// ============================================================================
// Server
// ============================================================================

/// Build the service router around `packager`.
pub fn router(packager: Packager) -> Router {
    let body_limit = packager.config().max_upload_bytes;
    let state = Arc::new(AppState { packager });

    Router::new()
        .route("/", get(home))
        .route("/generate", post(generate))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// A bound, not yet running packaging server.
pub struct PackagingServer {
    listener: TcpListener,
    app: Router,
    local_addr: SocketAddr,
}

impl PackagingServer {
    /// Validate `config`, create its directories and bind the listener.
    ///
    /// Use port 0 in `config.bind` for automatic port selection.
    pub async fn bind(config: ServiceConfig) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let listener = TcpListener::bind(config.bind)
            .await
            .map_err(|e| Error::Server(format!("Failed to bind {}: {e}", config.bind)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::Server(format!("Failed to get local addr: {e}")))?;

        info!(
            addr = %local_addr,
            work_dir = %config.work_dir.display(),
            template_dir = %config.template_dir.display(),
            root_notes = ?config.root_notes.root_notes().collect::<Vec<_>>(),
            "Packaging server listening"
        );

        let app = router(Packager::new(Arc::new(config)));

        Ok(Self {
            listener,
            app,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve requests until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Server(format!("HTTP server error: {e}")))?;

        info!("Packaging server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_disposition_is_quoted() {
        let value = content_disposition("Snare_C1_abc.zip");
        assert_eq!(value, "attachment; filename=\"Snare_C1_abc.zip\"");
    }

    #[test]
    fn quotes_are_escaped() {
        let value = content_disposition("My \"Kit\"_C1_x.zip");
        assert_eq!(value, "attachment; filename=\"My \\\"Kit\\\"_C1_x.zip\"");
    }

    #[test]
    fn non_ascii_gets_extended_filename() {
        let value = content_disposition("Caisse_claire_é_C1.zip");
        let text = value.to_str().unwrap();
        assert!(text.starts_with("attachment; filename=\"Caisse_claire___C1.zip\""));
        assert!(text.ends_with("filename*=UTF-8''Caisse_claire_%C3%A9_C1.zip"));
    }

    #[test]
    fn extended_filename_escapes_non_attr_chars() {
        let value = content_disposition("Kit ñ (v2)_C1.zip");
        let text = value.to_str().unwrap();
        assert!(text.ends_with("filename*=UTF-8''Kit%20%C3%B1%20%28v2%29_C1.zip"));
    }
}
