use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::glyphs::load_glyphs;
use crate::table::render_table;

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub port: u16,
    /// Directory served for every path other than the index routes.
    pub root: PathBuf,
    pub glyphs: PathBuf,
    /// Prebuilt page preferred over the generated table when present.
    pub table: Option<PathBuf>,
    pub open_browser: bool,
}

impl ServeConfig {
    pub fn url(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }
}

type SharedConfig = Arc<ServeConfig>;

pub async fn serve(config: ServeConfig) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let url = config.url();
    let open_browser = config.open_browser;
    info!(
        %addr,
        root = %config.root.display(),
        glyphs = %config.glyphs.display(),
        "binding HTTP listener"
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    println!(
        "Serving {} at {url} (press Ctrl-C to stop)",
        config
            .glyphs
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| config.glyphs.display().to_string())
    );
    if open_browser {
        let target = url.clone();
        let _ = tokio::task::spawn_blocking(move || crate::open_with_system(&target));
    }

    let router = build_router(Arc::new(config));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("HTTP server exited");
    Ok(())
}

pub fn build_router(config: SharedConfig) -> Router {
    let static_files = ServeDir::new(&config.root);
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/glyphs.json", get(glyph_rows))
        .fallback_service(static_files)
        .with_state(config)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    println!("\nStopping server");
}

async fn index(State(config): State<SharedConfig>) -> Response {
    if let Some(table) = config.table.as_ref() {
        match tokio::fs::read(table).await {
            Ok(bytes) => {
                debug!(path = %table.display(), bytes = bytes.len(), "serving prebuilt table");
                return html_response(bytes);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %table.display(), error = %err, "prebuilt table unreadable");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("failed to read {}: {err}", table.display()),
                )
                    .into_response();
            }
        }
    }

    let glyphs = config.glyphs.clone();
    let rendered = tokio::task::spawn_blocking(move || {
        let rows = load_glyphs(&glyphs);
        debug!(rows = rows.len(), "rendering glyph table");
        render_table(&rows)
    })
    .await;
    match rendered {
        Ok(Ok(page)) => html_response(page.into_bytes()),
        Ok(Err(err)) => {
            warn!(error = %err, "glyph table template failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
        Err(err) => {
            warn!(error = %err, "table render task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn glyph_rows(State(config): State<SharedConfig>) -> Response {
    let glyphs = config.glyphs.clone();
    match tokio::task::spawn_blocking(move || load_glyphs(&glyphs)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => {
            warn!(error = %err, "glyph load task failed");
            Json(Vec::<crate::glyphs::GlyphRow>::new()).into_response()
        }
    }
}

fn html_response(body: Vec<u8>) -> Response {
    let length = body.len().to_string();
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HTML_CONTENT_TYPE.to_string()),
            (header::CONTENT_LENGTH, length),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{self, Body};
    use axum::http::Request;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn test_router(root: &Path, table: Option<PathBuf>) -> Router {
        build_router(Arc::new(ServeConfig {
            port: 0,
            root: root.to_path_buf(),
            glyphs: root.join("glyphnames.json"),
            table,
            open_browser: false,
        }))
    }

    async fn get_text(
        router: Router,
        uri: &str,
    ) -> (StatusCode, Option<String>, Option<String>, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let header_text = |name: header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string)
        };
        let content_type = header_text(header::CONTENT_TYPE);
        let content_length = header_text(header::CONTENT_LENGTH);
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (
            status,
            content_type,
            content_length,
            String::from_utf8(bytes.to_vec()).unwrap(),
        )
    }

    #[tokio::test]
    async fn index_renders_generated_table() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("glyphnames.json"),
            r#"{"noteheadBlack": {"codepoint": "U+E0A4", "description": "Black notehead"}}"#,
        )
        .unwrap();

        let (status, content_type, length, body) =
            get_text(test_router(dir.path(), None), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(HTML_CONTENT_TYPE));
        assert_eq!(length, Some(body.len().to_string()));
        assert!(body.contains("noteheadBlack"));
        assert!(body.contains("Total: 1"));
    }

    #[tokio::test]
    async fn index_html_alias_serves_empty_table_without_data() {
        let dir = tempdir().unwrap();
        let (status, _, _, body) = get_text(test_router(dir.path(), None), "/index.html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Total: 0"));
        assert!(body.contains("Showing: 0 / 0"));
    }

    #[tokio::test]
    async fn malformed_json_still_renders() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("glyphnames.json"), "not json").unwrap();
        let (status, _, _, body) = get_text(test_router(dir.path(), None), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Total: 0"));
    }

    #[tokio::test]
    async fn prebuilt_table_is_served_verbatim() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("bravura_character_table.html");
        fs::write(&table, "<html>prebuilt \u{E050}</html>").unwrap();
        fs::write(dir.path().join("glyphnames.json"), r#"["ignored"]"#).unwrap();

        let (status, content_type, length, body) =
            get_text(test_router(dir.path(), Some(table)), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(HTML_CONTENT_TYPE));
        assert_eq!(body, "<html>prebuilt \u{E050}</html>");
        assert_eq!(length, Some(body.len().to_string()));
    }

    #[tokio::test]
    async fn missing_prebuilt_table_falls_back_to_generated() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("bravura_character_table.html");
        let (status, _, _, body) = get_text(test_router(dir.path(), Some(table)), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Glyph Names (Bravura)"));
    }

    #[tokio::test]
    async fn other_paths_are_static_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "plain file").unwrap();

        let (status, _, _, body) = get_text(test_router(dir.path(), None), "/notes.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "plain file");

        let (status, _, _, _) = get_text(test_router(dir.path(), None), "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn glyph_rows_are_exposed_as_json() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("glyphnames.json"),
            r#"[{"name": "segno", "codepoint": "U+E047"}, "coda"]"#,
        )
        .unwrap();
        let (status, _, _, body) = get_text(test_router(dir.path(), None), "/glyphs.json").await;
        assert_eq!(status, StatusCode::OK);
        let rows: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(rows[0]["name"], "segno");
        assert_eq!(rows[1]["name"], "coda");
        assert_eq!(rows[1]["codepoint"], "");
    }

    #[tokio::test]
    async fn unreadable_prebuilt_table_is_a_server_error() {
        let dir = tempdir().unwrap();
        let table = dir.path().join("bravura_character_table.html");
        fs::create_dir(&table).unwrap();
        fs::write(dir.path().join("glyphnames.json"), r#"["ignored"]"#).unwrap();

        let (status, _, _, body) = get_text(test_router(dir.path(), Some(table)), "/").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with("failed to read"));
        assert!(!body.contains("ignored"));
    }
}
