use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

pub const DOCUMENT_KIND: &str = "document";

/// An uploaded file as the conversation knows it. The data URI is fixed at
/// construction and only ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
    data: String,
}

impl DocumentRef {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self::with_timestamp(
            name,
            Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        )
    }

    pub fn with_timestamp(
        name: impl Into<String>,
        timestamp: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        DocumentRef {
            name: name.into(),
            kind: DOCUMENT_KIND.to_string(),
            timestamp: timestamp.into(),
            data: data.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .context("not a data URI")?;
    let (_, payload) = rest
        .split_once(";base64,")
        .context("data URI is not base64 encoded")?;
    STANDARD
        .decode(payload.trim())
        .context("invalid base64 in data URI")
}

/// Key-value storage for document bytes, keyed by file name. Written by the
/// upload flow, read by preview and download.
pub trait DocumentStore {
    fn put(&self, name: &str, data_uri: &str) -> Result<()>;
    fn get(&self, name: &str) -> Result<Option<String>>;
}

/// Process-lifetime document cache on an in-memory SQLite connection.
pub struct SqliteDocumentCache {
    conn: Connection,
}

impl SqliteDocumentCache {
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open document cache")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(SqliteDocumentCache { conn })
    }
}

impl DocumentStore for SqliteDocumentCache {
    fn put(&self, name: &str, data_uri: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        // Same name overwrites, last upload wins.
        self.conn.execute(
            "INSERT OR REPLACE INTO documents (name, data, stored_at) VALUES (?1, ?2, ?3)",
            params![name, data_uri, now],
        )?;
        tracing::debug!(name, bytes = data_uri.len(), "document cached");
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<String>> {
        let data = self
            .conn
            .query_row(
                "SELECT data FROM documents WHERE name = ?1",
                [name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(data)
    }
}

/// Pulls readable text out of a PDF for the preview panel. Whitespace-only
/// lines are collapsed and the result is cut at `max_chars`.
pub fn extract_preview_text(bytes: &[u8], max_chars: usize) -> Result<String> {
    let raw = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow::anyhow!("could not read PDF text: {}", e))?;

    let mut text = String::new();
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        text.push_str(line);
        text.push('\n');
    }

    let text = text.trim();
    if text.is_empty() {
        return Ok("(no extractable text in this document)".to_string());
    }
    Ok(truncate_chars(text, max_chars))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Writes a copy of a cached document into `dir` without clobbering an
/// existing file. Returns the path written.
pub fn save_copy(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let file_name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document.pdf".to_string());

    let target = unique_path(dir, &file_name);
    std::fs::write(&target, bytes)
        .with_context(|| format!("failed to write {}", target.display()))?;
    tracing::info!(path = %target.display(), "document saved");
    Ok(target)
}

fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1;
    loop {
        let name = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dir.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Shortens a file name to fit `max_width` terminal columns, keeping the
/// extension visible.
pub fn display_name(name: &str, max_width: usize) -> String {
    let width: usize = name.chars().map(|c| c.width().unwrap_or(0)).sum();
    if width <= max_width {
        return name.to_string();
    }

    let ext = Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let budget = max_width.saturating_sub(ext.chars().count() + 1);

    let mut out = String::new();
    let mut used = 0;
    for c in name.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    format!("{}…{}", out, ext)
}
