//! Service configuration and the root-note template map.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::types::is_plain_file_name;
use crate::{Error, Result};

/// Default listen port, on all interfaces.
pub const DEFAULT_PORT: u16 = 8000;

/// Default request body limit (256 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Templates shipped with a stock deployment.
const DEFAULT_TEMPLATES: &[(&str, &str)] = &[
    ("C0", "Snare_C0.nki"),
    ("C1", "Snare_C1.nki"),
    ("C2", "Snare_C2.nki"),
    ("C3", "Snare_C3.nki"),
    ("C4", "Snare_C4.nki"),
    ("D4", "Snare_D4.nki"),
];

/// Immutable mapping from root note label to template filename.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TemplateMap(BTreeMap<String, String>);

impl Default for TemplateMap {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATES.iter().copied())
    }
}

impl TemplateMap {
    /// Build a map from `(root_note, template_filename)` pairs.
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Template filename for `root_note`, if mapped.
    pub fn template_for(&self, root_note: &str) -> Option<&str> {
        self.0.get(root_note).map(String::as_str)
    }

    /// Supported root notes in sorted order.
    pub fn root_notes(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that every key is a note label and every value a plain filename.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::Config("root_notes must not be empty".into()));
        }
        for (note, template) in &self.0 {
            if !is_note_label(note) {
                return Err(Error::Config(format!("invalid root note label: {note:?}")));
            }
            if !is_plain_file_name(template) {
                return Err(Error::Config(format!(
                    "template for {note} must be a plain filename, got {template:?}"
                )));
            }
        }
        Ok(())
    }
}

/// Whether `label` looks like a note name: `A`-`G`, optional `#` or `b`,
/// then an octave number which may be negative.
///
/// ```
/// use nki_generator::config::is_note_label;
/// assert!(is_note_label("C1"));
/// assert!(is_note_label("F#-1"));
/// assert!(!is_note_label("H2"));
/// ```
pub fn is_note_label(label: &str) -> bool {
    let mut chars = label.chars().peekable();
    if !matches!(chars.next(), Some('A'..='G')) {
        return false;
    }
    if matches!(chars.peek(), Some('#' | 'b')) {
        chars.next();
    }
    if chars.peek() == Some(&'-') {
        chars.next();
    }
    let octave: String = chars.collect();
    (1..=2).contains(&octave.len()) && octave.chars().all(|c| c.is_ascii_digit())
}

/// Service configuration, loaded from an optional TOML file.
///
/// Every field has a default; a `[root_notes]` table replaces the built-in
/// template map as a whole.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Socket address the HTTP server binds to.
    pub bind: SocketAddr,
    /// Per-job directories and finished archives live here.
    pub work_dir: PathBuf,
    /// Read-only template store.
    pub template_dir: PathBuf,
    /// Optional front-end assets (`index.html`).
    pub static_dir: PathBuf,
    /// Maximum accepted request body in bytes.
    pub max_upload_bytes: usize,
    pub root_notes: TemplateMap,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            work_dir: PathBuf::from("workdir"),
            template_dir: PathBuf::from("nki_templates"),
            static_dir: PathBuf::from("static"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            root_notes: TemplateMap::default(),
        }
    }
}

impl ServiceConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            root_notes = config.root_notes.len(),
            "Loaded config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".into()));
        }
        self.root_notes.validate()
    }

    /// Create the work, template and static directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.work_dir, &self.template_dir, &self.static_dir] {
            std::fs::create_dir_all(dir)?;
            debug!(dir = %dir.display(), "Directory ready");
        }
        Ok(())
    }
}
