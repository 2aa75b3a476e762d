use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// One message as produced by the mail exporter.
///
/// Only `id`, `date`, `snippet`/`body` and `isRead` matter to extraction;
/// everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub id: String,
    pub date: String,
    pub subject: String,
    pub from: String,
    pub snippet: String,
    pub body: Option<String>,
    pub is_read: bool,
    #[serde(alias = "label_names")]
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RawMessage {
    /// Free text used for pattern matching: the snippet, or the body when the snippet is empty.
    pub fn text(&self) -> &str {
        if !self.snippet.trim().is_empty() {
            return &self.snippet;
        }
        self.body.as_deref().unwrap_or("")
    }
}

/// The exporter's JSON document: `{ exportDate, totalEmails, query, emails: [...] }`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailExport {
    #[serde(default)]
    pub export_date: Option<String>,
    #[serde(default)]
    pub total_emails: Option<usize>,
    #[serde(default)]
    pub query: Option<String>,
    pub emails: Vec<RawMessage>,
}

impl MailExport {
    /// Parse an export from raw bytes (e.g. an uploaded request body).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            bail!("export document is empty");
        }
        serde_json::from_slice(bytes).context("parse mail export JSON")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_slice(&bytes).with_context(|| format!("loading {}", path.display()))
    }

    /// Period descriptor for summary metadata.
    pub fn period(&self) -> Option<&str> {
        self.export_date.as_deref()
    }
}
