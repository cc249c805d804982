use serde::{Deserialize, Serialize};

use super::deserialize_lenient_string;

/// System whose signed documents are downloaded without a version segment.
const SIGNED_DOCUMENT_SYSTEM: &str = "EAZWIEN";

/// One mailbox document from the `dokumente/filter` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub system_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub dokumenten_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_string")]
    pub versions_id: Option<String>,
    #[serde(default)]
    pub datei_name: Option<String>,
    #[serde(default)]
    pub erstellungs_datum: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Local file name: `YYYY-MM-DD_<dateiName>.pdf`.
    ///
    /// Path separators and control characters in the bank-supplied name are
    /// replaced with `_`.
    pub fn file_name(&self) -> String {
        let date = self.erstellungs_datum.as_deref().unwrap_or_default();
        let date = date.get(..10).unwrap_or(date);
        let name = self
            .datei_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.dokumenten_id.as_deref())
            .unwrap_or("document");

        sanitize_file_name(&format!("{date}_{name}.pdf"))
    }

    /// Path segments after `dokumente/` that identify the download, or `None`
    /// when the document lacks a system or document id.
    pub fn download_segments(&self) -> Option<Vec<&str>> {
        let system_id = self.system_id.as_deref()?;
        let dokumenten_id = self.dokumenten_id.as_deref()?;

        let mut segments = vec![system_id, dokumenten_id];
        match self.versions_id.as_deref() {
            Some(version) if system_id != SIGNED_DOCUMENT_SYSTEM => segments.push(version),
            _ => {}
        }
        Some(segments)
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// The filter endpoint returns either a bare list or a wrapper object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DocumentList {
    List(Vec<Document>),
    Wrapped {
        #[serde(default, alias = "items", alias = "data")]
        dokumente: Vec<Document>,
    },
}

impl DocumentList {
    pub fn into_documents(self) -> Vec<Document> {
        match self {
            DocumentList::List(docs) => docs,
            DocumentList::Wrapped { dokumente } => dokumente,
        }
    }
}
