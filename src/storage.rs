//! Sled-based storage.
//!
//! Two trees live in one database: `settings`, a small key-value namespace
//! holding the persisted request, and `analyses`, the history of completed
//! analyses keyed by their URL.

use crate::classifier::DocumentType;
use crate::summary::SummaryResponse;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    DbError(#[from] sled::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Keys of the `settings` tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKey {
    RawText,
    DocType,
    PageUrl,
    SiteName,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::RawText => "rawText",
            StoreKey::DocType => "docType",
            StoreKey::PageUrl => "pageURL",
            StoreKey::SiteName => "siteName",
        }
    }
}

/// The raw text of the most recent request, as persisted for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub raw_text: String,
    pub doc_type: DocumentType,
    pub page_url: String,
}

/// A completed analysis with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// The source URL
    pub url: String,
    /// Display name derived from the URL
    pub site_name: String,
    pub doc_type: DocumentType,
    /// When the analysis was stored
    pub created_at: DateTime<Utc>,
    pub response: SummaryResponse,
}

impl AnalysisRecord {
    pub fn new(url: String, doc_type: DocumentType, response: SummaryResponse) -> Self {
        Self {
            site_name: crate::dashboard::site_name(&url),
            url,
            doc_type,
            created_at: Utc::now(),
            response,
        }
    }
}

/// Sled-backed store shared by the coordinator and the CLI.
#[derive(Clone)]
pub struct Storage {
    settings: sled::Tree,
    analyses: sled::Tree,
}

impl Storage {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory storage that is discarded on drop
    pub fn temporary() -> Result<Self, StorageError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            settings: db.open_tree("settings")?,
            analyses: db.open_tree("analyses")?,
        })
    }

    pub fn set<T: Serialize + ?Sized>(&self, key: StoreKey, value: &T) -> Result<(), StorageError> {
        self.settings
            .insert(key.as_str(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: StoreKey) -> Result<Option<T>, StorageError> {
        match self.settings.get(key.as_str())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Persist the request payload and flush it to disk.
    ///
    /// All four keys land in one batch, so a reader never sees new text
    /// next to an old URL or document type.
    pub fn save_document(&self, document: &PersistedDocument) -> Result<(), StorageError> {
        let site_name = crate::dashboard::site_name(&document.page_url);
        let mut batch = sled::Batch::default();
        batch.insert(
            StoreKey::RawText.as_str(),
            serde_json::to_vec(&document.raw_text)?,
        );
        batch.insert(
            StoreKey::DocType.as_str(),
            serde_json::to_vec(&document.doc_type)?,
        );
        batch.insert(
            StoreKey::PageUrl.as_str(),
            serde_json::to_vec(&document.page_url)?,
        );
        batch.insert(StoreKey::SiteName.as_str(), serde_json::to_vec(&site_name)?);

        self.settings.apply_batch(batch)?;
        self.settings.flush()?;
        Ok(())
    }

    /// The persisted request payload, if all of its parts are present
    pub fn load_document(&self) -> Result<Option<PersistedDocument>, StorageError> {
        let raw_text = self.get::<String>(StoreKey::RawText)?;
        let doc_type = self.get::<DocumentType>(StoreKey::DocType)?;
        let page_url = self.get::<String>(StoreKey::PageUrl)?;

        Ok(match (raw_text, doc_type, page_url) {
            (Some(raw_text), Some(doc_type), Some(page_url)) => Some(PersistedDocument {
                raw_text,
                doc_type,
                page_url,
            }),
            _ => None,
        })
    }

    /// Store an analysis, replacing any earlier one for the same URL
    pub fn store_analysis(&self, record: &AnalysisRecord) -> Result<(), StorageError> {
        self.analyses
            .insert(record.url.as_bytes(), serde_json::to_vec(record)?)?;
        self.analyses.flush()?;
        Ok(())
    }

    /// Retrieve an analysis by URL
    pub fn get_analysis(&self, url: &str) -> Result<Option<AnalysisRecord>, StorageError> {
        match self.analyses.get(url.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// All stored analyses, newest first
    pub fn list_analyses(&self) -> Result<Vec<AnalysisRecord>, StorageError> {
        let mut results = Vec::new();
        for item in self.analyses.iter() {
            let (_key, value) = item?;
            results.push(serde_json::from_slice::<AnalysisRecord>(&value)?);
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    /// Delete an analysis by URL
    pub fn delete_analysis(&self, url: &str) -> Result<bool, StorageError> {
        let existed = self.analyses.remove(url.as_bytes())?.is_some();
        self.analyses.flush()?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::Aggregations;

    fn response(summary: &str) -> SummaryResponse {
        SummaryResponse {
            summary: summary.to_string(),
            aggregations: Aggregations::default(),
            violations: Vec::new(),
        }
    }

    #[test]
    fn document_round_trips_and_derives_site_name() {
        let storage = Storage::temporary().unwrap();
        assert!(storage.load_document().unwrap().is_none());

        let document = PersistedDocument {
            raw_text: "We may share your data.".to_string(),
            doc_type: DocumentType::PrivacyPolicy,
            page_url: "https://www.example.com/privacy".to_string(),
        };
        storage.save_document(&document).unwrap();

        assert_eq!(storage.load_document().unwrap(), Some(document));
        assert_eq!(
            storage.get::<String>(StoreKey::SiteName).unwrap().as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn saving_again_replaces_every_field() {
        let storage = Storage::temporary().unwrap();
        storage
            .save_document(&PersistedDocument {
                raw_text: "Old privacy text.".to_string(),
                doc_type: DocumentType::PrivacyPolicy,
                page_url: "https://a.example/privacy".to_string(),
            })
            .unwrap();

        let replacement = PersistedDocument {
            raw_text: "New terms text.".to_string(),
            doc_type: DocumentType::TermsAndConditions,
            page_url: "https://www.b.example/terms".to_string(),
        };
        storage.save_document(&replacement).unwrap();

        assert_eq!(storage.load_document().unwrap(), Some(replacement));
        assert_eq!(
            storage.get::<String>(StoreKey::SiteName).unwrap().as_deref(),
            Some("b.example")
        );
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.set(StoreKey::RawText, "persisted").unwrap();
            storage.settings.flush().unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(
            storage.get::<String>(StoreKey::RawText).unwrap().as_deref(),
            Some("persisted")
        );
    }

    #[test]
    fn analyses_replace_per_url() {
        let storage = Storage::temporary().unwrap();
        let url = "https://example.com/terms";

        storage
            .store_analysis(&AnalysisRecord::new(
                url.to_string(),
                DocumentType::TermsAndConditions,
                response("first"),
            ))
            .unwrap();
        storage
            .store_analysis(&AnalysisRecord::new(
                url.to_string(),
                DocumentType::TermsAndConditions,
                response("second"),
            ))
            .unwrap();

        let all = storage.list_analyses().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].response.summary, "second");
        assert_eq!(
            storage.get_analysis(url).unwrap().unwrap().site_name,
            "example.com"
        );

        // keyed by the URL bytes
        assert!(storage.analyses.contains_key(url.as_bytes()).unwrap());

        assert!(storage.delete_analysis(url).unwrap());
        assert!(!storage.delete_analysis(url).unwrap());
        assert!(storage.get_analysis(url).unwrap().is_none());
    }
}
