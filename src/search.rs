//! Tantivy-based full-text search over stored analyses.

use crate::storage::AnalysisRecord;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, TantivyDocument};
use thiserror::Error;

const WRITER_HEAP_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index error: {0}")]
    IndexError(#[from] tantivy::TantivyError),
    #[error("query parse error: {0}")]
    QueryError(#[from] tantivy::query::QueryParserError),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

struct Fields {
    url: Field,
    site: Field,
    summary: Field,
    violations: Field,
    sources: Field,
}

/// Tantivy-based search index for analyses.
pub struct SearchIndex {
    index: Index,
    fields: Fields,
}

impl SearchIndex {
    fn schema() -> (Schema, Fields) {
        let mut schema_builder = Schema::builder();
        let fields = Fields {
            url: schema_builder.add_text_field("url", STRING | STORED),
            site: schema_builder.add_text_field("site", TEXT),
            summary: schema_builder.add_text_field("summary", TEXT),
            violations: schema_builder.add_text_field("violations", TEXT),
            sources: schema_builder.add_text_field("sources", TEXT),
        };
        (schema_builder.build(), fields)
    }

    /// Open or create a search index at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SearchError> {
        let (schema, fields) = Self::schema();

        let index_path = path.as_ref();
        std::fs::create_dir_all(index_path)?;

        let index = Index::create_in_dir(index_path, schema)
            .or_else(|_| Index::open_in_dir(index_path))?;

        Ok(Self { index, fields })
    }

    /// Index an analysis, replacing any earlier entry for its URL
    pub fn index_analysis(&self, record: &AnalysisRecord) -> Result<(), SearchError> {
        let mut index_writer: IndexWriter = self.index.writer(WRITER_HEAP_BYTES)?;
        let fields = &self.fields;

        let url_term = tantivy::Term::from_field_text(fields.url, &record.url);
        index_writer.delete_term(url_term);

        let violations = &record.response.violations;
        index_writer.add_document(doc!(
            fields.url => record.url.clone(),
            fields.site => record.site_name.clone(),
            fields.summary => record.response.summary.clone(),
            fields.violations => violations
                .iter()
                .map(|v| format!("{} {}", v.violating_rule, v.actual_rule))
                .collect::<Vec<_>>()
                .join(" "),
            fields.sources => violations
                .iter()
                .map(|v| v.source.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        ))?;

        index_writer.commit()?;
        Ok(())
    }

    /// URLs of analyses matching the query, best first
    pub fn search(&self, query_str: &str, limit: usize) -> Result<Vec<String>, SearchError> {
        let reader = self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;
        let searcher = reader.searcher();
        let fields = &self.fields;

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![fields.site, fields.summary, fields.violations, fields.sources],
        );
        let query = query_parser.parse_query(query_str)?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut results = Vec::new();
        for (_score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(doc_address)?;
            if let Some(url) = retrieved.get_first(fields.url).and_then(|v| v.as_str()) {
                results.push(url.to_string());
            }
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::DocumentType;
    use crate::summary::{Aggregations, Severity, SummaryResponse, Violation};

    fn record(url: &str, summary: &str, source: &str) -> AnalysisRecord {
        AnalysisRecord::new(
            url.to_string(),
            DocumentType::PrivacyPolicy,
            SummaryResponse {
                summary: summary.to_string(),
                aggregations: Aggregations::default(),
                violations: vec![Violation {
                    violating_rule: "Data kept indefinitely".to_string(),
                    actual_rule: "Storage limitation".to_string(),
                    source: source.to_string(),
                    severity: Severity::Medium,
                }],
            },
        )
    }

    #[test]
    fn finds_analyses_by_summary_and_source() {
        let dir = tempfile::tempdir().unwrap();
        let index = SearchIndex::open(dir.path()).unwrap();

        index
            .index_analysis(&record("https://a.example/privacy", "advertising partners", "GDPR"))
            .unwrap();
        index
            .index_analysis(&record("https://b.example/privacy", "location tracking", "CCPA"))
            .unwrap();

        assert_eq!(
            index.search("tracking", 10).unwrap(),
            vec!["https://b.example/privacy".to_string()]
        );
        assert_eq!(
            index.search("gdpr", 10).unwrap(),
            vec!["https://a.example/privacy".to_string()]
        );
        assert!(index.search("nonexistentword", 10).unwrap().is_empty());
    }

    #[test]
    fn reindexing_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index = SearchIndex::open(dir.path()).unwrap();
        let url = "https://a.example/terms";

        index.index_analysis(&record(url, "arbitration clause", "GDPR")).unwrap();
        index.index_analysis(&record(url, "refund policy", "GDPR")).unwrap();

        assert!(index.search("arbitration", 10).unwrap().is_empty());
        assert_eq!(index.search("refund", 10).unwrap(), vec![url.to_string()]);
    }

    #[test]
    fn reopening_keeps_documents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = SearchIndex::open(dir.path()).unwrap();
            index
                .index_analysis(&record("https://c.example/", "cookies", "ePrivacy"))
                .unwrap();
        }
        let index = SearchIndex::open(dir.path()).unwrap();
        assert_eq!(index.search("cookies", 10).unwrap().len(), 1);
    }
}
