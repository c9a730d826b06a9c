//! # PolicyPal
//!
//! Classify, summarise and score privacy policies and terms of service.
//!
//! ## Features
//!
//! - **Page scraping**: direct-text extraction that skips navigation and boilerplate
//! - **Document classification**: URL-path and phrase heuristics, no NLP required
//! - **Request coordination**: one actor owns the in-flight request and relays it to any listener
//! - **Dashboard**: risk score, severity and source breakdowns drawn with ratatui
//! - **History**: sled for stored analyses, tantivy for full-text search

pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod dashboard;
pub mod eta;
pub mod scraper;
pub mod search;
pub mod service;
pub mod storage;
pub mod summary;
pub mod ui;
pub mod workflow;

pub use classifier::{Classification, DocumentType};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorHandle};
pub use scraper::ScrapedDocument;
pub use search::SearchIndex;
pub use storage::Storage;
pub use summary::SummaryResponse;
