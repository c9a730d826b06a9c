//! End-to-end flows: scraped page in, coordinator-tracked service call out.

use crate::classifier::DocumentType;
use crate::coordinator::{
    CoordinatorError, CoordinatorHandle, DeliveredResult, Indicator, RequestOutcome,
};
use crate::config::ScraperConfig;
use crate::scraper::{self, ScrapedDocument, ScraperError};
use crate::service::{ServiceClient, ServiceError};
use crate::storage::PersistedDocument;
use crate::summary::SummaryResponse;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("no persisted raw text to analyse")]
    MissingPersistedState,
    #[error(transparent)]
    Scraper(#[from] ScraperError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Outcome of the analyse flow
#[derive(Debug)]
pub enum Analysis {
    Completed {
        document: PersistedDocument,
        response: SummaryResponse,
    },
    Failed {
        document_length: Option<usize>,
        elapsed_secs: Option<u64>,
        cause: ServiceError,
    },
}

/// Drives a single request through the coordinator
pub struct Workflow {
    coordinator: CoordinatorHandle,
    service: ServiceClient,
    max_chars: usize,
}

impl Workflow {
    pub fn new(coordinator: CoordinatorHandle, service: ServiceClient, max_chars: usize) -> Self {
        Self {
            coordinator,
            service,
            max_chars,
        }
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    /// Scrape a URL or local file with the coordinator in the Scraping phase
    pub async fn scrape(
        &self,
        target: &str,
        config: &ScraperConfig,
    ) -> Result<ScrapedDocument, WorkflowError> {
        self.coordinator.begin_scrape().await?;

        match scraper::load_target(target, config).await {
            Ok(document) => {
                info!(url = %document.url, chars = document.text.len(), "page scraped");
                Ok(document)
            }
            Err(e) => {
                warn!(page = target, error = %e, "scrape failed");
                self.coordinator.abort_scrape().await?;
                Err(e.into())
            }
        }
    }

    /// Register the payload with the coordinator and persist it
    async fn begin(
        &self,
        document: &ScrapedDocument,
        doc_type: DocumentType,
    ) -> Result<PersistedDocument, WorkflowError> {
        let payload = scraper::truncate_payload(&document.text, self.max_chars);
        let document_length = payload.chars().count();
        if document_length < document.text.chars().count() {
            info!(document_length, "payload truncated");
        }

        self.coordinator.begin_request(document_length).await?;
        self.coordinator
            .persist_raw_text(PersistedDocument {
                raw_text: payload,
                doc_type,
                page_url: document.url.clone(),
            })
            .await?;

        // Read back through the coordinator, as a freshly opened view would
        self.coordinator.fetch_raw_text().await?.ok_or_else(|| {
            error!("raw text missing after persist");
            WorkflowError::MissingPersistedState
        })
    }

    /// Summarise a page with `POST /summarise`
    pub async fn summarise(
        &self,
        document: &ScrapedDocument,
        doc_type: DocumentType,
    ) -> Result<RequestOutcome, WorkflowError> {
        let persisted = self.begin(document, doc_type).await?;

        let (summary, classification) = match self
            .service
            .summarise(&persisted.raw_text, persisted.doc_type)
            .await
        {
            Ok(response) => (response.summary, response.classification),
            Err(e) => {
                warn!(error = %e, "summarisation failed");
                (None, None)
            }
        };

        let outcome = self
            .coordinator
            .deliver_result(DeliveredResult {
                summary,
                classification,
                doc_type: persisted.doc_type,
                page_url: persisted.page_url,
            })
            .await?;
        self.coordinator.set_indicator(Indicator::Done).await?;
        Ok(outcome)
    }

    /// Analyse a page with `POST /analyze`
    pub async fn analyze(
        &self,
        document: &ScrapedDocument,
        doc_type: DocumentType,
    ) -> Result<Analysis, WorkflowError> {
        self.begin(document, doc_type).await?;
        self.analyze_persisted().await
    }

    /// Analyse whatever raw text is currently persisted
    pub async fn analyze_persisted(&self) -> Result<Analysis, WorkflowError> {
        let Some(document) = self.coordinator.fetch_raw_text().await? else {
            error!("no raw text found in storage");
            return Err(WorkflowError::MissingPersistedState);
        };

        let result = self.service.analyze(&document.raw_text).await;
        let summary = result.as_ref().ok().map(|response| response.summary.clone());
        let outcome = self
            .coordinator
            .deliver_result(DeliveredResult {
                summary,
                classification: None,
                doc_type: document.doc_type,
                page_url: document.page_url.clone(),
            })
            .await?;
        self.coordinator.set_indicator(Indicator::Done).await?;

        match (result, outcome) {
            (Ok(response), _) => Ok(Analysis::Completed { document, response }),
            (
                Err(cause),
                RequestOutcome::Failed {
                    document_length,
                    elapsed_secs,
                },
            ) => Ok(Analysis::Failed {
                document_length,
                elapsed_secs,
                cause,
            }),
            (Err(cause), RequestOutcome::Completed { .. }) => Err(cause.into()),
        }
    }
}
