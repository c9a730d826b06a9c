//! Request coordination between the scraping, service and UI sides.
//!
//! A single tokio task owns the state of the in-flight request. Everything
//! else talks to it through a [`CoordinatorHandle`]: commands go over an
//! `mpsc` channel, queries are answered on `oneshot` channels, and
//! notifications fan out to any number of listeners over `broadcast`.
//! Listeners may come and go at any time, so nothing they need is only ever
//! sent as a notification: every value can also be queried.
//!
//! Only one request is modelled. A second [`CoordinatorHandle::begin_request`]
//! before the first resolves overwrites the timing of the first.

use crate::classifier::DocumentType;
use crate::eta::Timing;
use crate::storage::{PersistedDocument, Storage, StorageError};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("coordinator is no longer running")]
    Closed,
    #[error("failed to persist request: {0}")]
    Storage(#[from] StorageError),
}

/// Lifecycle of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scraping,
    Pending,
    Completed,
    Failed,
}

/// Which view the popup should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Default,
    Loading,
    Dashboard,
    Error,
}

/// Status indicator, the equivalent of the extension badge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Inactive,
    Active,
    Done,
}

impl Indicator {
    pub fn label(&self) -> &'static str {
        match self {
            Indicator::Inactive => "OFF",
            Indicator::Active => "ON",
            Indicator::Done => "DONE",
        }
    }
}

/// Notifications broadcast to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Phase(Phase),
    DocumentLength(usize),
    StartTime(DateTime<Utc>),
    Presentation(Presentation),
    Indicator(Indicator),
}

/// Result handed back by the service side
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredResult {
    /// Absent when the service call failed
    pub summary: Option<String>,
    pub classification: Option<String>,
    pub doc_type: DocumentType,
    pub page_url: String,
}

/// Outcome of a delivered result
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Completed {
        summary: String,
    },
    /// Timing is captured before the reset, for the error view
    Failed {
        document_length: Option<usize>,
        elapsed_secs: Option<u64>,
    },
}

/// The most recent successful result
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResult {
    pub summary: String,
    pub classification: Option<String>,
    pub doc_type: DocumentType,
    pub page_url: String,
}

enum Command {
    BeginScrape,
    AbortScrape,
    BeginRequest {
        document_length: usize,
    },
    PersistRawText {
        document: PersistedDocument,
        reply: oneshot::Sender<Result<(), StorageError>>,
    },
    DeliverResult {
        result: DeliveredResult,
        reply: oneshot::Sender<RequestOutcome>,
    },
    FetchRawText {
        reply: oneshot::Sender<Result<Option<PersistedDocument>, StorageError>>,
    },
    FetchDocumentLength {
        reply: oneshot::Sender<Option<usize>>,
    },
    FetchStartTime {
        reply: oneshot::Sender<Option<DateTime<Utc>>>,
    },
    FetchResult {
        reply: oneshot::Sender<Option<StoredResult>>,
    },
    FetchPhase {
        reply: oneshot::Sender<Phase>,
    },
    SetPresentation(Presentation),
    SetIndicator(Indicator),
}

/// State of the single in-flight request. The raw text itself lives in
/// [`Storage`] so it survives a restart; everything here is session-scoped.
struct RequestState {
    phase: Phase,
    document_length: Option<usize>,
    start_time: Option<DateTime<Utc>>,
    result: Option<StoredResult>,
}

impl Default for RequestState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            document_length: None,
            start_time: None,
            result: None,
        }
    }
}

pub struct Coordinator {
    storage: Storage,
    state: RequestState,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<Event>,
    timing: watch::Sender<Option<Timing>>,
}

impl Coordinator {
    /// Start the coordinator task. It stops once every handle is dropped.
    pub fn spawn(storage: Storage) -> (CoordinatorHandle, JoinHandle<()>) {
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (timing, timing_rx) = watch::channel(None);

        let handle = CoordinatorHandle {
            commands: command_tx,
            events: events.clone(),
            timing: timing_rx,
        };
        let coordinator = Coordinator {
            storage,
            state: RequestState::default(),
            commands,
            events,
            timing,
        };

        (handle, tokio::spawn(coordinator.run()))
    }

    async fn run(mut self) {
        self.emit(Event::Indicator(Indicator::Inactive));
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("coordinator stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::BeginScrape => {
                self.set_phase(Phase::Scraping);
                self.emit(Event::Indicator(Indicator::Active));
            }
            Command::AbortScrape => {
                if self.state.phase == Phase::Scraping {
                    self.set_phase(Phase::Idle);
                }
                self.emit(Event::Indicator(Indicator::Inactive));
            }
            Command::BeginRequest { document_length } => self.begin_request(document_length),
            Command::PersistRawText { document, reply } => {
                let _ = reply.send(self.persist_raw_text(&document));
            }
            Command::DeliverResult { result, reply } => {
                let _ = reply.send(self.deliver_result(result));
            }
            Command::FetchRawText { reply } => {
                let _ = reply.send(self.storage.load_document());
            }
            Command::FetchDocumentLength { reply } => {
                let _ = reply.send(self.state.document_length);
            }
            Command::FetchStartTime { reply } => {
                let _ = reply.send(self.state.start_time);
            }
            Command::FetchResult { reply } => {
                let _ = reply.send(self.state.result.clone());
            }
            Command::FetchPhase { reply } => {
                let _ = reply.send(self.state.phase);
            }
            Command::SetPresentation(presentation) => {
                self.emit(Event::Presentation(presentation))
            }
            Command::SetIndicator(indicator) => self.emit(Event::Indicator(indicator)),
        }
    }

    fn begin_request(&mut self, document_length: usize) {
        if self.state.phase == Phase::Pending {
            warn!(
                previous = ?self.state.document_length,
                document_length,
                "request began while another was pending; replacing its timing"
            );
        }

        let start_time = Utc::now();
        self.state.document_length = Some(document_length);
        self.state.start_time = Some(start_time);
        self.timing.send_replace(Some(Timing {
            document_length,
            start_time,
        }));

        info!(document_length, "request pending");
        self.set_phase(Phase::Pending);
        self.emit(Event::Presentation(Presentation::Loading));
        self.emit(Event::DocumentLength(document_length));
        self.emit(Event::StartTime(start_time));
    }

    /// The dashboard is only announced once the write has landed.
    fn persist_raw_text(&mut self, document: &PersistedDocument) -> Result<(), StorageError> {
        if let Err(e) = self.storage.save_document(document) {
            error!(error = %e, "failed to persist raw text");
            return Err(e);
        }
        debug!(chars = document.raw_text.len(), url = %document.page_url, "raw text persisted");
        self.emit(Event::Presentation(Presentation::Default));
        self.emit(Event::Presentation(Presentation::Dashboard));
        Ok(())
    }

    fn deliver_result(&mut self, result: DeliveredResult) -> RequestOutcome {
        let outcome = match result.summary {
            None => {
                let elapsed_secs = self
                    .state
                    .start_time
                    .map(|start| (Utc::now() - start).num_seconds().max(0) as u64);
                warn!(url = %result.page_url, ?elapsed_secs, "request failed");
                // The previous request's summary must not outlive this one
                self.state.result = None;
                self.set_phase(Phase::Failed);
                self.emit(Event::Presentation(Presentation::Default));
                self.emit(Event::Presentation(Presentation::Error));
                RequestOutcome::Failed {
                    document_length: self.state.document_length,
                    elapsed_secs,
                }
            }
            Some(summary) => {
                info!(url = %result.page_url, "request completed");
                self.state.result = Some(StoredResult {
                    summary: summary.clone(),
                    classification: result.classification,
                    doc_type: result.doc_type,
                    page_url: result.page_url,
                });
                self.set_phase(Phase::Completed);
                self.emit(Event::Presentation(Presentation::Default));
                self.emit(Event::Presentation(Presentation::Dashboard));
                RequestOutcome::Completed { summary }
            }
        };

        // Cleared so a late reader cannot pick up this request's timing
        // while the next one is being set up.
        self.state.document_length = None;
        self.state.start_time = None;
        self.timing.send_replace(None);
        self.set_phase(Phase::Idle);

        outcome
    }

    fn set_phase(&mut self, phase: Phase) {
        self.state.phase = phase;
        self.emit(Event::Phase(phase));
    }

    fn emit(&self, event: Event) {
        // No listeners is fine; UI contexts come and go.
        let _ = self.events.send(event);
    }
}

/// Cheap, cloneable access to the coordinator task
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
    timing: watch::Receiver<Option<Timing>>,
}

impl CoordinatorHandle {
    /// Listen for notifications sent from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CoordinatorError::Closed)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| CoordinatorError::Closed)
    }

    pub async fn begin_scrape(&self) -> Result<(), CoordinatorError> {
        self.send(Command::BeginScrape).await
    }

    /// Return to Idle after a scrape that produced nothing to send
    pub async fn abort_scrape(&self) -> Result<(), CoordinatorError> {
        self.send(Command::AbortScrape).await
    }

    /// Record the start of a request for a payload of `document_length` characters
    pub async fn begin_request(&self, document_length: usize) -> Result<(), CoordinatorError> {
        self.send(Command::BeginRequest { document_length }).await
    }

    /// Durably store the request payload
    pub async fn persist_raw_text(
        &self,
        document: PersistedDocument,
    ) -> Result<(), CoordinatorError> {
        self.request(|reply| Command::PersistRawText { document, reply })
            .await?
            .map_err(CoordinatorError::from)
    }

    /// Hand over the service result and reset the request timing
    pub async fn deliver_result(
        &self,
        result: DeliveredResult,
    ) -> Result<RequestOutcome, CoordinatorError> {
        self.request(|reply| Command::DeliverResult { result, reply })
            .await
    }

    pub async fn fetch_raw_text(&self) -> Result<Option<PersistedDocument>, CoordinatorError> {
        self.request(|reply| Command::FetchRawText { reply })
            .await?
            .map_err(CoordinatorError::from)
    }

    pub async fn fetch_document_length(&self) -> Result<Option<usize>, CoordinatorError> {
        self.request(|reply| Command::FetchDocumentLength { reply })
            .await
    }

    pub async fn fetch_start_time(&self) -> Result<Option<DateTime<Utc>>, CoordinatorError> {
        self.request(|reply| Command::FetchStartTime { reply }).await
    }

    pub async fn fetch_result(&self) -> Result<Option<StoredResult>, CoordinatorError> {
        self.request(|reply| Command::FetchResult { reply }).await
    }

    pub async fn phase(&self) -> Result<Phase, CoordinatorError> {
        self.request(|reply| Command::FetchPhase { reply }).await
    }

    pub async fn set_presentation(
        &self,
        presentation: Presentation,
    ) -> Result<(), CoordinatorError> {
        self.send(Command::SetPresentation(presentation)).await
    }

    pub async fn set_indicator(&self, indicator: Indicator) -> Result<(), CoordinatorError> {
        self.send(Command::SetIndicator(indicator)).await
    }

    /// Timing of the pending request, if any, without waiting
    pub fn current_timing(&self) -> Option<Timing> {
        *self.timing.borrow()
    }

    /// Resolve once the coordinator has committed the timing of a request.
    ///
    /// Returns immediately when a request is already pending.
    pub async fn wait_for_timing(&self) -> Result<Timing, CoordinatorError> {
        let mut timing = self.timing.clone();
        let committed = timing
            .wait_for(Option::is_some)
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        (*committed).ok_or(CoordinatorError::Closed)
    }
}
