//! Wizard step machine: walks the configured module sequence one question at
//! a time, timing each module, collecting answers, and persisting each answer
//! as soon as it is given.
//!
//! Positions only move forward. The last answer of the last module moves the
//! wizard to [`Position::Complete`] and triggers finalization: the persistence
//! queue is flushed, the session recording is stopped and uploaded, the row is
//! marked complete, and the media lease is released. If finalization fails the
//! wizard stays complete-but-unfinished and [`Wizard::finish`] may be retried.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::answers::AnswerAggregator;
use crate::catalog::{ModuleKind, QuestionColumns};
use crate::clock::Clock;
use crate::config::{BloomConfig, PersistenceConfig};
use crate::error::ValidationError;
use crate::issuer::{IssueError, SessionIssuer};
use crate::media::{MediaCapture, MediaError, MediaKind, MediaLease, Recording};
use crate::models::{Answer, SessionId, SubjectProfile};
use crate::patch::FieldPatch;
use crate::persist::{PersistError, PersistenceClient, PushOutcome};
use crate::storage::{ObjectStore, StorageError, VIDEO_FOLDER};
use crate::store::SessionStore;
use crate::timer::{floor_seconds, round_seconds, TimerLedger};

#[derive(Error, Debug)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error("answer not persisted: {0}")]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("upload failed: {0}")]
    Storage(#[from] StorageError),

    #[error("assessment already completed")]
    Completed,

    #[error("assessment has questions left")]
    NotFinished,

    #[error("no modules configured")]
    NoModules,

    #[error("module {0} appears more than once")]
    DuplicateModule(ModuleKind),

    #[error("{module} question {question} does not take media")]
    NotMediaQuestion { module: ModuleKind, question: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Position {
    /// Zero-based question index within `module`.
    Question { module: ModuleKind, question: usize },
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    NextQuestion { module: ModuleKind, question: usize },
    NextModule { from: ModuleKind, to: ModuleKind },
    Completed(Box<Submission>),
}

/// Final aggregate handed back when the last module is done.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    pub session_id: SessionId,
    /// Module key -> whole seconds spent in it.
    pub timers: BTreeMap<String, i64>,
    /// Module key -> question key -> recorded answer.
    pub answers: BTreeMap<String, BTreeMap<String, Value>>,
    pub total_duration_seconds: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub video_link: Option<String>,
}

/// State left behind by [`Wizard::abandon`].
#[derive(Debug, Clone, PartialEq)]
pub struct Abandoned {
    pub session_id: SessionId,
    pub position: Position,
    pub timers: BTreeMap<String, i64>,
    /// Queued patches that were never delivered.
    pub undelivered: usize,
}

#[derive(Debug, Clone)]
pub struct WizardOptions {
    pub modules: Vec<ModuleKind>,
    pub persistence: PersistenceConfig,
    pub clock: Clock,
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self {
            modules: ModuleKind::DEFAULT_SEQUENCE.to_vec(),
            persistence: PersistenceConfig::default(),
            clock: Clock::System,
        }
    }
}

impl WizardOptions {
    pub fn from_config(config: &BloomConfig) -> Self {
        Self {
            modules: config.wizard.modules.clone(),
            persistence: config.persistence.clone(),
            clock: Clock::System,
        }
    }

    fn validate(&self) -> Result<(), WizardError> {
        if self.modules.is_empty() {
            return Err(WizardError::NoModules);
        }
        let mut seen = HashSet::new();
        for module in &self.modules {
            if !seen.insert(*module) {
                return Err(WizardError::DuplicateModule(*module));
            }
        }
        Ok(())
    }
}

pub struct Wizard {
    session: SessionId,
    clock: Clock,
    modules: Vec<ModuleKind>,
    module_index: usize,
    position: Position,
    timers: TimerLedger,
    answers: AnswerAggregator,
    persistence: PersistenceClient,
    objects: Arc<dyn ObjectStore>,
    lease: Option<MediaLease>,
    recording: Option<Recording>,
    video_link: Option<String>,
    started_at: DateTime<Utc>,
    question_started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    finished: bool,
}

impl Wizard {
    /// Starts a wizard for an already issued session, entering the first
    /// module's first question.
    pub fn new(
        session: SessionId,
        store: Arc<dyn SessionStore>,
        objects: Arc<dyn ObjectStore>,
        lease: Option<MediaLease>,
        options: WizardOptions,
    ) -> Result<Self, WizardError> {
        options.validate()?;
        let first = options.modules[0];
        let now = options.clock.now();

        let mut timers = TimerLedger::new();
        timers.start(first.key(), now);
        tracing::info!(session_id = %session, module = %first, "Assessment started");

        Ok(Self {
            session,
            clock: options.clock,
            modules: options.modules,
            module_index: 0,
            position: Position::Question {
                module: first,
                question: 0,
            },
            timers,
            answers: AnswerAggregator::new(),
            persistence: PersistenceClient::new(store, session, options.persistence),
            objects,
            lease,
            recording: None,
            video_link: None,
            started_at: now,
            question_started_at: now,
            completed_at: None,
            finished: false,
        })
    }

    /// Acquires media (when a capture backend is given), issues the session
    /// id, then starts the wizard. A denied permission stops here, before any
    /// session row exists.
    pub async fn launch(
        issuer: &mut SessionIssuer,
        subject: &SubjectProfile,
        capture: Option<Arc<dyn MediaCapture>>,
        objects: Arc<dyn ObjectStore>,
        options: WizardOptions,
    ) -> Result<Self, WizardError> {
        options.validate()?;
        let lease = match capture {
            Some(capture) => {
                Some(MediaLease::acquire(capture, &[MediaKind::Audio, MediaKind::Video]).await?)
            }
            None => None,
        };
        let session = issuer.issue(subject).await?;
        Self::new(session, issuer.store(), objects, lease, options)
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn modules(&self) -> &[ModuleKind] {
        &self.modules
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn answers(&self) -> &AnswerAggregator {
        &self.answers
    }

    pub fn timers(&self) -> &TimerLedger {
        &self.timers
    }

    /// Patches waiting in the persistence queue.
    pub fn pending_writes(&self) -> usize {
        self.persistence.pending()
    }

    pub fn media(&self) -> Option<&MediaLease> {
        self.lease.as_ref()
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    fn current(&self) -> Result<(ModuleKind, usize), WizardError> {
        match self.position {
            Position::Question { module, question } => Ok((module, question)),
            Position::Complete => Err(WizardError::Completed),
        }
    }

    /// Records and persists the answer to the current question, then moves
    /// forward. Empty answers are rejected without any state change; under
    /// the hard-fail policy a persistence failure leaves the position as is.
    pub async fn submit_answer(&mut self, answer: Answer) -> Result<StepOutcome, WizardError> {
        let (module, question) = self.current()?;
        if answer.is_empty() {
            return Err(ValidationError::EmptyAnswer.into());
        }

        let now = self.clock.now();
        let elapsed = floor_seconds(now - self.question_started_at);
        let patch = FieldPatch::for_answer(module, question, &answer, elapsed)?;

        self.answers.record(
            module.key(),
            &format!("q{}", question + 1),
            json!({
                "answer": answer.value,
                "correct": answer.correct,
                "elapsed_seconds": elapsed,
                "timestamp": now.to_rfc3339(),
            }),
        );

        match self.persistence.push(patch).await? {
            PushOutcome::Queued { pending } => {
                tracing::warn!(session_id = %self.session, %module, question, pending, "Answer queued");
            }
            PushOutcome::Applied | PushOutcome::Skipped => {
                tracing::debug!(session_id = %self.session, %module, question, elapsed, "Answer saved");
            }
        }
        self.question_started_at = now;

        if question + 1 < module.question_count() {
            self.position = Position::Question {
                module,
                question: question + 1,
            };
            return Ok(StepOutcome::NextQuestion {
                module,
                question: question + 1,
            });
        }

        self.timers.end(module.key(), now);
        tracing::info!(
            session_id = %self.session,
            %module,
            seconds = self.timers.total_seconds(module.key()),
            "Module finished"
        );

        match self.modules.get(self.module_index + 1).copied() {
            Some(next) => {
                self.module_index += 1;
                self.timers.start(next.key(), now);
                self.position = Position::Question {
                    module: next,
                    question: 0,
                };
                Ok(StepOutcome::NextModule {
                    from: module,
                    to: next,
                })
            }
            None => {
                self.position = Position::Complete;
                self.completed_at = Some(now);
                let submission = self.finish().await?;
                Ok(StepOutcome::Completed(Box::new(submission)))
            }
        }
    }

    /// Uploads a captured artifact for the current media question (reading
    /// audio, writing image) and submits its URL as the answer.
    pub async fn submit_media(
        &mut self,
        bytes: Bytes,
        extension: &str,
        correct: Option<bool>,
    ) -> Result<StepOutcome, WizardError> {
        let (module, question) = self.current()?;
        if !matches!(
            module.question_columns(question),
            Some(QuestionColumns::Media { .. })
        ) {
            return Err(WizardError::NotMediaQuestion { module, question });
        }
        if bytes.is_empty() {
            return Err(ValidationError::EmptyAnswer.into());
        }

        let url = self
            .objects
            .upload(bytes, module.media_folder(), extension)
            .await?;
        let answer = Answer {
            value: Value::String(url),
            correct,
        };
        self.submit_answer(answer).await
    }

    /// Finalizes a completed assessment. Runs automatically after the last
    /// answer; call again only to retry a failed finalization.
    pub async fn finish(&mut self) -> Result<Submission, WizardError> {
        if self.finished {
            return Err(WizardError::Completed);
        }
        let completed_at = match (self.position, self.completed_at) {
            (Position::Complete, Some(at)) => at,
            _ => return Err(WizardError::NotFinished),
        };

        if self.video_link.is_none() {
            if self.recording.is_none() {
                if let Some(lease) = &self.lease {
                    match lease.stop().await {
                        Ok(recording) => self.recording = recording,
                        Err(e) => {
                            tracing::warn!(session_id = %self.session, error = %e, "Recording lost")
                        }
                    }
                }
            }
            if let Some(recording) = &self.recording {
                let url = self
                    .objects
                    .upload(recording.bytes.clone(), VIDEO_FOLDER, &recording.extension)
                    .await?;
                self.video_link = Some(url);
                self.recording = None;
            }
        }

        let mut media = FieldPatch::new();
        if let Some(url) = &self.video_link {
            media.set("video_link", url.clone());
        }
        self.persistence.finalize(&media).await?;

        self.lease = None;
        self.finished = true;

        let submission = Submission {
            session_id: self.session,
            timers: self.timers.totals_seconds(),
            answers: self.answers.snapshot(),
            total_duration_seconds: round_seconds(completed_at - self.started_at),
            started_at: self.started_at,
            completed_at,
            video_link: self.video_link.clone(),
        };
        tracing::info!(
            session_id = %self.session,
            seconds = submission.total_duration_seconds,
            video = submission.video_link.is_some(),
            "Assessment completed"
        );
        Ok(submission)
    }

    /// Stops the assessment where it stands. The current module's timer is
    /// closed and the media lease is released when the wizard drops.
    pub fn abandon(mut self) -> Abandoned {
        if let Position::Question { module, .. } = self.position {
            let now = self.clock.now();
            self.timers.end(module.key(), now);
        }
        let undelivered = self.persistence.pending();
        if undelivered > 0 {
            tracing::warn!(session_id = %self.session, undelivered, "Abandoned with queued answers");
        }
        tracing::info!(session_id = %self.session, position = ?self.position, "Assessment abandoned");
        Abandoned {
            session_id: self.session,
            position: self.position,
            timers: self.timers.totals_seconds(),
            undelivered,
        }
    }
}
