pub mod answers;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod gates;
pub mod issuer;
pub mod media;
pub mod models;
pub mod patch;
pub mod persist;
pub mod storage;
pub mod store;
pub mod timer;
pub mod wizard;

pub use answers::AnswerAggregator;
pub use catalog::ModuleKind;
pub use clock::Clock;
pub use config::{BloomConfig, PersistPolicy};
pub use error::{BloomError, ValidationError};
pub use gates::{SelectionGate, TotalGate};
pub use issuer::{IssueError, SessionIssuer};
pub use media::{MediaCapture, MediaError, MediaKind, MediaLease, Recording};
pub use models::{Answer, SessionId, SessionRecord, SessionSummary, SubjectProfile};
pub use patch::FieldPatch;
pub use persist::{PersistError, PersistenceClient, PushOutcome};
pub use storage::{HttpObjectStore, LocalObjectStore, MemoryObjectStore, ObjectStore, StorageError};
pub use store::{HttpSessionStore, MemoryStore, PgSessionStore, SessionStore, StoreError};
pub use timer::TimerLedger;
pub use wizard::{Position, StepOutcome, Submission, Wizard, WizardError, WizardOptions};
