pub mod answer;
pub mod session;

pub use answer::Answer;
pub use session::{SessionId, SessionRecord, SessionSummary, SubjectProfile};
