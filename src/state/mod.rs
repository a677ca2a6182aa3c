//! Recording session state

mod machine;

pub use machine::{
    RecordingMode, RecordingSession, SessionState, SessionStatus, Submission, Transition,
};
