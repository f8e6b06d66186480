pub mod controller;
pub mod error;
pub mod identity;
pub mod loader;
pub mod synchronizer;

pub use controller::{
    ControllerState, Notice, RequestTag, SessionConfig, SessionController, SessionHandle,
    SessionView, ViewEntry, ABORTED_NOTICE, FAILED_NOTICE,
};
pub use error::SessionError;
pub use identity::{IdentityProvider, StaticIdentity};
pub use loader::HistoryLoader;
pub use synchronizer::TranscriptSynchronizer;
