pub mod conversation;
pub mod message;
pub mod session;
pub mod transcript;

pub use conversation::*;
pub use message::*;
pub use session::*;
pub use transcript::*;
