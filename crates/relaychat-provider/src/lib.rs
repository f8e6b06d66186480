pub mod client;
pub mod decoder;
pub mod error;
pub mod relay;
pub mod sse;
pub mod stream;

pub use client::{ChatClient, ChatMessage, ChatRequest, HttpChatClient};
pub use decoder::{DecodeStep, StreamDecoder};
pub use error::ProviderError;
pub use relay::{RelayGateway, RelayOutcome, MISSING_KEY_BODY, UPSTREAM_ERROR_BODY};
pub use sse::LineSplitter;
pub use stream::{parse_line, ByteStream, ChunkPayload, DecodeError, ParsedLine, DONE_SENTINEL};
