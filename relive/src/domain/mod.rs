//! Domain model: stream sources, the stream state machine, and the stream
//! record entity tracked by the registry.

mod source;
mod state;
mod stream;

pub use source::{PlatformKind, StreamSource};
pub use state::StreamStatus;
pub use stream::{StreamRecord, StreamSnapshot};
