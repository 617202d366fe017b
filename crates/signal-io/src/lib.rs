pub mod metrics;
pub mod protocol;
pub mod store;

pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{IncomingMessage, InputsMsg, MessageError, ProtocolVersion, StateMsg};
pub use store::{randomize_timing, StoreError, StoredImage};
