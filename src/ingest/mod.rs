//! Ingestion adapters: normalize three producer styles into one stream
//! of sequenced chunks feeding the transfer queue.
//!
//! Every variant implements [`IngestionAdapter`]; the pipeline controller
//! starts and stops adapters through that trait alone, so the capture
//! source is controlled through a declared capability, never probed
//! dynamically.

pub mod packet;
pub mod pull;
pub mod push;

use crate::error::Result;
use crate::queue::{CancelHandle, QueueProducer};

pub use packet::{PacketAdapter, PacketHandle};
pub use pull::{ByteSource, PullAdapter};
pub use push::{PushAdapter, PushHandle};

/// Producer contract shared by all ingestion variants.
///
/// `start` binds the adapter to a session's transfer queue; from then on
/// the adapter feeds sequenced chunks until it is stopped, cancelled, or
/// hits a producer-side failure. On failure the adapter surfaces exactly
/// one in-band fault and stops accepting chunks.
pub trait IngestionAdapter: Send {
    /// Begins producing chunks into the given queue.
    fn start(&mut self, producer: QueueProducer, cancel: CancelHandle) -> Result<()>;

    /// Stops producing. Blocks until the adapter's own resources (threads,
    /// sources) are released; bounded wait.
    fn stop(&mut self) -> Result<()>;

    /// Name of this adapter variant for logging.
    fn name(&self) -> &'static str;
}
