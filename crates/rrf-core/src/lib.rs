//! The Processor loop: drives [`rrf_transport::DataTransfer`], routes
//! decoded packets to channels and external collaborators, and decides
//! what goes into the next tx payload.

mod context;
mod error;
mod handle;
mod processor;

pub use context::{Channels, CoreContext, LogMessageSink, MessageSink, NullObjectModelSink, ObjectModelSink};
pub use error::CoreError;
pub use handle::CoreHandle;
pub use processor::Processor;
