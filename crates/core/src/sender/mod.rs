//! Sender strategies (C5): forward candidate rows to the broker and
//! transition their status.

mod batch;
mod per_message;

pub use batch::BatchSender;
pub use per_message::PerMessageSender;
