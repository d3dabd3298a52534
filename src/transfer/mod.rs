//! Chunked, flow-controlled file transfer over the bulk logical channel.
pub mod byte_source;
pub mod events;
pub mod file_transfer;
pub mod messages;
pub mod outgoing;
pub mod reassembler;
pub mod transfer_config;
pub mod transfer_error;
pub mod transfer_session;


pub use byte_source::{ByteSource, FileSource};
pub use events::{Direction, ReceivedFile, TransferEvent};
pub use file_transfer::FileTransfer;
pub use messages::{FileInfo, FileMetadata, FileStatus};
pub use transfer_config::TransferConfig;
pub use transfer_error::TransferError;
pub use transfer_session::{TransferSession, TransferState};
