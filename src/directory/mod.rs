//! Room code allocation and lookup.
//!
//! The directory is the HTTP side of the rendezvous: it hands out room
//! codes for a list of files and answers who is online in a room.

pub mod directory_error;
pub mod http_directory;
pub mod memory_directory;
pub mod room_directory;
mod tests;

pub use directory_error::DirectoryError;
pub use http_directory::HttpRoomDirectory;
pub use memory_directory::MemoryRoomDirectory;
pub use room_directory::{DirectoryConfig, RoomDirectory, RoomFile, RoomInfo};
