//! Contracts shared by the ferry proxy and the ferry store.
//!
//! Both sides of the remote boundary speak in the types defined here:
//! the open/chunk envelopes, the version marker, and a closed error
//! vocabulary that maps onto POSIX errno values.

pub mod error;
pub mod protocol;

pub use error::{ErrorKind, RemoteError};
pub use protocol::{
    ChunkReply, FileSnapshot, OpenIntent, OpenReply, RemoteStore, Version, MAX_TRANSFER_SIZE,
};

pub mod prelude {
    pub use crate::error::{ErrorKind, RemoteError};
    pub use crate::protocol::{
        ChunkReply, FileSnapshot, OpenIntent, OpenReply, RemoteStore, Version, MAX_TRANSFER_SIZE,
    };
}
