//! Shared foundation of the skiff transfer engine.
//!
//! Everything that crosses a crate boundary lives here: the serialisable
//! data model (profiles, directory entries, transfer tasks, sync diffs),
//! the dispatcher-level error taxonomy, remote path handling, and the
//! cooperative cancellation token handed into every long-running transfer.

pub mod cancel;
pub mod error;
pub mod paths;
pub mod types;

pub use cancel::CancelToken;
pub use error::{RemoteError, RemoteErrorKind, RemoteResult};
pub use types::*;
