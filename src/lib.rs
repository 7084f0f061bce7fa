/*!
Streaming and in-memory patcher for the BPS (beat) binary patch format.

`PatchSession` applies one command per call against caller-supplied
seekable streams. `Bpspatch` applies a whole patch held in memory.
*/

pub mod bpspatch;
pub mod error;
pub mod header;
pub mod session;
pub mod varint;

pub use bpspatch::Bpspatch;
pub use error::{ChecksumKind, Error, Result};
pub use header::{verify_marker, Footer, Header};
pub use session::{Command, PatchSession, Step};
