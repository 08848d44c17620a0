//! Editor state shared between the session, the engine protocol and the
//! share link.
//!
//! The [`codec`] module compresses source text into a URL-safe string and
//! back. The [`fragment`] module reads and merges `#code=...&flag=true`
//! fragments without disturbing keys it does not own.

pub mod codec;
mod document;
pub mod fragment;
mod options;

pub use codec::{decode, encode};
pub use document::{DocumentId, EditSnapshot};
pub use fragment::UrlState;
pub use options::OptionSet;
