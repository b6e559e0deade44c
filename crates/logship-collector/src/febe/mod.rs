//! The framed stream protocol spoken by the database's log extension:
//! codec, record decoding, and the per-connection worker.

pub mod codec;
pub mod record;
pub mod worker;
