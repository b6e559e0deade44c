//! Multi-tenant log collector.
//!
//! Co-located producers connect over local sockets (or are tailed from
//! files), each mapped by the serve registry to a remote log sink. The
//! supervisor keeps one listener per registry entry and restarts the whole
//! generation of workers whenever the registry changes.
//!
//! ```text
//!   producer ─► listener ─► protocol worker ─► routing ─► delivery client ─► sink
//!                  ▲
//!   serves.new ─► registry ─► supervisor (generational restart)
//! ```

pub mod config;
pub mod febe;
pub mod listener;
pub mod logfile;
pub mod logger;
pub mod registry;
pub mod supervisor;
pub mod syslog;
