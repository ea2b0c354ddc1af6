mod event_log;
mod mount_watch;
mod policy_watch;
mod ringbuf;
mod stats;
mod sweep;

pub use event_log::*;
pub use mount_watch::*;
pub use policy_watch::*;
pub use ringbuf::*;
pub use stats::*;
pub use sweep::*;
