//! Device registry records: mount resolution and free-space tracking.

pub mod record;
