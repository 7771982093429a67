pub mod channel_port;
pub mod event_loop;
pub mod focus;
#[cfg(feature = "runtime")]
pub mod terminal_modes;
pub mod throttle;
pub mod time_source;
#[cfg(feature = "runtime")]
pub mod tracing_setup;
