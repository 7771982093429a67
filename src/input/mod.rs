//! Host terminal input handling

pub mod host_events;
