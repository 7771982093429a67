// Serial console library - exposes all core modules for testing

pub mod adapter;
pub mod config;
#[cfg(feature = "runtime")]
pub mod input;
pub mod model;
pub mod services;
pub mod view;
