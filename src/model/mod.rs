pub mod bus;
pub mod console_text;
