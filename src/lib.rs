pub mod command;
pub mod config;
pub mod console;
pub mod display;
pub mod format;
pub mod input;
pub mod logging;
pub mod pool;
pub mod session;
pub mod system;
