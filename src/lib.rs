pub mod audio;
pub mod config;
pub mod display;
pub mod emulator;
pub mod error;
pub mod input;
pub mod instruction;
pub mod state;
