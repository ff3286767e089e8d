//! Records the screen in the background, lets a vision model describe what happened and keeps the
//! result as a timeline of activity cards. Everything can be inspected from a terminal.
//!

pub mod cli;
pub mod config;
pub mod daemon;
pub mod llm;
pub mod screen_api;
pub mod update;
pub mod utils;
pub mod window_api;
