//! keyscribe: global hotkey dictation and text rewrite engine
//!
//! Key events from a platform event tap are classified against three
//! configurable shortcuts. A recording session turns the resulting intents
//! into audio captures, and a cancellable pipeline turns captures into
//! transcribed or rewritten text inserted at the cursor.

pub mod capture;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod hotkey;
pub mod ipc;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod settings;
pub mod state;
