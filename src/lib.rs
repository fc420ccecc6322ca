/*!
A virtual streamer.

Chat messages are answered by a language model, the answer is spoken by a
speech synthesis engine, and the synthesized audio is turned into mouth shapes
that drive a 3D avatar.
*/

pub mod cli;
pub mod config;
pub mod db;
mod error;
mod http;
pub mod lip_sync;
pub mod llm;
pub mod logger;
pub mod model;
pub mod puppet;
pub mod stream;
pub mod streamer;
pub mod tts;

pub use config::StreamerConfig;
pub use error::{Error, Result};
pub use lip_sync::{LipSync, LipSyncConfig};
pub use puppet::Avatar;
pub use streamer::{CycleOutcome, Streamer};
