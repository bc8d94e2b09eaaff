#![deny(warnings)]

//! Voice chat core: records of a spoken conversation, the completion and
//! speech-synthesis clients, and the orchestrator that runs one turn.

pub mod config;
pub mod conversation;
pub mod inference;
pub mod orchestrator;
#[cfg(feature = "playback")]
pub mod playback;
pub mod tts;
pub mod util;

#[cfg(test)]
mod test_support;
