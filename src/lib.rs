// ABOUTME: Root library module for the Twitch chat bridge
// ABOUTME: Twitch transport, OpenAI speech backend and the Herald facade over herald-core

pub mod bot;
pub mod openai;
pub mod twitch;

// Re-export platform-agnostic modules from herald-core
pub use herald_core::config;
pub use herald_core::paths;
pub use herald_core::session;
pub use herald_core::traits;

pub use bot::Herald;
pub use openai::OpenAiSpeech;
pub use twitch::TwitchTransport;
