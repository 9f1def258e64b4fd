#![forbid(unsafe_code)]

pub mod character;
pub mod cli;
pub mod command;
pub mod config;
pub mod export;
pub mod formats;
pub mod llm;
pub mod logging;
pub mod openai;
pub mod outline;
pub mod pipeline;
pub mod prompts;
pub mod repair;
pub mod revision;
pub mod similarity;
pub mod workspace;
pub mod write;
