pub mod checkpoint;
pub mod chunker;
pub mod classifier;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod message;
pub mod output;
pub mod session;
pub mod vcr;
