pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod http;
pub mod install;
pub mod package;
pub mod registry;
pub mod runtime;
pub mod version;
