//! # framecast-cli
//!
//! Binary crate for the `framecast` frame streamer. Houses the TOML
//! configuration; the runtime wiring lives in `main.rs`.

pub mod config;
