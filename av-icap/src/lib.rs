#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

pub mod client;
pub mod config;
pub mod error;
mod parser;

pub use client::{IcapClient, ScanVerdict};
pub use config::{ConfigCache, ScannerConfig};
pub use error::{ConfigError, Error, IcapResult};

/// Lib version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// User agent advertised in every ICAP request.
pub const USER_AGENT: &str = concat!("av-icap/", env!("CARGO_PKG_VERSION"));
/// Line terminator on the ICAP wire.
pub const LINE_TERMINATOR: &str = "\r\n";
/// Header-block terminator.
pub const ICAP_TERMINATOR: &str = "\r\n\r\n";
/// Final chunk of an encapsulated body.
pub const CHUNK_TERMINATOR: &str = "0\r\n\r\n";
/// Final chunk when the preview already contained the whole body.
pub const IEOF_TERMINATOR: &str = "0; ieof\r\n\r\n";
/// Pseudo-key the response status code is stored under in a parsed header map.
pub const STATUS_CODE_KEY: &str = "StatusCode";
