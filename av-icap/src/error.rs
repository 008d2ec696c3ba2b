use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the ICAP antivirus client.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure (connect, read or write on the socket).
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// Response framing could not be parsed.
    #[error("ICAP parsing error: {0}")]
    Parse(String),

    /// An expected response header was absent.
    #[error("Missing header: {0}")]
    MissingHeader(&'static str),

    /// The server did not answer within the configured connection timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// Operation attempted on a client that is not connected.
    #[error("Client is not connected")]
    NotConnected,

    /// Protocol-level error reported by the server.
    #[error("{code}: {reason}")]
    Server { code: u16, reason: &'static str },

    /// The server answered with a status code outside the known set.
    #[error("Server returned unknown status code: {0}")]
    UnknownStatusCode(u16),

    /// The response carried no status code at all.
    #[error("Server didn't return a status code")]
    MissingStatusCode,

    /// Scanner configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Why a configuration load failed. Callers that only care about "no
/// configuration" can treat every variant the same; the distinction exists so
/// a missing file and a corrupt file can be reported differently.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file {0:?} does not exist")]
    NotFound(PathBuf),

    #[error("{0:?} is not a regular file and cannot be used as a configuration file")]
    NotAFile(PathBuf),

    #[error("configuration file {path:?} cannot be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed property line: {0}")]
    Parse(String),

    #[error("key [{0}] cannot be resolved to <scannerId>.<propertyName>")]
    MalformedKey(String),

    #[error("no scanner configuration passed validation")]
    ValidationFailed,
}

/// Result alias used across the crate.
pub type IcapResult<T> = Result<T, Error>;
