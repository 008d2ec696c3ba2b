//! Scanner configuration: schema, validation, loading, caching and file watch.

pub mod cache;
pub mod holder;
pub mod key;
pub mod loader;
pub mod validate;
pub mod watch;

pub use cache::ConfigCache;
pub use holder::ScannerConfig;
pub use key::PropertyKey;
pub use loader::LoadedConfig;
pub use validate::Validator;
pub use watch::spawn_config_watch;
