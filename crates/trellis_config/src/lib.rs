//! Placement engine configuration.
//!
//! [`PlacerConfig`] carries the plain scalar/boolean tunables of the engine:
//! thread count, runtime budget, beam width, orientation and stack options,
//! and the cost-function weights. Configurations can be built in code or
//! deserialized from a `trellis.toml` file.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str};
pub use types::{PlacerConfig, Strategy};
