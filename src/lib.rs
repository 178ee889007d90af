//! Channels Client - Main Library
//!
//! Thin application layer over the `channels` workspace library.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **channels**: Channels pub/sub client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use channels_client::bin_common::{load_config_from_env, ConfigType};
//! use channels_client::channels::ClientConfig;
//! ```

// Re-export workspace libraries for convenience
pub use channels;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{BinaryRunner, RunConfig, SessionSummary};
}
