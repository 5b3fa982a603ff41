//! HAP2 plugin runtime.
//!
//! A HAP2 plugin talks JSON-RPC 2.0 with the Hatohol server over a message
//! transport. The runtime provides:
//! - the transport contract and its registry ([`transporter`])
//! - the wire codec and schema validator ([`protocol`])
//! - the request/response plumbing ([`sender`], [`dispatcher`], [`receiver`], [`hapi`])
//! - the main plugin, the poller and their supervisor ([`plugin`], [`poller`], [`standard_hap`])
//!
//! A concrete plugin implements [`standard_hap::HapPlugin`] and calls
//! [`standard_hap::launch`] from `main`.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hapi;
pub mod hapi_time;
pub mod logging;
pub mod models;
pub mod plugin;
pub mod poller;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod standard_hap;
pub mod transporter;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::HapError;
pub use hapi::HapiProcessor;
pub use plugin::{BaseMainPlugin, MainPluginHandler};
pub use poller::{BasePoller, Collector};
pub use standard_hap::{HapPlugin, StandardHap};
