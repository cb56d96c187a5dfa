//! Vendor module - client contract, blocking adapter and client registry

pub mod blocking;
pub mod client;
pub mod registry;
pub mod run_cache;
pub mod scripted;

pub use blocking::{BlockingAdapter, BlockingVendorClient};
pub use client::{BatchMode, BatchResult, Capabilities, FetchError, VendorClient, VendorError};
pub use registry::{ClientContext, ClientFactory, ClientRegistry, RegistryError};
pub use run_cache::RunCache;
pub use scripted::ScriptedVendorClient;
