//! Network attachment
//!
//! This module handles:
//! - Bringing the network link up with bounded, immediate retries
//! - Publishing a ready signal other components can watch
//! - Re-attaching when an established link drops

mod link;
mod manager;

pub use link::TcpProbeLink;
pub use manager::ConnectivityManager;
