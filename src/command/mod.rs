//! Command dispatch for the gate controller
//!
//! This module handles:
//! - Matching inbound broker messages against the lane command topics
//! - Invoking the matching gate controller
//! - Silently dropping anything unrecognized

mod dispatcher;

pub use dispatcher::CommandDispatcher;
