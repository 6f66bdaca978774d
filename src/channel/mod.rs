//! Command channel to the message broker
//!
//! This module handles:
//! - Maintaining the broker session (reconnection is left to the client library)
//! - Re-subscribing every command topic after each (re)connect
//! - Forwarding raw inbound messages to the command dispatcher

mod client;
mod events;

pub use client::{handle_broker_event, CommandChannel};
