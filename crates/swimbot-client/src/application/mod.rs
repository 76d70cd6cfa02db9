//! Application layer of the swimbot client.
//!
//! # Sub-modules
//!
//! - **`protocol_client`** – Typed robot operations over one transport
//!   session.  Pairs each command with its single response and tears the
//!   session down on any transport fault.
//!
//! - **`supervisor`** – The connection state machine: connect attempts,
//!   bounded retries, manual disconnect, and the status poll that notices
//!   a device that has gone quiet.
//!
//! - **`service`** – The worker task that owns the supervisor, serialises
//!   commands with the poll, and hands out cloneable handles.
//!
//! Everything here talks to the network only through the `Transport` and
//! `Connector` traits, so it runs unchanged against in-memory fakes.

pub mod protocol_client;
pub mod service;
pub mod supervisor;
