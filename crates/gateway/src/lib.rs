//! Aegis I/O plane: channel processors that ingest and classify external
//! communications, senders that execute output commands, the bounded
//! bidirectional queue between them, and the streaming client that
//! shuttles events and commands to and from the cognitive controller.

pub mod api;
pub mod bridge;
pub mod classify;
pub mod dispatch;
pub mod irc_wire;
pub mod metrics;
pub mod processors;
pub mod queue;
pub mod senders;
pub mod state;
