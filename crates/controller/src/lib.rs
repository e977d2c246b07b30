//! Cognitive controller: consumes classified events over the streaming
//! RPC surface, maintains bounded episodic state (patterns, insights,
//! reflections), and emits output commands from a fixed decision table.

pub mod engine;
pub mod loops;
pub mod service;
