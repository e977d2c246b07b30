//! Generated gRPC types for the cognitive controller surface, plus
//! conversions to and from the domain types.

pub mod convert;

/// Generated protobuf + tonic code.
pub mod pb {
    tonic::include_proto!("aegis.controller.v1");
}

pub use pb::cognitive_controller_client::CognitiveControllerClient;
pub use pb::cognitive_controller_server::{CognitiveController, CognitiveControllerServer};
