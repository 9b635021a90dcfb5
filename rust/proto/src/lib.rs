//! Generated gRPC bindings for the Log Service and Coordinator wire
//! protocols. Everything in this crate is produced by `tonic-build` from the
//! `.proto` files in `proto/`; application code lives in `chroma-log-service`
//! and `chroma-coordinator`, not here.

#[allow(clippy::all)]
pub mod log_service {
    tonic::include_proto!("chroma.log_service");
}

#[allow(clippy::all)]
pub mod coordinator {
    tonic::include_proto!("chroma.coordinator");
}
