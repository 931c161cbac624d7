pub mod server;

/// Generated protobuf code
pub mod proto {
    tonic::include_proto!("ledger");
}
