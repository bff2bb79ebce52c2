pub mod config;
pub mod grpc;
