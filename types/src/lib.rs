//! Wire types for the `dirstore.DirStore` gRPC service.

pub mod dirstore {
    tonic::include_proto!("dirstore");
}
