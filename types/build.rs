fn main() {
    println!("cargo:rerun-if-changed=proto/dirstore.proto");
    tonic_prost_build::configure()
        .compile_protos(&["proto/dirstore.proto"], &["proto/"])
        .expect("Failed to compile proto/dirstore.proto");
}
