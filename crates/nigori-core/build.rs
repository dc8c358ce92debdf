fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Vendored protoc binary, no system installation required
    let protoc_path = protoc_bin_vendored::protoc_bin_path().map_err(|e| e.to_string())?;
    std::env::set_var("PROTOC", protoc_path);

    // Messages only: the Nigori entity travels through the sync engine, not gRPC
    tonic_prost_build::configure()
        .build_client(false)
        .build_server(false)
        .compile_protos(&["src/proto/nigori.proto"], &["src/proto"])?;

    println!("cargo:rerun-if-changed=src/proto/nigori.proto");
    Ok(())
}
