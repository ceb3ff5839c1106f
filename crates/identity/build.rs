//! Build script for compiling protobuf definitions into Rust code

fn main() -> Result<(), Box<dyn std::error::Error>> {
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);

    tonic_build::configure().compile(
        &[
            "proto/attestor.proto",
            "proto/user_attestor.proto",
            "proto/user_auth.proto",
        ],
        &["proto"],
    )?;
    Ok(())
}
