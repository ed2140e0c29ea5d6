use std::path::PathBuf;

use vergen_gitcl::{Build, Cargo, Emitter, Gitcl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = Build::builder().build_timestamp(true).build();
    let cargo = Cargo::builder().build();
    let gitcl = Gitcl::builder().branch(true).sha(true).dirty(true).build();

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&cargo)?
        .add_instructions(&gitcl)?
        .emit()?;

    // Messages only: the service dispatcher and the client are hand-written
    // so every method can use the streaming path.
    let out_dir = PathBuf::from(std::env::var("OUT_DIR")?);
    tonic_build::configure()
        .build_server(false)
        .build_client(false)
        .file_descriptor_set_path(out_dir.join("greeter_descriptor.bin"))
        .compile_protos(&["proto/greeter/v1/greeter.proto"], &["proto"])?;

    Ok(())
}
