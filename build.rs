fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=proto/llm.proto");

    if std::env::var_os("PROTOC").is_none() {
        match protoc_bin_vendored::protoc_bin_path() {
            Ok(path) => std::env::set_var("PROTOC", path),
            Err(e) => println!("cargo:warning=no vendored protoc available: {}", e),
        }
    }

    if let Err(e) = tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .compile_protos(&["proto/llm.proto"], &["proto"])
    {
        panic!("failed to compile proto/llm.proto: {}", e);
    }
}
