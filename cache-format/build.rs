fn main() -> Result<(), Box<dyn std::error::Error>> {
    let protoc = protoc_bin_vendored::protoc_bin_path()?;
    std::env::set_var("PROTOC", protoc);
    prost_build::Config::new()
        // BTreeMap keeps map entries sorted so encoding is deterministic.
        .btree_map(["."])
        .compile_protos(&["proto/map_data.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/map_data.proto");
    Ok(())
}
