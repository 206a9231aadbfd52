fn main(){
    let crate_dir = match std::env::var("CARGO_MANIFEST_DIR"){
        Ok(dir) => dir,
        Err(_) => return,
    };

    let mut config = cbindgen::Config::default();
    config.language = cbindgen::Language::C;
    config.include_guard = Some("AUV_NAV_H".to_string());

    println!("cargo:rerun-if-changed=src/ffi/mod.rs");

    match cbindgen::Builder::new()
        .with_crate(crate_dir)
        .with_config(config)
        .generate()
    {
        Ok(bindings) =>{
            bindings.write_to_file("include/auv_nav.h");
        }
        Err(e) =>{
            println!("cargo:warning=Unable to generate C header: {}", e);
        }
    }
}
