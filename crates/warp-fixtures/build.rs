//! Compiles every fixture listed in `fixtures/manifest.json` to Rust and
//! writes the concatenated modules to `$OUT_DIR/fixtures.rs`.

use std::env;
use std::error::Error;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use warp_compiler::CompileOptions;

#[derive(Deserialize)]
struct Fixture {
    file: String,
    options: CompileOptions,
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("cargo:rerun-if-changed=fixtures");

    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("fixtures");
    let manifest = fs::read_to_string(root.join("manifest.json"))?;
    let fixtures: Vec<Fixture> = serde_json::from_str(&manifest)?;

    let mut out = String::new();
    for fixture in &fixtures {
        let path = root.join(&fixture.file);
        println!("cargo:rerun-if-changed={}", path.display());
        let bytes = wat::parse_file(&path)?;
        let compiled = warp_compiler::compile_bytes(&bytes, &fixture.options)
            .map_err(|e| format!("{}: {e}", fixture.file))?;
        out.push_str(&compiled.source);
        out.push('\n');
    }

    let dest = PathBuf::from(env::var("OUT_DIR")?).join("fixtures.rs");
    fs::write(dest, out)?;
    Ok(())
}
