//! WebAssembly test modules compiled to Rust by `build.rs`.
//!
//! Every entry of `fixtures/manifest.json` becomes one `pub mod` here, named
//! after its `module_name` option. The integration tests instantiate them
//! through `warp_exec::Store` and compare their behavior with `wasmi`
//! running the same `.wat` source.

include!(concat!(env!("OUT_DIR"), "/fixtures.rs"));
