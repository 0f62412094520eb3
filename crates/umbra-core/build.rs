//! Build script for umbra-core
//!
//! Checks the toolchain and target before compilation:
//! - Minimum Rust version (`let`-`else`, `Option::is_some_and` need 1.70)
//! - Target pointer width (the native module ships x86 and x64 variants only)

use std::env;

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::new(1, 70, 0);

        if rustc_version < min_rust_version {
            panic!(
                "umbra-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // Some build environments hide rustc; do not fail the build over it
        println!("cargo:warning=could not verify Rust version");
    }

    // cfg!() here would describe the build host, not the target
    let pointer_width = env::var("CARGO_CFG_TARGET_POINTER_WIDTH").unwrap_or_default();

    if !matches!(pointer_width.as_str(), "32" | "64") {
        println!("cargo:warning=no native module variant exists for {pointer_width}-bit targets");
    }
}
