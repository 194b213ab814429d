//! Hands `memory.x` to `cortex-m-rt`'s linker script the way every
//! `cortex-m-rt`-based board crate in the pack does it: copy it into
//! `OUT_DIR`, add that to the link search path, and pass `-Tlink.x`.
//! Only relevant for the `hidbridge-firmware` binary target — the
//! `hidbridge` library itself links on the host for `cargo test`.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR set by cargo"));

    File::create(out_dir.join("memory.x"))
        .expect("create memory.x in OUT_DIR")
        .write_all(include_bytes!("memory.x"))
        .expect("write memory.x");

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed=memory.x");

    // Only the on-target (ARM) build of the binary needs the
    // `cortex-m-rt` linker script; a host build of the bin's
    // `#[cfg(not(target_arch = "arm"))]` stand-in `main` links
    // against the host's normal startup files instead.
    if env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("arm") {
        println!("cargo:rustc-link-arg-bins=-Tlink.x");
    }
}
