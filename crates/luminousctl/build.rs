//! Stamps the version `ask-nix --version` prints.
//!
//! Packagers may pin it with LUMINOUS_VERSION (e.g. a nixpkgs revision
//! suffix); plain builds report the crate version.

fn main() {
    let version = match std::env::var("LUMINOUS_VERSION") {
        Ok(pinned) if !pinned.trim().is_empty() => pinned.trim().to_string(),
        _ => env!("CARGO_PKG_VERSION").to_string(),
    };
    println!("cargo:rustc-env=LUMINOUS_VERSION={}", version);
    println!("cargo:rerun-if-env-changed=LUMINOUS_VERSION");
    println!("cargo:rerun-if-changed=Cargo.toml");
}
