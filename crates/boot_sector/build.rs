use std::path::Path;

fn main() {
    let dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let script = Path::new(&dir).join("boot-sector-link.ld");
    println!("cargo:rustc-link-arg-bins=--script={}", script.display());
    println!("cargo:rerun-if-changed={}", script.display());
}
