use std::env;
use std::path::PathBuf;

macro_rules! println_build {
    ($($tokens:tt)*) => {
        println!("cargo:warning=\r\x1b[32;1m   {}", format!($($tokens)*))
    }
}

fn main() {
    println!("cargo:rerun-if-env-changed=TYCAM_SDK_ROOT");
    println!("cargo:rerun-if-changed=build.rs");

    if env::var_os("CARGO_FEATURE_NATIVE").is_none() {
        // Types and constants only; nothing to link.
        return;
    }

    link_tycam();
}

#[cfg(feature = "native")]
fn link_tycam() {
    if let Some(root) = resolve_sdk_root() {
        let lib_dir = root.join("lib");
        println_build!("Linking libtycam from: {}", lib_dir.display());
        println!("cargo:rustc-link-search=native={}", lib_dir.display());
        println!("cargo:rustc-link-lib=dylib=tycam");
        println!("cargo:root={}", root.display());
        return;
    }

    match pkg_config::Config::new().probe("tycam") {
        Ok(lib) => {
            println_build!("Found libtycam via pkg-config ({})", lib.version);
        }
        Err(err) => {
            println_build!("pkg-config could not find tycam: {}", err);
            println_build!("Falling back to the system linker search path");
            println!("cargo:rustc-link-lib=dylib=tycam");
        }
    }
}

#[cfg(not(feature = "native"))]
fn link_tycam() {}

#[cfg_attr(not(feature = "native"), allow(dead_code))]
fn resolve_sdk_root() -> Option<PathBuf> {
    let path = PathBuf::from(env::var("TYCAM_SDK_ROOT").ok()?);
    if path.join("lib").exists() {
        Some(path)
    } else {
        println_build!("TYCAM_SDK_ROOT is set but has no lib/ directory: {}", path.display());
        None
    }
}
