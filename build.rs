use std::env;
use std::path::PathBuf;

// Only the `ffmpeg` feature links native libraries; on Windows point out the
// vcpkg layout ffmpeg-next expects when FFMPEG_DIR is missing.
fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    if env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }
    if env::var_os("FFMPEG_DIR").is_some() {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=the `ffmpeg` feature needs FFmpeg development files; set FFMPEG_DIR (or VCPKG_ROOT for a vcpkg install)"
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let candidate = PathBuf::from(vcpkg_root).join("installed").join(triplet);
    if candidate.exists() {
        println!(
            "cargo:warning=using vcpkg FFmpeg at {}; set FFMPEG_DIR to silence this",
            candidate.display()
        );
    } else {
        println!(
            "cargo:warning=no vcpkg FFmpeg install found at {}",
            candidate.display()
        );
    }
}
