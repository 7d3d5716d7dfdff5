//! Build script for sui_update.
//!
//! Sets:
//! - SUI_FIRMWARE_VERSION: firmware release this build belongs to
//!   (taken from the build environment, else the crate version)
//! - SUI_BUILD_DATE: UTC date of the build

fn main() {
    let firmware_version = std::env::var("SUI_FIRMWARE_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let build_date = chrono::Utc::now().format("%Y-%m-%d").to_string();

    println!("cargo:rustc-env=SUI_FIRMWARE_VERSION={}", firmware_version);
    println!("cargo:rustc-env=SUI_BUILD_DATE={}", build_date);

    println!("cargo:rerun-if-env-changed=SUI_FIRMWARE_VERSION");
}
