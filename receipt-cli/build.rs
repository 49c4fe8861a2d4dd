//! Stamps `receipts --version` with the commit it was built from.
//!
//! `RECEIPTS_BUILD_SHA` in the build environment wins (release tarballs have
//! no `.git`); otherwise `git describe` of the workspace, marked `-dirty` when
//! the tree has local edits.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=RECEIPTS_BUILD_SHA");
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/index");

    let sha = std::env::var("RECEIPTS_BUILD_SHA")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=RECEIPTS_BUILD_SHA={sha}");
}

fn git_describe() -> Option<String> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").ok()?;
    let out = Command::new("git")
        .args(["-C", &manifest_dir, "describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!sha.is_empty()).then_some(sha)
}
