//! Embeds build metadata (`BUILD_TIMESTAMP`, `BUILD_DATETIME`, `BUILD_GIT_HASH`)
//! logged by the operator at startup. CI can pin each value through the
//! environment variable of the same name.

use std::process::Command;

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn main() {
    let timestamp = std::env::var("BUILD_TIMESTAMP")
        .ok()
        .and_then(|ts| ts.parse::<u64>().ok())
        .unwrap_or_else(now_secs);

    let datetime = std::env::var("BUILD_DATETIME")
        .unwrap_or_else(|_| chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

    let git_hash = std::env::var("BUILD_GIT_HASH")
        .ok()
        .or_else(git_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BUILD_TIMESTAMP={timestamp}");
    println!("cargo:rustc-env=BUILD_DATETIME={datetime}");
    println!("cargo:rustc-env=BUILD_GIT_HASH={git_hash}");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=BUILD_TIMESTAMP");
    println!("cargo:rerun-if-env-changed=BUILD_GIT_HASH");
}

/// Short HEAD hash with a `-dirty` suffix for uncommitted changes
fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;

    let dirty = Command::new("git")
        .args(["diff", "--quiet"])
        .output()
        .is_ok_and(|output| !output.status.success());

    Some(format!("{}{}", hash.trim(), if dirty { "-dirty" } else { "" }))
}
