//! Captures toolchain metadata for the agent identity string.

#[allow(clippy::print_stdout)]
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let rustc = std::env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = std::process::Command::new(&rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .and_then(|line| line.split_whitespace().nth(1).map(str::to_string))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let target = std::env::var("TARGET").unwrap_or_else(|_| "Unknown".to_string());

    println!("cargo:rustc-env=RUNLINK_RUSTC_VERSION={rustc_version}");
    println!("cargo:rustc-env=RUNLINK_TARGET={target}");
}
