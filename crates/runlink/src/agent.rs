//! Agent identity string derivation.
//!
//! The identity string is passed to the runtime via [`crate::config::AGENT_ENV`]
//! and consumed there for diagnostics and telemetry only; nothing on the host
//! side parses it back. The format is an opaque contract with the runtime:
//! four `/`-separated segments, host identifier first.

/// Host identifier, the first segment of the identity string.
pub const HOST_ID: &str = "runlink";

/// Sentinel for build metadata that was not available at compile time.
const UNKNOWN: &str = "Unknown";

/// Toolchain metadata captured by the build script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildMeta {
    /// Version of the compiler that built this crate (e.g. `1.84.0`).
    pub rustc_version: &'static str,
    /// Target triple this crate was built for.
    pub target: &'static str,
}

/// Look up the toolchain metadata, degrading to [`UNKNOWN`] per field.
pub fn build_meta() -> BuildMeta {
    BuildMeta {
        rustc_version: non_blank(option_env!("RUNLINK_RUSTC_VERSION")),
        target: non_blank(option_env!("RUNLINK_TARGET")),
    }
}

/// Assemble the agent identity string:
/// `<host-id>/<rustc-version>/<target-triple>/<crate-version>`.
pub fn identity() -> String {
    let meta = build_meta();
    format!(
        "{HOST_ID}/{}/{}/{}",
        meta.rustc_version,
        meta.target,
        env!("CARGO_PKG_VERSION")
    )
}

fn non_blank(value: Option<&'static str>) -> &'static str {
    match value {
        Some(s) if !s.trim().is_empty() => s,
        _ => UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_has_four_segments() {
        let id = identity();
        let segments: Vec<&str> = id.split('/').collect();
        assert_eq!(segments.len(), 4, "identity must keep its wire shape: {id}");
        assert!(segments.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn identity_leads_with_host_id() {
        assert!(identity().starts_with("runlink/"));
    }

    #[test]
    fn missing_metadata_degrades_to_sentinel() {
        assert_eq!(non_blank(None), "Unknown");
        assert_eq!(non_blank(Some("   ")), "Unknown");
        assert_eq!(non_blank(Some("1.84.0")), "1.84.0");
    }
}
