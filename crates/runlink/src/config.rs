//! Launch configuration resolution.
//!
//! Resolves the runtime executable path (environment override beats the
//! provider default), assembles the environment overlay merged onto the
//! child's inherited environment, and fixes the startup argument list.
//!
//! Resolution is pure computation over an environment lookup; the public
//! entry points read the process environment, tests inject maps.

use std::path::PathBuf;

use crate::agent;

/// Host-side override for the runtime executable path.
pub const RUNTIME_PATH_ENV: &str = "RUNLINK_RUNTIME_PATH";

/// Debug flag forwarded verbatim to the runtime when set on the host.
pub const DEBUG_ENV: &str = "DEBUG";

/// Agent identity string, always set on the child.
pub const AGENT_ENV: &str = "RUNLINK_AGENT";

/// Heap budget for the runtime's VM. First startup argument, always passed.
pub const MEMORY_BUDGET_FLAG: &str = "--max-old-space-size=4096";

/// Supplies the default runtime location when no environment override is set.
///
/// How that path is discovered (bundled install, download cache, dev
/// checkout) is the provider's concern; the bridge only consumes it.
pub trait RuntimePathProvider {
    fn default_runtime_path(&self) -> PathBuf;
}

/// Everything the launch step needs, resolved up front.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Runtime executable to start.
    pub program: PathBuf,
    /// Fixed argument list: memory budget flag, then the program path itself
    /// (the runtime learns its own location from argv, not the environment).
    pub args: Vec<String>,
    /// Environment overlay merged additively onto the inherited environment.
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    /// Resolve against the process environment and the given provider.
    pub fn resolve(provider: &dyn RuntimePathProvider) -> Self {
        Self::resolve_from(|key| std::env::var(key).ok(), provider)
    }

    fn resolve_from(
        lookup: impl Fn(&str) -> Option<String>,
        provider: &dyn RuntimePathProvider,
    ) -> Self {
        let program = resolve_runtime_path(&lookup, provider);
        let args = vec![
            MEMORY_BUDGET_FLAG.to_string(),
            program.to_string_lossy().into_owned(),
        ];
        let env = build_env_overlay(&lookup, &agent::identity());
        Self { program, args, env }
    }

    /// Render the full command line for startup diagnostics.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Environment override wins when non-blank; otherwise the provider default.
fn resolve_runtime_path(
    lookup: &impl Fn(&str) -> Option<String>,
    provider: &dyn RuntimePathProvider,
) -> PathBuf {
    match lookup(RUNTIME_PATH_ENV) {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => provider.default_runtime_path(),
    }
}

/// Build the child environment overlay: the agent identity always, the debug
/// flag only when the host has it non-blank and the overlay does not already
/// carry it. The runtime path is deliberately absent (it travels as argv).
fn build_env_overlay(
    lookup: &impl Fn(&str) -> Option<String>,
    agent_identity: &str,
) -> Vec<(String, String)> {
    let mut overlay = vec![(AGENT_ENV.to_string(), agent_identity.to_string())];
    if let Some(debug) = lookup(DEBUG_ENV) {
        if !debug.trim().is_empty() && !overlay.iter().any(|(key, _)| key == DEBUG_ENV) {
            overlay.push((DEBUG_ENV.to_string(), debug));
        }
    }
    overlay
}
