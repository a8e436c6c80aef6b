//! Concrete collaborators backed by command line tools and configuration.

use tokio::process::Command;
use tracing::{debug, warn};

mod acr;
mod kubectl;
mod leadership;

pub use acr::AzureCliRegistry;
pub use kubectl::KubectlClusterState;
pub use leadership::ConfiguredLeadership;

/// Run a command to completion and return its stdout.
///
/// Everything the command writes to stderr is forwarded to the log at warn
/// level. A spawn failure or non-zero exit becomes an error message.
async fn run_command(program: &str, args: &[&str]) -> Result<Vec<u8>, String> {
    debug!(cmd = program, args = %args.join(" "), "Running command");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to execute {program}: {e}"))?;

    for line in String::from_utf8_lossy(&output.stderr).lines() {
        let line = line.trim();
        if !line.is_empty() {
            warn!(cmd = program, std = "err", "{}", line);
        }
    }

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(format!("{program} {} exited with {}", args.first().unwrap_or(&""), output.status))
    }
}
