//! Network manager: ensures the shared container network exists and
//! attaches the control-plane container to it, via the `docker network
//! ls|create|connect` contract.

use anyhow::{Context, Result, bail};
use tokio::sync::OnceCell;

use crate::subprocess::run_expect_success;

pub struct NetworkManager {
    engine: String,
    network_name: String,
    /// Memoizes a *positive* `ensure_network` result only; a failed attempt
    /// is retried on the next call.
    confirmed: OnceCell<()>,
}

impl NetworkManager {
    pub fn new(engine: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            network_name: network_name.into(),
            confirmed: OnceCell::new(),
        }
    }

    /// Idempotently ensure the shared network exists; returns its name.
    pub async fn ensure_network(&self) -> Result<&str> {
        self.confirmed
            .get_or_try_init(|| async {
                let captured = run_expect_success(
                    &self.engine,
                    &[
                        "network",
                        "ls",
                        "--filter",
                        &format!("name={}", self.network_name),
                        "--format",
                        "{{.Name}}",
                    ],
                )
                .await
                .context("Failed to list networks")?;

                let output = String::from_utf8_lossy(&captured.stdout);
                if output.lines().any(|line| line.trim() == self.network_name) {
                    return Ok(());
                }

                run_expect_success(&self.engine, &["network", "create", &self.network_name])
                    .await
                    .context("Failed to create network")?;
                tracing::info!(network = %self.network_name, "Created shared network");
                Ok(())
            })
            .await?;

        Ok(&self.network_name)
    }

    /// Attach this process's own container to the shared network, deriving
    /// the container id from the hostname.
    pub async fn attach_self(&self) -> Result<()> {
        let network = self.ensure_network().await?;
        let container_id = self_container_id()?;

        run_expect_success(&self.engine, &["network", "connect", network, &container_id])
            .await
            .context("Failed to attach self to network")?;

        tracing::info!(container_id = %container_id, network = %network, "Attached self to network");
        Ok(())
    }
}

/// A 12-character lowercase hex hostname is treated as the container id;
/// any other shape is fatal.
fn self_container_id() -> Result<String> {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();

    if hostname.len() == 12 && hostname.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
        Ok(hostname)
    } else {
        bail!("Unable to determine self container id from hostname '{hostname}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_hex_hostname() {
        // Can't control the real hostname in a test sandbox, so exercise the
        // predicate directly via the same shape check.
        let looks_like_id = |h: &str| {
            h.len() == 12 && h.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        };
        assert!(looks_like_id("0123456789ab"));
        assert!(!looks_like_id("not-a-container"));
        assert!(!looks_like_id("0123456789AB"));
    }
}
