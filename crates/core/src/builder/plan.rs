//! Lazily fetches and caches the external build-plan generator binary:
//! prefer a writable system bin directory, fall back to a per-process temp
//! directory; pick the release asset for the host architecture; Linux only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;

const SYSTEM_BIN_DIR: &str = "/usr/local/bin";

/// Release asset architecture suffixes this platform supports.
fn release_arch() -> Result<&'static str> {
    match std::env::consts::ARCH {
        "aarch64" => Ok("arm64"),
        "x86_64" => Ok("x86_64"),
        other => bail!("Unsupported architecture: {other}"),
    }
}

fn is_writable(dir: &Path) -> bool {
    // Best-effort writability probe: attempt to create and remove a marker
    // file rather than inspecting permission bits, since the owning uid
    // inside a container is not always the one `metadata()` reports on.
    let probe = dir.join(format!(".fats-write-probe-{}", std::process::id()));
    if std::fs::write(&probe, b"").is_ok() {
        let _ = std::fs::remove_file(&probe);
        true
    } else {
        false
    }
}

/// Ensure the plan generator binary is present locally, downloading it from
/// its GitHub release if necessary. Returns the path to the executable.
pub async fn ensure_plan_generator(
    bin_name: &str,
    version_tag: &str,
    scratch_dir: &Path,
) -> Result<PathBuf> {
    if std::env::consts::OS != "linux" {
        bail!("Unsupported platform. Only Linux is supported.");
    }

    let system_dir = Path::new(SYSTEM_BIN_DIR);
    let target_path = if is_writable(system_dir) {
        system_dir.join(bin_name)
    } else {
        scratch_dir.join(bin_name)
    };

    if target_path.exists() {
        return Ok(target_path);
    }

    let arch = release_arch()?;
    let url = format!(
        "https://github.com/railwayapp/{bin_name}/releases/download/{version_tag}/{bin_name}-{version_tag}-{arch}-unknown-linux-musl.tar.gz"
    );

    tracing::info!(url = %url, "Downloading build-plan generator");

    tokio::fs::create_dir_all(scratch_dir)
        .await
        .context("Failed to create scratch directory")?;

    let response = reqwest::get(&url)
        .await
        .context("Failed to download build-plan generator")?
        .error_for_status()
        .context("Build-plan generator download returned an error status")?;

    let archive_path = scratch_dir.join(format!("{bin_name}.tar.gz"));
    let bytes = response
        .bytes()
        .await
        .context("Failed to read build-plan generator download")?;
    {
        let mut file = tokio::fs::File::create(&archive_path)
            .await
            .context("Failed to create archive file")?;
        file.write_all(&bytes).await.context("Failed to write archive file")?;
    }

    extract_binary(&archive_path, bin_name, &target_path)?;

    set_executable(&target_path)?;
    Ok(target_path)
}

fn extract_binary(archive_path: &Path, bin_name: &str, target_path: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path).context("Failed to open downloaded archive")?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    for entry in archive.entries().context("Failed to read archive entries")? {
        let mut entry = entry.context("Failed to read archive entry")?;
        let path = entry.path().context("Failed to read entry path")?;
        if path.as_os_str() == bin_name {
            let mut out = std::fs::File::create(target_path)
                .context(format!("Failed to create {}", target_path.display()))?;
            std::io::copy(&mut entry, &mut out).context("Failed to extract binary")?;
            return Ok(());
        }
    }

    bail!("'{bin_name}' binary not found in the downloaded archive")
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .context("Failed to read binary metadata")?
        .permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).context("Failed to mark binary executable")?;
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
