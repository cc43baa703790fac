//! Build intake: turn an uploaded gzip-compressed source archive into a
//! tagged OCI image and a persisted [`Project`](crate::store::Project).
//!
//! Archive extraction rejects any entry whose path escapes the extraction
//! root and any symlink pointing outside it, before handing the archive off
//! to the plan generator and image builder.

mod options;
mod plan;

pub use plan::ensure_plan_generator;

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::name::{validate_name, validate_version};
use crate::store::{NewProject, Project, Store};
use crate::subprocess::run_streamed;

/// Where and how to reach the external tools this module shells out to.
pub struct BuilderConfig {
    pub plan_generator_bin: String,
    pub plan_generator_version: String,
    /// Frontend image passed as `BUILDKIT_SYNTAX` to the image builder.
    pub plan_frontend_image: String,
    pub scratch_dir: PathBuf,
}

/// Extract `archive_path` (gzip tar), locate/generate the project config,
/// invoke the plan generator and image builder, and persist the resulting
/// project.
pub async fn build_from_archive(
    store: &Store,
    config: &BuilderConfig,
    archive_path: &Path,
) -> Result<Project> {
    let work_dir = tempdir_under(&config.scratch_dir)?;
    tracing::info!(archive = %archive_path.display(), work_dir = %work_dir.display(), "Extracting archive");

    extract_archive_safely(archive_path, &work_dir)?;
    let project_root = single_top_level_dir(&work_dir)?;

    let fallback_name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("app")
        .to_string();

    let new_project = options::parse_options_or_defaults(&project_root, &fallback_name)?;
    tracing::info!(name = %new_project.name, version = %new_project.version, "Parsed project config");

    validate_name(&new_project.name).context("invalid project name")?;
    validate_version(&new_project.version).context("invalid project version")?;

    let plan_out = project_root.join("plan.json");
    let info_out = project_root.join("info.json");
    let plan_bin = plan::ensure_plan_generator(
        &config.plan_generator_bin,
        &config.plan_generator_version,
        &config.scratch_dir,
    )
    .await?;

    run_streamed(
        &plan_bin.to_string_lossy(),
        &[
            "prepare",
            &project_root.to_string_lossy(),
            "--plan-out",
            &plan_out.to_string_lossy(),
            "--info-out",
            &info_out.to_string_lossy(),
        ],
    )
    .await
    .context("Plan generator failed")?;

    let tag = format!("{}:{}", new_project.name, new_project.version);
    let mut build_args = buildx_command().await;
    build_args.extend(
        [
            "build",
            "--build-arg",
            &format!("BUILDKIT_SYNTAX={}", config.plan_frontend_image),
            "--tag",
            &tag,
            "--progress=plain",
            "-f",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    build_args.push(plan_out.to_string_lossy().to_string());
    build_args.push(project_root.to_string_lossy().to_string());

    let (program, args) = build_args.split_first().context("empty build command")?;
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    run_streamed(program, &arg_refs).await.context("Image build failed")?;

    tracing::info!(tag = %tag, "Image build complete");

    store
        .upsert_project(NewProject {
            name: new_project.name,
            version: new_project.version,
            desired_secrets: new_project.desired_secrets,
        })
        .await
}

/// `docker-cli-plugin-docker-buildx` if it's on `PATH`, otherwise
/// `["docker", "buildx"]`.
async fn buildx_command() -> Vec<String> {
    if which("docker-cli-plugin-docker-buildx").is_some() {
        vec!["docker-cli-plugin-docker-buildx".to_string()]
    } else {
        vec!["docker".to_string(), "buildx".to_string()]
    }
}

fn which(bin_name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(bin_name);
        candidate.is_file().then_some(candidate)
    })
}

fn tempdir_under(scratch_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(scratch_dir).context("Failed to create scratch directory")?;
    let unique = format!("build-{}", uuid_like());
    let dir = scratch_dir.join(unique);
    std::fs::create_dir_all(&dir).context("Failed to create work directory")?;
    Ok(dir)
}

fn uuid_like() -> String {
    use rand::Rng;
    let n: u64 = rand::rng().random();
    format!("{n:016x}")
}

/// If the archive contains exactly one top-level directory, that is the
/// project root; otherwise the extraction directory itself is.
fn single_top_level_dir(extracted_to: &Path) -> Result<PathBuf> {
    let mut entries =
        std::fs::read_dir(extracted_to).context("Failed to read extraction directory")?;
    let first = entries.next();
    let second = entries.next();

    match (first, second) {
        (Some(only), None) => {
            let only = only.context("Failed to read directory entry")?;
            if only.file_type().context("Failed to read file type")?.is_dir() {
                Ok(only.path())
            } else {
                Ok(extracted_to.to_path_buf())
            }
        }
        _ => Ok(extracted_to.to_path_buf()),
    }
}

/// Extract a gzip tar archive into `dest`, rejecting any entry whose
/// normalized path escapes `dest` and any symlink pointing outside it.
fn extract_archive_safely(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)
        .context(format!("Failed to open archive {}", archive_path.display()))?;
    let gz = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(gz);

    for entry in archive.entries().context("Failed to read archive entries")? {
        let mut entry = entry.context("Failed to read archive entry")?;
        let entry_path = entry.path().context("Failed to read entry path")?.into_owned();

        if !path_stays_within_root(&entry_path) {
            bail!("Archive entry escapes extraction root: {}", entry_path.display());
        }

        if let Ok(Some(link_target)) = entry.link_name() {
            let resolved = entry_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(&link_target);
            if !path_stays_within_root(&resolved) {
                bail!(
                    "Archive symlink escapes extraction root: {} -> {}",
                    entry_path.display(),
                    link_target.display()
                );
            }
        }

        entry
            .unpack_in(dest)
            .context(format!("Failed to unpack {}", entry_path.display()))?;
    }

    Ok(())
}

/// True if joining `relative` onto any root never climbs above that root,
/// i.e. it contains no `..` component and is not absolute.
fn path_stays_within_root(relative: &Path) -> bool {
    !relative
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(!path_stays_within_root(Path::new("../escape")));
        assert!(!path_stays_within_root(Path::new("a/../../escape")));
        assert!(!path_stays_within_root(Path::new("/absolute")));
    }

    #[test]
    fn accepts_ordinary_relative_paths() {
        assert!(path_stays_within_root(Path::new("a/b/c")));
        assert!(path_stays_within_root(Path::new("options.ini")));
    }

    #[test]
    fn single_top_level_dir_descends_into_sole_directory() {
        let dir = tempdir::TempDir::new("fats-extract").unwrap();
        let inner = dir.path().join("my-project");
        std::fs::create_dir(&inner).unwrap();

        let root = single_top_level_dir(dir.path()).unwrap();
        assert_eq!(root, inner);
    }

    #[test]
    fn multiple_top_level_entries_use_extraction_dir_directly() {
        let dir = tempdir::TempDir::new("fats-extract").unwrap();
        std::fs::create_dir(dir.path().join("a")).unwrap();
        std::fs::create_dir(dir.path().join("b")).unwrap();

        let root = single_top_level_dir(dir.path()).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn single_top_level_file_uses_extraction_dir_directly() {
        let dir = tempdir::TempDir::new("fats-extract").unwrap();
        std::fs::write(dir.path().join("README.md"), b"hi").unwrap();

        let root = single_top_level_dir(dir.path()).unwrap();
        assert_eq!(root, dir.path());
    }
}
