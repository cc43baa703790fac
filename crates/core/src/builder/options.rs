//! `options.ini` parsing: per-project name, version, and desired secrets,
//! falling back to directory-name defaults when the file or its `[fats]`
//! section is absent.

use std::path::Path;

use anyhow::{Context, Result};

use crate::store::NewProject;

/// Parse `options.ini` at `project_root` if present; otherwise synthesize
/// defaults from `fallback_name` (the archive root directory's basename).
pub fn parse_options_or_defaults(project_root: &Path, fallback_name: &str) -> Result<NewProject> {
    let options_path = project_root.join("options.ini");

    let mut project = NewProject {
        name: fallback_name.to_string(),
        version: "0.0.1".to_string(),
        desired_secrets: Vec::new(),
    };

    if !options_path.exists() {
        return Ok(project);
    }

    let ini = ini::Ini::load_from_file(&options_path)
        .context(format!("Failed to parse {}", options_path.display()))?;

    let Some(section) = ini.section(Some("fats")) else {
        // Missing `[fats]` section uses all defaults.
        return Ok(project);
    };

    if let Some(name) = section.get("name") {
        project.name = name.to_string();
    }
    if let Some(version) = section.get("version") {
        project.version = version.to_string();
    }
    if let Some(list) = section.get("desired_secrets") {
        project.desired_secrets = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_options_ini_absent() {
        let dir = tempdir::TempDir::new("fats-options").unwrap();
        let project = parse_options_or_defaults(dir.path(), "my-app").unwrap();
        assert_eq!(project.name, "my-app");
        assert_eq!(project.version, "0.0.1");
        assert!(project.desired_secrets.is_empty());
    }

    #[test]
    fn defaults_when_fats_section_absent() {
        let dir = tempdir::TempDir::new("fats-options").unwrap();
        let mut file = std::fs::File::create(dir.path().join("options.ini")).unwrap();
        writeln!(file, "[other]\nkey=value").unwrap();

        let project = parse_options_or_defaults(dir.path(), "my-app").unwrap();
        assert_eq!(project.name, "my-app");
        assert_eq!(project.version, "0.0.1");
    }

    #[test]
    fn reads_name_version_and_secrets() {
        let dir = tempdir::TempDir::new("fats-options").unwrap();
        let mut file = std::fs::File::create(dir.path().join("options.ini")).unwrap();
        writeln!(
            file,
            "[fats]\nname=hello\nversion=1.0.0\ndesired_secrets = DB_URL, , API_KEY "
        )
        .unwrap();

        let project = parse_options_or_defaults(dir.path(), "ignored").unwrap();
        assert_eq!(project.name, "hello");
        assert_eq!(project.version, "1.0.0");
        assert_eq!(
            project.desired_secrets,
            vec!["DB_URL".to_string(), "API_KEY".to_string()]
        );
    }
}
