//! Layered configuration: built-in defaults, an optional JSON file, then CLI
//! flags.
use crate::cli::{PublishOverrides, RepoArgs, WorkflowOverrides};
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const REPO_CONFIG_REL: &str = ".reroot.json";
pub const USER_CONFIG_REL: &str = "reroot/config.json";

pub const DEFAULT_SUBDIR: &str = "campusone-web";
pub const DEFAULT_APP: &str = "campusone-web";
pub const DEFAULT_ORGANIZATION: &str = "campusone";
pub const DEFAULT_COVERAGE_THRESHOLD: u8 = 80;
pub const DEFAULT_REMOTE: &str = "origin";

/// On-disk config file. Every field is optional so a file can override just
/// the values a repository cares about.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_threshold: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub repo_root: PathBuf,
    pub config_path: Option<PathBuf>,
    pub subdir: String,
    /// Replace root files that collide with entries being flattened.
    pub overwrite: bool,
    pub app: String,
    pub directory: String,
    pub project_key: Option<String>,
    pub organization: String,
    pub coverage_threshold: u8,
    pub remote: String,
    pub branch: Option<String>,
    pub message: String,
    pub push: bool,
}

impl Settings {
    pub fn project_key(&self) -> Result<&str> {
        self.project_key
            .as_deref()
            .ok_or_else(|| anyhow!("project key missing; pass --project-key or set project_key"))
    }
}

/// CLI-level overrides, collected from whichever subcommand ran.
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub subdir: Option<&'a str>,
    pub overwrite: bool,
    pub workflows: Option<&'a WorkflowOverrides>,
    pub publish: Option<&'a PublishOverrides>,
}

pub fn default_message(subdir: &str) -> String {
    format!("Move {subdir} to repository root and regenerate workflows")
}

/// Resolve the repository root and load the layered settings.
pub fn load_settings(repo: &RepoArgs, overrides: Overrides<'_>) -> Result<Settings> {
    let repo_root = repo
        .repo
        .canonicalize()
        .with_context(|| format!("resolve repository root {}", repo.repo.display()))?;
    if !repo_root.is_dir() {
        return Err(anyhow!("{} is not a directory", repo_root.display()));
    }

    let config_path = match &repo.config {
        Some(path) => Some(path.clone()),
        None => discover_config(&repo_root, dirs::config_dir().as_deref()),
    };
    let file = match &config_path {
        Some(path) => load_config_file(path)?,
        None => ConfigFile {
            schema_version: CONFIG_SCHEMA_VERSION,
            ..Default::default()
        },
    };
    if let Some(path) = &config_path {
        tracing::debug!(path = %path.display(), "loaded config");
    }

    let settings = merge(repo_root, config_path, file, &overrides);
    validate_settings(&settings)?;
    Ok(settings)
}

/// Find the first config file that exists: `<repo>/.reroot.json`, then the
/// user config directory.
pub fn discover_config(repo_root: &Path, user_config_dir: Option<&Path>) -> Option<PathBuf> {
    let repo_config = repo_root.join(REPO_CONFIG_REL);
    if repo_config.is_file() {
        return Some(repo_config);
    }
    let user_config = user_config_dir?.join(USER_CONFIG_REL);
    user_config.is_file().then_some(user_config)
}

pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let file: ConfigFile =
        serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))?;
    if file.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {} in {} (expected {})",
            file.schema_version,
            path.display(),
            CONFIG_SCHEMA_VERSION
        ));
    }
    Ok(file)
}

fn merge(
    repo_root: PathBuf,
    config_path: Option<PathBuf>,
    file: ConfigFile,
    overrides: &Overrides<'_>,
) -> Settings {
    let workflows = overrides.workflows.cloned().unwrap_or_default();
    let publish = overrides.publish.cloned().unwrap_or_default();

    let subdir = overrides
        .subdir
        .map(str::to_string)
        .or(file.subdir)
        .unwrap_or_else(|| DEFAULT_SUBDIR.to_string());
    let app = workflows
        .app
        .or(file.app)
        .unwrap_or_else(|| DEFAULT_APP.to_string());
    let directory = workflows
        .directory
        .or(file.directory)
        .unwrap_or_else(|| subdir.clone());
    let message = publish
        .message
        .or(file.message)
        .unwrap_or_else(|| default_message(&subdir));

    Settings {
        repo_root,
        config_path,
        directory,
        app,
        project_key: workflows.project_key.or(file.project_key),
        organization: workflows
            .organization
            .or(file.organization)
            .unwrap_or_else(|| DEFAULT_ORGANIZATION.to_string()),
        coverage_threshold: workflows
            .coverage_threshold
            .or(file.coverage_threshold)
            .unwrap_or(DEFAULT_COVERAGE_THRESHOLD),
        remote: publish
            .remote
            .or(file.remote)
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        branch: publish.branch.or(file.branch),
        message,
        push: !publish.no_push,
        overwrite: overrides.overwrite || file.overwrite.unwrap_or(false),
        subdir,
    }
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_subdir(&settings.subdir)?;
    validate_job_id("app", &settings.app)?;
    validate_token("directory label", &settings.directory)?;
    if let Some(key) = &settings.project_key {
        validate_token("project key", key)?;
    }
    validate_token("organization", &settings.organization)?;
    if settings.coverage_threshold > 100 {
        return Err(anyhow!(
            "coverage threshold {} is outside 0..=100",
            settings.coverage_threshold
        ));
    }
    validate_git_ref("remote", &settings.remote)?;
    if let Some(branch) = &settings.branch {
        validate_git_ref("branch", branch)?;
    }
    if settings.message.trim().is_empty() {
        return Err(anyhow!("commit message must not be empty"));
    }
    Ok(())
}

/// The subdirectory must name a single entry directly under the root.
pub fn validate_subdir(subdir: &str) -> Result<()> {
    let trimmed = subdir.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(anyhow!("invalid subdirectory name {subdir:?}"));
    }
    if trimmed != subdir || subdir.contains('/') || subdir.contains('\\') {
        return Err(anyhow!(
            "subdirectory {subdir:?} must be a single path component"
        ));
    }
    Ok(())
}

/// Remote and branch names are passed to `git push` as positional arguments.
pub fn validate_git_ref(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    if value.starts_with('-') {
        return Err(anyhow!("{field} {value:?} must not start with '-'"));
    }
    Ok(())
}

/// Job ids in the pipeline are derived from the app name.
pub fn validate_job_id(field: &str, value: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").context("compile job id pattern")?;
    if !pattern.is_match(value) {
        return Err(anyhow!(
            "{field} {value:?} is not a valid job id (letters, digits, '-' and '_')"
        ));
    }
    Ok(())
}

/// Values interpolated into workflow YAML stay within a character set that
/// needs no quoting or escaping.
pub fn validate_token(field: &str, value: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z0-9._][A-Za-z0-9._:-]*$").context("compile token pattern")?;
    if !pattern.is_match(value) {
        return Err(anyhow!(
            "{field} {value:?} may only contain letters, digits, '.', '_', ':' and '-'"
        ));
    }
    Ok(())
}
