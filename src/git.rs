//! Stage, commit and push through the git CLI.
use crate::util::first_line;
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;
use std::path::Path;
use std::process::{Command, Output};
use std::time::Instant;

pub const GIT_COMMAND_ENV: &str = "REROOT_GIT";

/// The git program plus any leading arguments (`git -c user.name=ci`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommand {
    argv: Vec<String>,
}

impl GitCommand {
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(anyhow!("git command must not be empty"));
        }
        Ok(Self { argv })
    }

    /// `REROOT_GIT` if set, otherwise `git` resolved on `PATH`.
    pub fn load() -> Result<Self> {
        if let Ok(raw) = env::var(GIT_COMMAND_ENV) {
            return Self::parse(&raw).with_context(|| format!("parse {GIT_COMMAND_ENV}"));
        }
        let path = which::which("git").context("locate git on PATH")?;
        Self::new(vec![path.display().to_string()])
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let argv = shell_words::split(raw).context("split command line")?;
        Self::new(argv)
    }

    fn command(&self, repo_root: &Path) -> Command {
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .current_dir(repo_root)
            .env("GIT_TERMINAL_PROMPT", "0");
        command
    }

    fn output(&self, repo_root: &Path, args: &[&str]) -> Result<Output> {
        let start = Instant::now();
        let output = self
            .command(repo_root)
            .args(args)
            .output()
            .with_context(|| format!("run git {}", args.join(" ")))?;
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis(),
            args = %args.join(" "),
            status = ?output.status.code(),
            "git command complete"
        );
        Ok(output)
    }

    /// Run git and fail on a non-zero exit, carrying the first stderr line.
    pub fn run(&self, repo_root: &Path, args: &[&str]) -> Result<String> {
        let output = self.output(repo_root, args)?;
        if !output.status.success() {
            let mut detail = first_line(&output.stderr);
            if detail.is_empty() {
                detail = first_line(&output.stdout);
            }
            if detail.is_empty() {
                detail = format!("status {}", output.status);
            }
            return Err(anyhow!("git {} failed: {detail}", args.join(" ")));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn is_work_tree(&self, repo_root: &Path) -> bool {
        self.run(repo_root, &["rev-parse", "--is-inside-work-tree"])
            .map(|out| out == "true")
            .unwrap_or(false)
    }

    /// The branch HEAD points at. Works before the first commit; fails when
    /// HEAD is detached.
    pub fn current_branch(&self, repo_root: &Path) -> Result<String> {
        let output = self.output(repo_root, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        match output.status.code() {
            Some(0) => Ok(String::from_utf8_lossy(&output.stdout).trim().to_string()),
            Some(1) => Err(anyhow!(
                "HEAD is detached; pass --branch to choose the branch to push"
            )),
            _ => Err(anyhow!(
                "git symbolic-ref HEAD failed: {}",
                first_line(&output.stderr)
            )),
        }
    }

    /// True when the index differs from HEAD (or HEAD does not exist yet).
    fn has_staged_changes(&self, repo_root: &Path) -> Result<bool> {
        let output = self.output(repo_root, &["diff", "--cached", "--quiet"])?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(anyhow!(
                "git diff --cached --quiet failed: {}",
                first_line(&output.stderr)
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub remote: String,
    pub branch: Option<String>,
    pub message: String,
    pub push: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub branch: String,
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

/// `git add -A`, commit if anything is staged, then push unless disabled.
pub fn publish(
    git: &GitCommand,
    repo_root: &Path,
    options: &PublishOptions,
) -> Result<PublishOutcome> {
    if !git.is_work_tree(repo_root) {
        return Err(anyhow!("{} is not inside a git work tree", repo_root.display()));
    }
    let branch = match &options.branch {
        Some(branch) => branch.clone(),
        None => git.current_branch(repo_root)?,
    };

    git.run(repo_root, &["add", "-A"])?;
    let committed = git.has_staged_changes(repo_root)?;
    let commit = if committed {
        git.run(repo_root, &["commit", "--quiet", "-m", &options.message])?;
        let sha = git.run(repo_root, &["rev-parse", "HEAD"])?;
        tracing::info!(commit = %sha, "committed changes");
        Some(sha)
    } else {
        tracing::info!("nothing to commit");
        None
    };

    let mut pushed = false;
    if options.push {
        git.run(
            repo_root,
            &["push", "--quiet", &options.remote, &format!("HEAD:{branch}")],
        )?;
        tracing::info!(remote = %options.remote, branch = %branch, "pushed");
        pushed = true;
    }

    Ok(PublishOutcome {
        branch,
        committed,
        commit,
        pushed,
        remote: pushed.then(|| options.remote.clone()),
    })
}
