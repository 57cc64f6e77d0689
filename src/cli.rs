//! CLI argument parsing for the restructuring steps.
//!
//! Every step is its own subcommand so a partially applied restructuring can
//! be finished by hand; `run` chains them in order.
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "reroot",
    version,
    about = "Move a web app subdirectory to the repository root and regenerate its CI workflows",
    after_help = "Commands:\n  run        Flatten, regenerate workflows, commit and push\n  flatten    Move <subdir> contents to the repository root\n  workflows  Regenerate .github/workflows/<app>.yml and pipeline.yml\n  publish    Stage, commit and push the working tree\n  render     Print one rendered workflow to stdout\n\nExamples:\n  reroot run --repo . --project-key campusone_web\n  reroot flatten --subdir campusone-web\n  reroot render pipeline --app campusone-web --project-key campusone_web",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Emit a verbose transcript of each step
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Flatten(FlattenArgs),
    Workflows(WorkflowsArgs),
    Publish(PublishArgs),
    Render(RenderArgs),
}

/// Repository location and optional config file, shared by every command
/// that touches the working tree.
#[derive(Args, Debug, Clone)]
pub struct RepoArgs {
    /// Repository root to restructure
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo: PathBuf,

    /// JSON config file (defaults to <repo>/.reroot.json, then the user config dir)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WorkflowOverrides {
    /// App name; used for the app workflow file and the pipeline job ids
    #[arg(long, value_name = "NAME")]
    pub app: Option<String>,

    /// Directory label used only for artifact naming
    #[arg(long, value_name = "LABEL")]
    pub directory: Option<String>,

    /// SonarCloud project key
    #[arg(long, value_name = "KEY")]
    pub project_key: Option<String>,

    /// SonarCloud organization
    #[arg(long, value_name = "ORG")]
    pub organization: Option<String>,

    /// Minimum coverage percentage enforced by the quality gate
    #[arg(long, value_name = "PERCENT")]
    pub coverage_threshold: Option<u8>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PublishOverrides {
    /// Remote to push to
    #[arg(long, value_name = "NAME")]
    pub remote: Option<String>,

    /// Branch to push (defaults to the current branch)
    #[arg(long, value_name = "NAME")]
    pub branch: Option<String>,

    /// Commit message
    #[arg(long, short = 'm', value_name = "TEXT")]
    pub message: Option<String>,

    /// Commit but do not push
    #[arg(long)]
    pub no_push: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Flatten, regenerate workflows, commit and push")]
pub struct RunArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Subdirectory whose contents move to the repository root
    #[arg(long, value_name = "NAME")]
    pub subdir: Option<String>,

    /// Replace root files that also exist in the subdirectory
    #[arg(long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub workflows: WorkflowOverrides,

    #[command(flatten)]
    pub publish: PublishOverrides,

    /// Stop after regenerating workflows
    #[arg(long, conflicts_with = "no_push")]
    pub skip_publish: bool,

    /// Emit a machine-readable report
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Move <subdir> contents (including dotfiles) to the repository root")]
pub struct FlattenArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Subdirectory whose contents move to the repository root
    #[arg(long, value_name = "NAME")]
    pub subdir: Option<String>,

    /// Replace root files that also exist in the subdirectory
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Regenerate the app build workflow and the pipeline workflow")]
pub struct WorkflowsArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    #[command(flatten)]
    pub workflows: WorkflowOverrides,
}

#[derive(Parser, Debug)]
#[command(about = "Stage, commit and push the working tree")]
pub struct PublishArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    #[command(flatten)]
    pub publish: PublishOverrides,
}

#[derive(Parser, Debug)]
#[command(about = "Print one rendered workflow document to stdout")]
pub struct RenderArgs {
    /// Which workflow to render
    #[arg(value_enum)]
    pub document: DocumentKind,

    #[command(flatten)]
    pub repo: RepoArgs,

    #[command(flatten)]
    pub workflows: WorkflowOverrides,

    /// Evaluate `${{ }}` expressions with this context value (e.g. github.ref=refs/heads/main)
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub context: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// The reusable app build workflow
    Build,
    /// The pipeline orchestrator workflow
    Pipeline,
}
