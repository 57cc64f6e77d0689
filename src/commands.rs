use crate::cli::{DocumentKind, FlattenArgs, PublishArgs, RenderArgs, RunArgs, WorkflowsArgs};
use crate::config::{self, Overrides, Settings};
use crate::expr::{self, ExprContext};
use crate::flatten::{self, FlattenOutcome};
use crate::git::{self, GitCommand, PublishOptions, PublishOutcome};
use crate::util::display_path;
use crate::workflows::{self, WorkflowInputs};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Machine-readable summary of `reroot run`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub schema_version: u32,
    pub repo_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub flatten: FlattenOutcome,
    pub inputs: WorkflowInputs,
    pub workflows: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOutcome>,
}

pub fn run_all(args: RunArgs) -> Result<()> {
    let settings = config::load_settings(
        &args.repo,
        Overrides {
            subdir: args.subdir.as_deref(),
            overwrite: args.overwrite,
            workflows: Some(&args.workflows),
            publish: Some(&args.publish),
        },
    )?;
    let inputs = WorkflowInputs::from_settings(&settings)?;

    // Fail before touching the tree if the final step cannot run: the
    // repository must be a work tree and the branch to push must be known.
    let publisher = if args.skip_publish {
        None
    } else {
        let git = GitCommand::load()?;
        if !git.is_work_tree(&settings.repo_root) {
            return Err(anyhow!(
                "{} is not inside a git work tree (use --skip-publish to only rewrite files)",
                settings.repo_root.display()
            ));
        }
        let branch = match &settings.branch {
            Some(branch) => branch.clone(),
            None => git.current_branch(&settings.repo_root)?,
        };
        Some((git, branch))
    };

    let flatten = flatten_step(&settings)?;
    let written = workflows::write_workflows(&settings.repo_root, &inputs)?;
    let publish = match publisher {
        Some((git, branch)) => Some(publish_step(&git, &settings, Some(branch))?),
        None => None,
    };

    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        repo_root: settings.repo_root.display().to_string(),
        config_path: settings
            .config_path
            .as_ref()
            .map(|path| path.display().to_string()),
        flatten,
        inputs,
        workflows: written
            .iter()
            .map(|path| display_path(path, Some(settings.repo_root.as_path())))
            .collect(),
        publish,
    };
    if args.json {
        let text = serde_json::to_string_pretty(&report).context("serialize run report")?;
        println!("{text}");
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn run_flatten(args: FlattenArgs) -> Result<()> {
    let settings = config::load_settings(
        &args.repo,
        Overrides {
            subdir: args.subdir.as_deref(),
            overwrite: args.overwrite,
            ..Default::default()
        },
    )?;
    let outcome = flatten_step(&settings)?;
    print_flatten(&outcome);
    Ok(())
}

pub fn run_workflows(args: WorkflowsArgs) -> Result<()> {
    let settings = config::load_settings(
        &args.repo,
        Overrides {
            workflows: Some(&args.workflows),
            ..Default::default()
        },
    )?;
    let inputs = WorkflowInputs::from_settings(&settings)?;
    for path in workflows::write_workflows(&settings.repo_root, &inputs)? {
        println!("wrote {}", display_path(&path, Some(settings.repo_root.as_path())));
    }
    Ok(())
}

pub fn run_publish(args: PublishArgs) -> Result<()> {
    let settings = config::load_settings(
        &args.repo,
        Overrides {
            publish: Some(&args.publish),
            ..Default::default()
        },
    )?;
    let git = GitCommand::load()?;
    let outcome = publish_step(&git, &settings, None)?;
    print_publish(&outcome);
    Ok(())
}

pub fn run_render(args: RenderArgs) -> Result<()> {
    let settings = config::load_settings(
        &args.repo,
        Overrides {
            workflows: Some(&args.workflows),
            ..Default::default()
        },
    )?;
    let inputs = WorkflowInputs::from_settings(&settings)?;
    let rendered = match args.document {
        DocumentKind::Build => workflows::render_app_workflow(&inputs)?,
        DocumentKind::Pipeline => workflows::render_pipeline_workflow(&inputs)?,
    };
    if args.context.is_empty() {
        print!("{}", rendered.text);
    } else {
        let ctx = parse_context(&args.context)?;
        print!("{}", expr::expand(&rendered.text, &ctx)?);
    }
    Ok(())
}

fn parse_context(pairs: &[String]) -> Result<ExprContext> {
    let mut ctx = ExprContext::new();
    for pair in pairs {
        let (path, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects PATH=VALUE, got {pair:?}"))?;
        if path.trim().is_empty() {
            return Err(anyhow!("--set expects PATH=VALUE, got {pair:?}"));
        }
        ctx = ctx.with(path.trim(), value);
    }
    Ok(ctx)
}

fn flatten_step(settings: &Settings) -> Result<FlattenOutcome> {
    flatten::flatten_subdir(&settings.repo_root, &settings.subdir, settings.overwrite)
        .with_context(|| format!("flatten {}", settings.subdir))
}

/// `branch` is the branch resolved up front by `run`; otherwise the
/// configured branch, then the current one, is used.
fn publish_step(
    git: &GitCommand,
    settings: &Settings,
    branch: Option<String>,
) -> Result<PublishOutcome> {
    let options = PublishOptions {
        remote: settings.remote.clone(),
        branch: branch.or_else(|| settings.branch.clone()),
        message: settings.message.clone(),
        push: settings.push,
    };
    git::publish(git, &settings.repo_root, &options).context("publish changes")
}

fn print_report(report: &RunReport) {
    print_flatten(&report.flatten);
    for path in &report.workflows {
        println!("wrote {path}");
    }
    if let Some(publish) = &report.publish {
        print_publish(publish);
    }
}

fn print_flatten(outcome: &FlattenOutcome) {
    match outcome {
        FlattenOutcome::Skipped { subdir } => {
            println!("{subdir}/ not found; skipping move");
        }
        FlattenOutcome::Flattened { subdir, .. } => {
            println!(
                "moved {} entries from {subdir}/ to the repository root",
                outcome.moved().len()
            );
            if !outcome.replaced().is_empty() {
                println!("replaced at the root: {}", outcome.replaced().join(", "));
            }
        }
    }
}

fn print_publish(outcome: &PublishOutcome) {
    match &outcome.commit {
        Some(commit) => println!("committed {} on {}", short_sha(commit), outcome.branch),
        None => println!("nothing to commit on {}", outcome.branch),
    }
    if let Some(remote) = &outcome.remote {
        println!("pushed {} to {remote}", outcome.branch);
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}
