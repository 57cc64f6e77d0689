//! Generation of the app build workflow and the pipeline workflow.
use crate::config::Settings;
use crate::expr::{condition_holds, ExprContext};
use crate::templates;
use crate::util::{display_path, write_atomic};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const WORKFLOWS_DIR_REL: &str = ".github/workflows";
pub const PIPELINE_WORKFLOW_FILE: &str = "pipeline.yml";
pub const APP_WORKFLOW_JOBS: [&str; 3] = ["web-governance", "web-sonarcloud", "web-build"];
pub const SUMMARY_JOB: &str = "pipeline-summary";

/// Values substituted into both workflow templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowInputs {
    pub app: String,
    pub directory: String,
    pub project_key: String,
    pub organization: String,
    pub coverage_threshold: u8,
}

impl WorkflowInputs {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            app: settings.app.clone(),
            directory: settings.directory.clone(),
            project_key: settings.project_key()?.to_string(),
            organization: settings.organization.clone(),
            coverage_threshold: settings.coverage_threshold,
        })
    }

    pub fn app_workflow_file(&self) -> String {
        format!("{}.yml", self.app)
    }

    pub fn deploy_job(&self) -> String {
        format!("deploy-staging-{}", self.app)
    }

    fn common_values(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("app", self.app.clone()),
            ("directory", self.directory.clone()),
            ("organization", self.organization.clone()),
            ("coverage_threshold", self.coverage_threshold.to_string()),
        ])
    }
}

/// A rendered document and where it belongs relative to the repository root.
#[derive(Debug, Clone)]
pub struct RenderedWorkflow {
    pub rel_path: String,
    pub text: String,
}

pub fn render_app_workflow(inputs: &WorkflowInputs) -> Result<RenderedWorkflow> {
    let text = templates::render(templates::APP_WORKFLOW_YML, &inputs.common_values())
        .context("render app workflow")?;
    let doc = parse_document(&text).context("parse rendered app workflow")?;
    check_app_workflow(&doc)?;
    Ok(RenderedWorkflow {
        rel_path: format!("{WORKFLOWS_DIR_REL}/{}", inputs.app_workflow_file()),
        text,
    })
}

pub fn render_pipeline_workflow(inputs: &WorkflowInputs) -> Result<RenderedWorkflow> {
    let mut values = inputs.common_values();
    values.insert("project_key", inputs.project_key.clone());
    let text = templates::render(templates::PIPELINE_WORKFLOW_YML, &values)
        .context("render pipeline workflow")?;
    let doc = parse_document(&text).context("parse rendered pipeline workflow")?;
    check_pipeline_workflow(&doc, inputs)?;
    Ok(RenderedWorkflow {
        rel_path: format!("{WORKFLOWS_DIR_REL}/{PIPELINE_WORKFLOW_FILE}"),
        text,
    })
}

/// Render both workflows, then overwrite them under `.github/workflows`.
/// Nothing is written unless both documents render and pass their checks.
pub fn write_workflows(repo_root: &Path, inputs: &WorkflowInputs) -> Result<Vec<PathBuf>> {
    let rendered = [render_app_workflow(inputs)?, render_pipeline_workflow(inputs)?];
    let mut written = Vec::new();
    for workflow in rendered {
        let path = repo_root.join(&workflow.rel_path);
        write_atomic(&path, workflow.text.as_bytes())?;
        tracing::info!(
            path = %display_path(&path, Some(repo_root)),
            bytes = workflow.text.len(),
            "wrote workflow"
        );
        written.push(path);
    }
    Ok(written)
}

pub fn parse_document(text: &str) -> Result<Value> {
    let doc: Value = serde_yaml::from_str(text)?;
    if !doc.is_mapping() {
        return Err(anyhow!("workflow document is not a mapping"));
    }
    Ok(doc)
}

/// Follow a path of mapping keys.
pub fn lookup<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(doc, |node, key| node.get(*key))
}

fn require<'a>(doc: &'a Value, path: &[&str]) -> Result<&'a Value> {
    lookup(doc, path).ok_or_else(|| anyhow!("workflow is missing {}", path.join(".")))
}

fn check_app_workflow(doc: &Value) -> Result<()> {
    let inputs = require(doc, &["on", "workflow_call", "inputs"])?;
    for input in [
        "directory",
        "sonar-project-key",
        "sonar-organization",
        "coverage-threshold",
    ] {
        require(inputs, &[input])?;
    }
    for job in APP_WORKFLOW_JOBS {
        require(doc, &["jobs", job])?;
    }
    Ok(())
}

fn check_pipeline_workflow(doc: &Value, inputs: &WorkflowInputs) -> Result<()> {
    require(doc, &["on", "push"])?;
    require(doc, &["on", "pull_request"])?;
    require(doc, &["concurrency", "group"])?;
    let deploy_job = inputs.deploy_job();
    for job in [inputs.app.as_str(), deploy_job.as_str(), SUMMARY_JOB] {
        require(doc, &["jobs", job])?;
    }
    check_deploy_condition(doc, inputs)?;
    check_summary_condition(doc, inputs)?;
    Ok(())
}

/// Staging deploys happen for pushes to main and develop, nothing else.
fn check_deploy_condition(doc: &Value, inputs: &WorkflowInputs) -> Result<()> {
    let deploy_job = inputs.deploy_job();
    let condition = require(doc, &["jobs", deploy_job.as_str(), "if"])?
        .as_str()
        .ok_or_else(|| anyhow!("{deploy_job}.if is not a string"))?;
    let upstream = format!("needs.{}.result", inputs.app);
    for (git_ref, expected) in [
        ("refs/heads/main", true),
        ("refs/heads/develop", true),
        ("refs/heads/feature/x", false),
        ("refs/tags/v1", false),
    ] {
        let ctx = ExprContext::new()
            .with("github.ref", git_ref)
            .with(&upstream, "success");
        if condition_holds(condition, &ctx)? != expected {
            return Err(anyhow!(
                "{deploy_job} condition {condition:?} gives {} for {git_ref}",
                !expected
            ));
        }
    }
    Ok(())
}

/// The summary must run even when the build failed.
fn check_summary_condition(doc: &Value, inputs: &WorkflowInputs) -> Result<()> {
    let condition = require(doc, &["jobs", SUMMARY_JOB, "if"])?
        .as_str()
        .ok_or_else(|| anyhow!("{SUMMARY_JOB}.if is not a string"))?;
    let ctx = ExprContext::new().with(&format!("needs.{}.result", inputs.app), "failure");
    if !condition_holds(condition, &ctx)? {
        return Err(anyhow!(
            "{SUMMARY_JOB} condition {condition:?} skips the summary after a failed build"
        ));
    }
    Ok(())
}
