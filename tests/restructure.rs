//! End-to-end runs of the `reroot` binary against scratch repositories.

mod common;

use common::{find_in_path, git, stderr, stdout, write, RepoFixture};

#[test]
fn flatten_moves_dotfiles_and_is_idempotent() {
    let fixture = RepoFixture::new();

    let first = fixture.reroot(&["flatten"]);
    assert!(first.status.success(), "{}", stderr(&first));
    assert!(stdout(&first).contains("moved 4 entries from campusone-web/"));
    assert!(!fixture.root.join("campusone-web").exists());
    for rel in ["package.json", ".nvmrc", ".env.example", "src/main.ts", "README.md"] {
        assert!(fixture.root.join(rel).exists(), "{rel} missing after flatten");
    }

    let second = fixture.reroot(&["flatten"]);
    assert!(second.status.success(), "{}", stderr(&second));
    assert!(stdout(&second).contains("campusone-web/ not found; skipping move"));
}

#[test]
fn flatten_refuses_to_overwrite_root_files() {
    let fixture = RepoFixture::new();
    write(&fixture.root, "package.json", "{\"name\": \"root\"}\n");

    let output = fixture.reroot(&["flatten"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("package.json: already exists at the root"));
    assert!(fixture.root.join("campusone-web/.nvmrc").is_file());
    assert!(!fixture.root.join(".nvmrc").exists());
}

#[test]
fn flatten_overwrite_replaces_shared_dotfiles() {
    let fixture = RepoFixture::new();
    write(&fixture.root, ".gitignore", "target/\n");
    write(&fixture.root, "campusone-web/.gitignore", "node_modules/\ndist/\n");

    let refused = fixture.reroot(&["flatten"]);
    assert!(!refused.status.success());
    assert!(stderr(&refused).contains(".gitignore: already exists at the root"));

    let output = fixture.reroot(&["flatten", "--overwrite"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("moved 5 entries from campusone-web/"));
    assert!(stdout(&output).contains("replaced at the root: .gitignore"));
    assert_eq!(fixture.read(".gitignore"), "node_modules/\ndist/\n");
    assert!(!fixture.root.join("campusone-web").exists());
}

#[test]
fn workflows_require_a_project_key() {
    let fixture = RepoFixture::new();
    let output = fixture.reroot(&["workflows"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("project key missing"));
    assert!(!fixture.root.join(".github").exists());
}

#[test]
fn workflows_use_repository_config() {
    let fixture = RepoFixture::new();
    write(
        &fixture.root,
        ".reroot.json",
        r#"{"schema_version": 1, "project_key": "campusone_web", "coverage_threshold": 90}"#,
    );

    let output = fixture.reroot(&["workflows"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("wrote .github/workflows/campusone-web.yml"));
    assert!(stdout(&output).contains("wrote .github/workflows/pipeline.yml"));

    let app = fixture.read(".github/workflows/campusone-web.yml");
    assert!(app.contains("default: 90"));
    let pipeline = fixture.read(".github/workflows/pipeline.yml");
    assert!(pipeline.contains("sonar-project-key: \"campusone_web\""));
    assert!(pipeline.contains("deploy-staging-campusone-web:"));
}

#[test]
fn render_prints_without_touching_the_tree() {
    let fixture = RepoFixture::new();
    let output = fixture.reroot(&[
        "render",
        "pipeline",
        "--project-key",
        "campusone_web",
        "--set",
        "needs.campusone-web.result=failure",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("echo \"campusone-web: failure\""));
    assert!(text.contains("if [ \"failure\" = \"failure\" ]"));
    assert!(!fixture.root.join(".github").exists());
    assert!(fixture.root.join("campusone-web").is_dir());
}

#[test]
fn run_without_git_requires_skip_publish() {
    let fixture = RepoFixture::new();
    if find_in_path("git").is_none() {
        return;
    }
    let refused = fixture.reroot(&["run", "--project-key", "campusone_web"]);
    // The scratch dir may live inside another checkout; only the plain case
    // is deterministic.
    if refused.status.success() {
        return;
    }
    assert!(stderr(&refused).contains("--skip-publish"));
    assert!(fixture.root.join("campusone-web").is_dir());

    let output = fixture.reroot(&[
        "run",
        "--project-key",
        "campusone_web",
        "--skip-publish",
        "--json",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["flatten"]["status"], "flattened");
    assert_eq!(report["workflows"].as_array().map(Vec::len), Some(2));
    assert!(report.get("publish").is_none());
}

#[test]
fn run_commits_and_pushes_the_restructuring() {
    if find_in_path("git").is_none() {
        return;
    }
    let fixture = RepoFixture::new();
    fixture.init_git();

    let output = fixture.reroot(&["run", "--project-key", "campusone_web", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("report json");
    assert_eq!(report["publish"]["branch"], "main");
    assert_eq!(report["publish"]["committed"], true);
    assert_eq!(report["publish"]["pushed"], true);

    let subject = git(&fixture.root, &["log", "-1", "--format=%s"]);
    assert_eq!(
        subject,
        "Move campusone-web to repository root and regenerate workflows"
    );
    let remote_head = git(&fixture.remote, &["rev-parse", "refs/heads/main"]);
    assert_eq!(report["publish"]["commit"], remote_head.as_str());
    let tracked = git(&fixture.root, &["ls-files"]);
    assert!(tracked.lines().any(|line| line == ".nvmrc"));
    assert!(tracked.lines().any(|line| line == ".github/workflows/pipeline.yml"));
    assert!(!tracked.lines().any(|line| line.starts_with("campusone-web/")));

    // A second run finds nothing to move and nothing new to commit.
    let again = fixture.reroot(&["run", "--project-key", "campusone_web", "--json"]);
    assert!(again.status.success(), "{}", stderr(&again));
    let report: serde_json::Value = serde_json::from_slice(&again.stdout).expect("report json");
    assert_eq!(report["flatten"]["status"], "skipped");
    assert_eq!(report["publish"]["committed"], false);
}

#[test]
fn run_reports_push_failures() {
    if find_in_path("git").is_none() {
        return;
    }
    let fixture = RepoFixture::new();
    fixture.init_git();
    git(&fixture.root, &["remote", "remove", "origin"]);

    let output = fixture.reroot(&["run", "--project-key", "campusone_web"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("git push"));
    // The commit itself happened; only the push failed.
    let subject = git(&fixture.root, &["log", "-1", "--format=%s"]);
    assert!(subject.starts_with("Move campusone-web"));
}

#[test]
fn run_refuses_detached_head_before_changing_the_tree() {
    if find_in_path("git").is_none() {
        return;
    }
    let fixture = RepoFixture::new();
    fixture.init_git();
    git(&fixture.root, &["checkout", "--quiet", "--detach"]);

    let output = fixture.reroot(&["run", "--project-key", "campusone_web"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("HEAD is detached"));
    assert!(fixture.root.join("campusone-web").is_dir());
    assert!(!fixture.root.join(".github").exists());
}

#[test]
fn run_rejects_option_like_remote() {
    let fixture = RepoFixture::new();
    let output = fixture.reroot(&[
        "run",
        "--project-key",
        "campusone_web",
        "--remote=--force",
    ]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("must not start with '-'"));
    assert!(fixture.root.join("campusone-web").is_dir());
}
