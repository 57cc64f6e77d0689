//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Command prefix that lets commits succeed without a global git identity.
pub const TEST_GIT: &str =
    "git -c user.name=Reroot -c user.email=reroot@example.com -c commit.gpgsign=false";

pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// A scratch repository laid out the way the restructuring expects: the web
/// app nested under `campusone-web/` and a bare remote next to it.
pub struct RepoFixture {
    _tmp: TempDir,
    pub root: PathBuf,
    pub remote: PathBuf,
}

impl RepoFixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().join("repo");
        let remote = tmp.path().join("remote.git");
        fs::create_dir_all(&root).expect("create repo root");
        write(&root, "README.md", "# campusone\n");
        write(&root, "campusone-web/package.json", "{\"name\": \"campusone-web\"}\n");
        write(&root, "campusone-web/.nvmrc", "20\n");
        write(&root, "campusone-web/.env.example", "API_URL=\n");
        write(&root, "campusone-web/src/main.ts", "export {};\n");
        Self {
            _tmp: tmp,
            root,
            remote,
        }
    }

    /// Initialise git on `main`, commit the starting layout and wire up the
    /// bare remote as `origin`.
    pub fn init_git(&self) {
        git(self.root.parent().expect("repo parent"), &["init", "--quiet", "--bare", "remote.git"]);
        git(&self.root, &["init", "--quiet"]);
        git(&self.root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&self.root, &["add", "-A"]);
        git(&self.root, &["commit", "--quiet", "-m", "initial layout"]);
        git(
            &self.root,
            &["remote", "add", "origin", &self.remote.display().to_string()],
        );
    }

    pub fn reroot(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_reroot"))
            .args(args)
            .arg("--repo")
            .arg(&self.root)
            .env("REROOT_GIT", TEST_GIT)
            .env_remove("RUST_LOG")
            .output()
            .expect("run reroot")
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap_or_else(|err| panic!("read {rel}: {err}"))
    }
}

pub fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
    fs::write(path, contents).expect("write fixture file");
}

pub fn git(cwd: &Path, args: &[&str]) -> String {
    let mut words = TEST_GIT.split_whitespace();
    let program = words.next().expect("git program");
    let output = Command::new(program)
        .args(words)
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
