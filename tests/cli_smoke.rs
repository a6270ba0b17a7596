use assert_cmd::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn has_git() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

fn git(dir: &Path, args: &[&str]) {
    assert!(Command::new("git")
        .args(args)
        .current_dir(dir)
        .status()
        .unwrap()
        .success());
}

fn init_git_repo(dir: &Path) {
    git(dir, &["init"]);
    git(dir, &["config", "core.autocrlf", "false"]);
    git(dir, &["config", "user.email", "you@example.com"]);
    git(dir, &["config", "user.name", "Your Name"]);
}

fn commit_files(dir: &Path, author: &str, email: &str, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.sync_all().unwrap();
    }
    git(dir, &["add", "."]);
    let name_cfg = format!("user.name={author}");
    let email_cfg = format!("user.email={email}");
    assert!(Command::new("git")
        .args(["-c", name_cfg.as_str(), "-c", email_cfg.as_str(), "commit", "-m", "edit"])
        .current_dir(dir)
        .status()
        .unwrap()
        .success());
}

fn who(repo: &Path, cache_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("git-who").unwrap();
    cmd.current_dir(repo)
        .env("XDG_CACHE_HOME", cache_home)
        .env_remove("GIT_WHO_DISABLE_CACHE");
    cmd
}

fn csv_lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out)
        .lines()
        .map(|l| l.to_string())
        .collect()
}

#[test]
fn table_ranks_authors_by_lines() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    commit_files(
        repo.path(),
        "bob",
        "bob@mail.com",
        &[
            ("bim.txt", "a\nb\nc\nd\n"),
            ("vim.txt", "1\n2\n3\n4\n5\n6\n7\n8\n"),
            ("nim.txt", "x\ny\n"),
        ],
    );
    commit_files(repo.path(), "jim", "jim@mail.com", &[("jim.txt", "j\nk\nl\n")]);

    let out = who(repo.path(), cache.path())
        .args(["table", "-l", "-e", "--csv"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let lines = csv_lines(&out);
    assert_eq!(
        lines[0],
        "name,email,commits,lines added,lines removed,files,last commit time,first commit time"
    );
    assert!(lines[1].starts_with("bob,bob@mail.com,1,14,0,3,"));
    assert!(lines[2].starts_with("jim,jim@mail.com,1,3,0,1,"));
}

#[test]
fn default_subcommand_is_table() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "hi\n")]);

    let out = who(repo.path(), cache.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("bob"));
}

#[test]
fn pathspecs_limit_the_tally() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    commit_files(
        repo.path(),
        "bob",
        "bob@mail.com",
        &[
            ("a.txt", "1\n2\n"),
            ("vendor/b.txt", "1\n2\n3\n"),
            ("c.md", "1\n"),
        ],
    );

    let out = who(repo.path(), cache.path())
        .args(["table", "-l", "--csv", "--", "*.txt", ":!vendor/"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    // Only a.txt survives the include/exclude pair.
    let lines = csv_lines(&out);
    assert!(lines[1].starts_with("bob,1,2,0,1,"));
}

#[test]
fn merges_flag_counts_merge_commits() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    commit_files(repo.path(), "bob", "bob@mail.com", &[("file.txt", "a\n")]);
    git(repo.path(), &["checkout", "-b", "feat"]);
    commit_files(repo.path(), "bob", "bob@mail.com", &[("feat.txt", "f1\n")]);
    git(repo.path(), &["checkout", "-"]);
    commit_files(repo.path(), "bob", "bob@mail.com", &[("file.txt", "a\nc\n")]);
    git(repo.path(), &["merge", "--no-ff", "feat", "-m", "merge feat"]);

    let commits = |extra: &[&str]| -> usize {
        let mut args = vec!["table", "--csv"];
        args.extend_from_slice(extra);
        let out = who(repo.path(), cache.path())
            .args(&args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let line = csv_lines(&out)[1].clone();
        line.split(',').nth(1).unwrap().parse().unwrap()
    };

    assert_eq!(commits(&[]), 3);
    assert_eq!(commits(&["--merges"]), 4);
}

#[test]
fn tree_shows_paths_and_winners() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    commit_files(
        repo.path(),
        "bob",
        "bob@mail.com",
        &[("foo/bim.txt", "a\nb\n"), ("foo/bar.txt", "c\n")],
    );
    commit_files(repo.path(), "jim", "jim@mail.com", &[("foo/bim.txt", "a\nb\nz\n")]);

    let out = who(repo.path(), cache.path())
        .arg("tree")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("bim.txt"));
    assert!(text.contains("bar.txt"));
    assert!(text.contains("bob"));
}

#[test]
fn hist_draws_buckets() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n")]);

    let out = who(repo.path(), cache.path())
        .arg("hist")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("┤"));
    assert!(text.contains("bob"));
}

#[test]
fn parse_reports_commit_count() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n")]);
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n2\n")]);

    let out = who(repo.path(), cache.path())
        .arg("parse")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert!(String::from_utf8_lossy(&out).contains("Parsed 2 commits."));
}

#[test]
fn cached_rerun_is_identical() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n2\n3\n")]);
    commit_files(repo.path(), "jim", "jim@mail.com", &[("b.txt", "1\n")]);

    let run = || {
        who(repo.path(), cache.path())
            .args(["table", "-l", "--csv"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone()
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);

    // The cache is stored gzipped under XDG_CACHE_HOME.
    let gobs_dir = cache.path().join("git-who").join("gobs");
    let found = walk(&gobs_dir)
        .into_iter()
        .any(|p| p.to_string_lossy().ends_with(".gobs.gz"));
    assert!(found, "expected a compressed cache file under {gobs_dir:?}");
}

#[test]
fn disable_cache_env_skips_the_cache() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n")]);

    who(repo.path(), cache.path())
        .env("GIT_WHO_DISABLE_CACHE", "1")
        .args(["table", "-l", "--csv"])
        .assert()
        .success();

    assert!(!cache.path().join("git-who").exists());
}

#[test]
fn bad_revision_fails_with_context() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());
    commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", "1\n")]);

    let assert = who(repo.path(), cache.path())
        .args(["table", "no-such-thing"])
        .assert()
        .failure()
        .code(1);

    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("error running \"table\""));
}

#[test]
fn rev_ranges_and_path_separator_are_understood() {
    if !has_git() {
        return;
    }
    let repo = tempdir().unwrap();
    let cache = tempdir().unwrap();
    init_git_repo(repo.path());

    for i in 0..4 {
        let content = format!("{i}\n");
        commit_files(repo.path(), "bob", "bob@mail.com", &[("a.txt", content.as_str())]);
    }

    let out = who(repo.path(), cache.path())
        .args(["parse", "HEAD~3.."])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&out).contains("Parsed 3 commits."));

    // A path after -- limits the diffs but not the revisions.
    who(repo.path(), cache.path())
        .args(["table", "HEAD", "--", "a.txt"])
        .assert()
        .success();
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut paths = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                paths.extend(walk(&path));
            } else {
                paths.push(path);
            }
        }
    }
    paths
}
