use crate::config::Config;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

/// Author and last-modified timestamp for one file, as reported by git.
/// Both are optional: missing git, untracked files, and timeouts all
/// degrade to nulls rather than failing the index pass.
#[derive(Debug, Clone, Default)]
pub struct GitInfo {
    pub author: Option<String>,
    pub last_modified: Option<String>,
}

async fn run_git(repo_root: &Path, args: &[&str], budget: Duration) -> Option<String> {
    let child = Command::new("git")
        .args(args)
        .current_dir(repo_root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;
    let output = tokio::time::timeout(budget, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

pub async fn is_git_repo(repo_root: &Path) -> bool {
    run_git(
        repo_root,
        &["rev-parse", "--is-inside-work-tree"],
        Duration::from_secs(5),
    )
    .await
    .as_deref()
        == Some("true")
}

pub async fn active_branch(repo_root: &Path) -> Option<String> {
    run_git(
        repo_root,
        &["rev-parse", "--abbrev-ref", "HEAD"],
        Duration::from_secs(5),
    )
    .await
}

pub async fn file_git_info(repo_root: &Path, rel_path: &str) -> GitInfo {
    let budget = Duration::from_secs(Config::get().git_timeout_secs);
    let Some(line) = run_git(
        repo_root,
        &["log", "-1", "--format=%an|%aI", "--", rel_path],
        budget,
    )
    .await
    else {
        return GitInfo::default();
    };
    match line.split_once('|') {
        Some((author, modified)) => GitInfo {
            author: Some(author.trim().to_string()),
            last_modified: Some(modified.trim().to_string()),
        },
        None => GitInfo::default(),
    }
}

/// Fetch git metadata for many files, bounded by the git concurrency gate.
/// Returns an entry for every input path; untracked paths map to nulls.
pub async fn batch_git_info(
    repo_root: &Path,
    rel_paths: &[String],
) -> HashMap<String, GitInfo> {
    let mut out: HashMap<String, GitInfo> = HashMap::new();
    if rel_paths.is_empty() {
        return out;
    }
    if !is_git_repo(repo_root).await {
        for path in rel_paths {
            out.insert(path.clone(), GitInfo::default());
        }
        return out;
    }

    let gate = Arc::new(Semaphore::new(Config::get().git_concurrency.max(1)));
    let mut tasks = tokio::task::JoinSet::new();
    for path in rel_paths {
        let gate = Arc::clone(&gate);
        let repo_root = repo_root.to_path_buf();
        let path = path.clone();
        tasks.spawn(async move {
            let _permit = gate.acquire_owned().await;
            let info = file_git_info(&repo_root, &path).await;
            (path, info)
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Ok((path, info)) = joined {
            out.insert(path, info);
        }
    }
    debug!(files = out.len(), "git metadata fetched");
    out
}
