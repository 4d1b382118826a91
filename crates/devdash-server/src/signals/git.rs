// crates/devdash-server/src/signals/git.rs
// VCS signals via libgit2 (no git subprocess)

use super::{AheadBehind, Signal, SignalSink, WorkingTree};
use chrono::{DateTime, Utc};
use git2::{BranchType, ErrorCode, Repository, Status, StatusOptions};
use std::path::Path;
use tracing::debug;

/// Commits walked between closed-sink checks
const REVWALK_CHECK_EVERY: usize = 1024;

/// Check failure -> Unknown, with the reason logged at debug
fn settle<T>(root: &Path, check: &str, result: Result<T, git2::Error>) -> Signal<T> {
    match result {
        Ok(value) => Signal::Present(value),
        Err(e) => {
            debug!(root = %root.display(), check, error = %e, "git check failed");
            Signal::Unknown
        }
    }
}

/// NotFound means "none configured", anything else is Unknown
fn optional<T>(root: &Path, check: &str, result: Result<T, git2::Error>) -> Signal<Option<T>> {
    match result {
        Err(e) if e.code() == ErrorCode::NotFound => Signal::Present(None),
        other => settle(root, check, other.map(Some)),
    }
}

/// Collect VCS signals. Returns false once the sink closed.
pub fn collect(root: &Path, sink: &SignalSink) -> bool {
    let mut repo = match Repository::open(root) {
        Ok(repo) => repo,
        Err(e) => {
            // only NotFound proves there is no repository here
            let is_repo = if e.code() == ErrorCode::NotFound {
                Signal::Present(false)
            } else {
                debug!(root = %root.display(), error = %e, "Repository could not be opened");
                Signal::Unknown
            };
            return sink.record(|s| {
                s.is_repo = is_repo;
                s.last_commit_at = Signal::Unknown;
                s.branch = Signal::Unknown;
                s.remote_url = Signal::Unknown;
                s.working_tree = Signal::Unknown;
                s.upstream = Signal::Unknown;
                s.branch_count = Signal::Unknown;
                s.stash_count = Signal::Unknown;
                s.commit_count = Signal::Unknown;
            });
        }
    };
    if !sink.record(|s| s.is_repo = Signal::Present(true)) {
        return false;
    }

    let last_commit = settle(root, "head_commit", head_commit_time(&repo));
    let branch = settle(root, "branch", current_branch(&repo));
    if !sink.record(|s| {
        s.last_commit_at = last_commit;
        s.branch = branch;
    }) {
        return false;
    }

    let remote = optional(
        root,
        "origin",
        repo.find_remote("origin")
            .map(|r| r.url().unwrap_or_default().to_string()),
    );
    if !sink.record(|s| s.remote_url = remote) {
        return false;
    }

    let tree = settle(root, "status", working_tree(&repo));
    if !sink.record(|s| s.working_tree = tree) {
        return false;
    }

    let upstream = upstream(root, &repo);
    if !sink.record(|s| s.upstream = upstream) {
        return false;
    }

    let branches = settle(
        root,
        "branches",
        repo.branches(Some(BranchType::Local)).map(|b| b.count()),
    );
    if !sink.record(|s| s.branch_count = branches) {
        return false;
    }

    let stashes = settle(root, "stash", stash_count(&mut repo));
    if !sink.record(|s| s.stash_count = stashes) {
        return false;
    }

    match commit_count(&repo, sink) {
        Some(count) => sink.record(|s| s.commit_count = settle(root, "revwalk", count)),
        None => false,
    }
}

fn head_commit_time(repo: &Repository) -> Result<DateTime<Utc>, git2::Error> {
    let commit = repo.head()?.peel_to_commit()?;
    let seconds = commit.time().seconds();
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| git2::Error::from_str(&format!("commit time out of range: {seconds}")))
}

fn current_branch(repo: &Repository) -> Result<String, git2::Error> {
    if repo.head_detached()? {
        return Ok("detached".to_string());
    }
    let head = repo.head()?;
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| git2::Error::from_str("HEAD name is not UTF-8"))
}

fn working_tree(repo: &Repository) -> Result<WorkingTree, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(false);

    let mut tree = WorkingTree::default();
    for entry in repo.statuses(Some(&mut opts))?.iter() {
        let status = entry.status();
        if status.contains(Status::WT_NEW) {
            tree.untracked += 1;
        }
        if status.intersects(Status::WT_MODIFIED | Status::INDEX_MODIFIED) {
            tree.modified += 1;
        }
        if status.intersects(
            Status::INDEX_NEW | Status::INDEX_MODIFIED | Status::INDEX_RENAMED | Status::INDEX_DELETED,
        ) {
            tree.staged += 1;
        }
    }
    Ok(tree)
}

fn upstream(root: &Path, repo: &Repository) -> Signal<Option<AheadBehind>> {
    if repo.head_detached().unwrap_or(false) {
        return Signal::Present(None);
    }
    let name = match current_branch(repo) {
        Ok(name) => name,
        Err(e) => return settle(root, "upstream", Err(e)),
    };

    let result = repo
        .find_branch(&name, BranchType::Local)
        .and_then(|local| {
            let upstream = local.upstream()?;
            Ok((local.get().target(), upstream.get().target()))
        });
    match result {
        Err(e) if e.code() == ErrorCode::NotFound => Signal::Present(None),
        Err(e) => settle(root, "upstream", Err(e)),
        Ok((Some(local), Some(remote))) => settle(
            root,
            "ahead_behind",
            repo.graph_ahead_behind(local, remote)
                .map(|(ahead, behind)| Some(AheadBehind { ahead, behind })),
        ),
        Ok(_) => Signal::Unknown,
    }
}

fn stash_count(repo: &mut Repository) -> Result<usize, git2::Error> {
    let mut count = 0;
    repo.stash_foreach(|_, _, _| {
        count += 1;
        true
    })?;
    Ok(count)
}

/// None when the sink closed mid-walk
fn commit_count(repo: &Repository, sink: &SignalSink) -> Option<Result<usize, git2::Error>> {
    match repo.is_empty() {
        Ok(true) => return Some(Ok(0)),
        Ok(false) => {}
        Err(e) => return Some(Err(e)),
    }
    let mut walk = match repo.revwalk() {
        Ok(walk) => walk,
        Err(e) => return Some(Err(e)),
    };
    if let Err(e) = walk.push_head() {
        return Some(Err(e));
    }

    let mut count = 0;
    for oid in walk {
        if let Err(e) = oid {
            return Some(Err(e));
        }
        count += 1;
        if count % REVWALK_CHECK_EVERY == 0 && sink.is_closed() {
            return None;
        }
    }
    Some(Ok(count))
}
