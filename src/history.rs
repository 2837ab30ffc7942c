//! Version-control boundary
//!
//! Evidence consumes exactly two operations: `blame` over a line range and a
//! per-file `log`. They are modeled as an injected capability so the scorer
//! is testable without a real history store. [`GitHistory`] shells into
//! libgit2; [`MemoryHistory`] is the in-memory fake used by tests.

use anyhow::{Context, Result};
use git2::{BlameOptions, DiffOptions, Repository, Sort};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One blame hunk attributed to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameHunk {
    pub sha: String,
    pub author_email: String,
    /// Commit time, epoch seconds.
    pub epoch: i64,
}

/// One commit from a file's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sha: String,
    pub author_email: String,
    pub epoch: i64,
    pub message: String,
}

/// Injected version-control capability.
pub trait History: Send + Sync {
    /// Blame a 1-based inclusive line range of a file at HEAD.
    fn blame(&self, path: &str, start: u32, end: u32) -> Result<Vec<BlameHunk>>;

    /// Commits touching a file, newest first, optionally bounded below by an
    /// epoch timestamp.
    fn log(&self, path: &str, since: Option<i64>) -> Result<Vec<LogEntry>>;

    /// HEAD commit SHA, when the backing store has one.
    fn head_commit(&self) -> Option<String> {
        None
    }

    /// Current branch name, when the backing store has one.
    fn branch(&self) -> Option<String> {
        None
    }
}

/// Cap on commits walked per file log.
const MAX_LOG_COMMITS: usize = 500;

/// libgit2-backed history. Opens the repository per call so the type stays
/// `Send + Sync` and can be shared across scan workers.
pub struct GitHistory {
    repo_path: PathBuf,
}

impl GitHistory {
    pub fn open(path: &Path) -> Result<Self> {
        // Fail early if there is no repository at all.
        Repository::discover(path)
            .with_context(|| format!("failed to open git repository at {:?}", path))?;
        Ok(Self {
            repo_path: path.to_path_buf(),
        })
    }

    pub fn is_repo(path: &Path) -> bool {
        Repository::discover(path).is_ok()
    }

    fn repo(&self) -> Result<Repository> {
        Repository::discover(&self.repo_path)
            .with_context(|| format!("failed to open git repository at {:?}", self.repo_path))
    }
}

impl History for GitHistory {
    fn blame(&self, path: &str, start: u32, end: u32) -> Result<Vec<BlameHunk>> {
        if start == 0 || end < start {
            return Ok(vec![]);
        }
        let repo = self.repo()?;

        let mut opts = BlameOptions::new();
        opts.min_line(start as usize);
        opts.max_line(end as usize);

        let blame = repo
            .blame_file(Path::new(path), Some(&mut opts))
            .with_context(|| format!("failed to blame {}:{}-{}", path, start, end))?;

        let mut hunks = Vec::new();
        for hunk in blame.iter() {
            let commit_id = hunk.final_commit_id();
            let sig = hunk.final_signature();
            let epoch = repo
                .find_commit(commit_id)
                .map(|c| c.time().seconds())
                .unwrap_or(0);
            hunks.push(BlameHunk {
                sha: commit_id.to_string(),
                author_email: sig.email().unwrap_or("").to_string(),
                epoch,
            });
        }
        Ok(hunks)
    }

    fn log(&self, path: &str, since: Option<i64>) -> Result<Vec<LogEntry>> {
        let repo = self.repo()?;
        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME)?;
        revwalk.push_head()?;

        let mut entries = Vec::new();
        for oid_result in revwalk.take(MAX_LOG_COMMITS) {
            let oid = oid_result?;
            let commit = repo.find_commit(oid)?;
            let epoch = commit.time().seconds();

            // Commits are time-sorted, so everything past the bound is older.
            if since.is_some_and(|bound| epoch < bound) {
                break;
            }

            let tree = commit.tree()?;
            let parent_tree = commit.parent(0).ok().map(|p| p.tree()).transpose()?;

            let mut diff_opts = DiffOptions::new();
            diff_opts.pathspec(path);
            let diff =
                repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;
            if diff.deltas().len() == 0 {
                continue;
            }

            entries.push(LogEntry {
                sha: oid.to_string(),
                author_email: commit.author().email().unwrap_or("").to_string(),
                epoch,
                message: commit.message().unwrap_or("").to_string(),
            });
        }
        Ok(entries)
    }

    fn head_commit(&self) -> Option<String> {
        let repo = self.repo().ok()?;
        let head = repo.head().ok()?;
        head.target().map(|oid| oid.to_string())
    }

    fn branch(&self) -> Option<String> {
        let repo = self.repo().ok()?;
        let head = repo.head().ok()?;
        head.shorthand().map(str::to_string)
    }
}

/// In-memory history fake for tests and for `--no-history` runs.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    blame: HashMap<String, Vec<BlameHunk>>,
    log: HashMap<String, Vec<LogEntry>>,
    head: Option<String>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_head(mut self, sha: &str) -> Self {
        self.head = Some(sha.to_string());
        self
    }

    pub fn add_blame(&mut self, path: &str, hunk: BlameHunk) {
        self.blame.entry(path.to_string()).or_default().push(hunk);
    }

    pub fn add_log(&mut self, path: &str, entry: LogEntry) {
        self.log.entry(path.to_string()).or_default().push(entry);
    }
}

impl History for MemoryHistory {
    fn blame(&self, path: &str, _start: u32, _end: u32) -> Result<Vec<BlameHunk>> {
        Ok(self.blame.get(path).cloned().unwrap_or_default())
    }

    fn log(&self, path: &str, since: Option<i64>) -> Result<Vec<LogEntry>> {
        let mut entries = self.log.get(path).cloned().unwrap_or_default();
        if let Some(bound) = since {
            entries.retain(|e| e.epoch >= bound);
        }
        entries.sort_by(|a, b| b.epoch.cmp(&a.epoch));
        Ok(entries)
    }

    fn head_commit(&self) -> Option<String> {
        self.head.clone()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_git_blame_and_log() -> Result<()> {
        let dir = tempdir()?;
        test_repo::init_with_file(dir.path(), "src/a.ts", "line 1\nline 2\nline 3\n")?;

        let history = GitHistory::open(dir.path())?;

        let hunks = history.blame("src/a.ts", 1, 3)?;
        assert!(!hunks.is_empty());
        assert_eq!(hunks[0].author_email, "test@example.com");

        let log = history.log("src/a.ts", None)?;
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("initial commit"));

        assert!(history.head_commit().is_some());
        Ok(())
    }

    #[test]
    fn test_git_log_filters_other_paths() -> Result<()> {
        let dir = tempdir()?;
        let repo = test_repo::init_with_file(dir.path(), "src/a.ts", "const a = 1;\n")?;
        std::fs::write(dir.path().join("src/b.ts"), "const b = 2;\n")?;
        test_repo::commit_all(&repo, "add b")?;

        let history = GitHistory::open(dir.path())?;
        let log = history.log("src/a.ts", None)?;
        assert_eq!(log.len(), 1);
        let log = history.log("src/b.ts", None)?;
        assert_eq!(log.len(), 1);
        assert!(log[0].message.contains("add b"));
        Ok(())
    }

    #[test]
    fn test_open_fails_outside_repo() {
        let dir = tempdir().unwrap();
        assert!(GitHistory::open(dir.path()).is_err());
        assert!(!GitHistory::is_repo(dir.path()));
    }

    #[test]
    fn test_memory_history_log_window() -> Result<()> {
        let mut history = MemoryHistory::new();
        history.add_log(
            "src/a.ts",
            LogEntry {
                sha: "aaa".into(),
                author_email: "one@x.dev".into(),
                epoch: 100,
                message: "old".into(),
            },
        );
        history.add_log(
            "src/a.ts",
            LogEntry {
                sha: "bbb".into(),
                author_email: "two@x.dev".into(),
                epoch: 900,
                message: "new".into(),
            },
        );

        let all = history.log("src/a.ts", None)?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sha, "bbb");

        let recent = history.log("src/a.ts", Some(500))?;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sha, "bbb");
        Ok(())
    }
}
