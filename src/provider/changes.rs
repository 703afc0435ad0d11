//! Change analysis against a base branch, via libgit2.

use std::path::Path;

use git2::{Delta, DiffFormat, DiffStatsFormat, Repository};
use serde::Serialize;

use super::tools::AnalyzeArgs;
use crate::core::output::bound_lines;
use crate::mcp::protocol::CallToolResult;

const DIFF_OMITTED: &str = "Diff not included (set include_diff=true to see full diff)";

/// Result of `analyze_file_changes`.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeAnalysis {
    pub base_branch: String,
    /// `<status>\t<path>` per changed file
    pub files_changed: String,
    pub statistics: String,
    /// `<short id> <summary>` per commit on HEAD and not on the base
    pub commits: String,
    pub diff: String,
    pub truncated: bool,
    pub total_diff_lines: usize,
}

/// Run the analysis; git failures come back as `{"error": ...}` error results.
pub fn analyze_file_changes(repo_path: &Path, args: &AnalyzeArgs) -> CallToolResult {
    let analysis = match analyze(repo_path, args) {
        Ok(analysis) => analysis,
        Err(e) => {
            tracing::debug!(repo = %repo_path.display(), error = %e, "Change analysis failed");
            return error_result(format!("Git error: {}", e.message()));
        }
    };

    match serde_json::to_string_pretty(&analysis) {
        Ok(text) => CallToolResult::text(text),
        Err(e) => error_result(e.to_string()),
    }
}

fn error_result(message: String) -> CallToolResult {
    CallToolResult::error(serde_json::json!({ "error": message }).to_string())
}

pub fn analyze(repo_path: &Path, args: &AnalyzeArgs) -> Result<ChangeAnalysis, git2::Error> {
    let repo = Repository::discover(repo_path)?;
    let head = repo.head()?.peel_to_commit()?;
    let base = repo.revparse_single(&args.base_branch)?.peel_to_commit()?;
    let merge_base = repo.merge_base(base.id(), head.id())?;

    let base_tree = repo.find_commit(merge_base)?.tree()?;
    let head_tree = head.tree()?;
    let diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;

    let mut files_changed = String::new();
    for delta in diff.deltas() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        files_changed.push_str(&format!("{}\t{}\n", status_letter(delta.status()), path));
    }

    let statistics = diff
        .stats()?
        .to_buf(DiffStatsFormat::FULL, 80)?
        .as_str()
        .unwrap_or_default()
        .to_string();

    let mut commits = String::new();
    let mut walk = repo.revwalk()?;
    walk.push(head.id())?;
    walk.hide(base.id())?;
    for oid in walk {
        let oid = oid?;
        let commit = repo.find_commit(oid)?;
        let id = oid.to_string();
        commits.push_str(&format!("{} {}\n", &id[..7], commit.summary().unwrap_or_default()));
    }

    let (diff_text, truncated, total_diff_lines) = if args.include_diff {
        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;

        let patch = patch.strip_suffix('\n').unwrap_or(&patch);
        let bounded = bound_lines(patch, args.max_diff_lines);
        (bounded.text, bounded.truncated, bounded.total)
    } else {
        (DIFF_OMITTED.to_string(), false, 0)
    };

    Ok(ChangeAnalysis {
        base_branch: args.base_branch.clone(),
        files_changed,
        statistics,
        commits,
        diff: diff_text,
        truncated,
        total_diff_lines,
    })
}

fn status_letter(status: Delta) -> char {
    match status {
        Delta::Added => 'A',
        Delta::Deleted => 'D',
        Delta::Modified => 'M',
        Delta::Renamed => 'R',
        Delta::Copied => 'C',
        Delta::Typechange => 'T',
        Delta::Untracked => '?',
        Delta::Conflicted => 'U',
        _ => 'X',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, IndexAddOption, RepositoryInitOptions, Signature};
    use tempfile::TempDir;

    fn commit(repo: &Repository, files: &[(&str, String)], message: &str) {
        let workdir = repo.workdir().unwrap().to_path_buf();
        for (path, content) in files {
            std::fs::write(workdir.join(path), content).unwrap();
        }

        let mut index = repo.index().unwrap();
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let sig = Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit> =
            repo.head().ok().and_then(|h| h.peel_to_commit().ok()).into_iter().collect();
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs).unwrap();
    }

    /// `main` with one file, `feature` checked out with two more commits.
    fn setup_repo() -> TempDir {
        let temp = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(temp.path(), &opts).unwrap();

        commit(&repo, &[("a.txt", "one\n".to_string())], "Initial commit");

        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("feature", &head, false).unwrap();
        repo.set_head("refs/heads/feature").unwrap();

        commit(&repo, &[("a.txt", "one\ntwo\n".to_string())], "Extend a");
        let big: String = (0..60).map(|i| format!("line {}\n", i)).collect();
        commit(&repo, &[("b.txt", big)], "Add b");

        temp
    }

    #[test]
    fn test_analysis_against_main() {
        let temp = setup_repo();
        let args = AnalyzeArgs { max_diff_lines: 20, ..AnalyzeArgs::default() };
        let analysis = analyze(temp.path(), &args).unwrap();

        assert_eq!(analysis.base_branch, "main");
        assert!(analysis.files_changed.contains("M\ta.txt"));
        assert!(analysis.files_changed.contains("A\tb.txt"));
        assert!(analysis.commits.contains("Extend a"));
        assert!(analysis.commits.contains("Add b"));
        assert!(!analysis.commits.contains("Initial commit"));
        assert!(analysis.truncated);
        assert!(analysis.total_diff_lines > 60);
        assert!(analysis.diff.contains("... Output truncated. Showing 20 of"));
        assert_eq!(analysis.diff.lines().count(), 21);
    }

    #[test]
    fn test_diff_at_exact_budget_is_untouched() {
        let temp = setup_repo();
        let full = analyze(temp.path(), &AnalyzeArgs { max_diff_lines: 10_000, ..AnalyzeArgs::default() })
            .unwrap();
        assert!(!full.truncated);
        assert!(!full.diff.ends_with('\n'));
        assert_eq!(full.total_diff_lines, full.diff.lines().count());

        let args = AnalyzeArgs { max_diff_lines: full.total_diff_lines, ..AnalyzeArgs::default() };
        let exact = analyze(temp.path(), &args).unwrap();
        assert!(!exact.truncated);
        assert_eq!(exact.diff, full.diff);
        assert_eq!(exact.total_diff_lines, full.total_diff_lines);
    }

    #[test]
    fn test_analysis_without_diff() {
        let temp = setup_repo();
        let args = AnalyzeArgs { include_diff: false, ..AnalyzeArgs::default() };
        let analysis = analyze(temp.path(), &args).unwrap();
        assert_eq!(analysis.diff, DIFF_OMITTED);
        assert_eq!(analysis.total_diff_lines, 0);
        assert!(!analysis.truncated);
    }

    #[test]
    fn test_unknown_base_branch_is_error_result() {
        let temp = setup_repo();
        let args = AnalyzeArgs { base_branch: "release".to_string(), ..AnalyzeArgs::default() };
        let result = analyze_file_changes(temp.path(), &args);
        assert!(result.is_error());
        let body: serde_json::Value = serde_json::from_str(result.first_text()).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Git error:"));
    }
}
