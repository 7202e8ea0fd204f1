use std::path::{Component, Path};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::repo::{Repo, REPO_DIR_NAME};

/// `.hitignore` matcher. Rules follow gitignore semantics: `#` comments,
/// blank lines skipped, `!` negation, trailing `/` for directories, leading
/// `/` anchored to the repo root, `*` within a segment, `**` across segments,
/// later rules overriding earlier ones. The `.hit` tree is always ignored.
pub struct HitIgnore {
    gitignore: Gitignore,
}

impl HitIgnore {
    pub fn load(repo: &Repo) -> anyhow::Result<Self> {
        let mut builder = GitignoreBuilder::new(repo.worktree());
        // add() returns None when the file is absent; an empty matcher is fine.
        builder.add(repo.ignore_path());
        let gitignore = builder.build()?;
        Ok(Self { gitignore })
    }

    /// `rel` is a repo-relative path with forward slashes.
    pub fn is_ignored(&self, rel: &str, is_dir: bool) -> bool {
        if contains_repo_dir(Path::new(rel)) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(rel, is_dir)
            .is_ignore()
    }
}

fn contains_repo_dir(path: &Path) -> bool {
    path.components().any(|component| {
        matches!(component, Component::Normal(name) if name == REPO_DIR_NAME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn matcher_with(rules: &str) -> (tempfile::TempDir, HitIgnore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        fs::write(temp.path().join(".hitignore"), rules).expect("write rules");
        let matcher = HitIgnore::load(&repo).expect("load");
        (temp, matcher)
    }

    #[test]
    fn repo_dir_always_ignored() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo = Repo::init(temp.path()).expect("init");
        let matcher = HitIgnore::load(&repo).expect("load");
        assert!(matcher.is_ignored(".hit", true));
        assert!(matcher.is_ignored(".hit/objects/ab/cdef", false));
        assert!(!matcher.is_ignored("src/main.rs", false));
    }

    #[test]
    fn patterns_and_negation() {
        let (_temp, matcher) = matcher_with("*.log\n!keep.log\nbuild/\n");
        assert!(matcher.is_ignored("debug.log", false));
        assert!(matcher.is_ignored("nested/deep.log", false));
        assert!(!matcher.is_ignored("keep.log", false));
        assert!(matcher.is_ignored("build", true));
        assert!(!matcher.is_ignored("build.rs", false));
    }

    #[test]
    fn anchored_and_recursive_globs() {
        let (_temp, matcher) = matcher_with("/top.txt\ndocs/**/draft.md\n");
        assert!(matcher.is_ignored("top.txt", false));
        assert!(!matcher.is_ignored("sub/top.txt", false));
        assert!(matcher.is_ignored("docs/a/b/draft.md", false));
    }

    #[test]
    fn matching_is_pure() {
        let (_temp, matcher) = matcher_with("*.tmp\n");
        for _ in 0..3 {
            assert!(matcher.is_ignored("x.tmp", false));
            assert!(!matcher.is_ignored("x.rs", false));
        }
    }

    #[test]
    fn duplicate_rule_changes_nothing() {
        let (_t1, once) = matcher_with("*.tmp\n");
        let (_t2, twice) = matcher_with("*.tmp\n*.tmp\n");
        for (path, is_dir) in [("a.tmp", false), ("b/a.tmp", false), ("a.rs", false)] {
            assert_eq!(once.is_ignored(path, is_dir), twice.is_ignored(path, is_dir));
        }
    }
}
