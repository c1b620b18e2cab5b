use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Stable, user-visible repository identifier.
///
/// Records are correlated across generations by this declared name, never by
/// backend type, so two repositories of the same kind (e.g. two PPAs) keep
/// distinct package sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoId(String);

impl RepoId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepoId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Packages requested from each repository, keyed by repository identity.
///
/// Packages stay partitioned by repository throughout the pipeline because
/// each repository has its own install/remove/validate command syntax;
/// flattening happens only for display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    entries: BTreeMap<RepoId, BTreeSet<String>>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `names` into the repository's set, creating the entry if absent.
    /// An empty `names` is a no-op: iteration never yields a repository with
    /// nothing requested, so a repository absent from the set and one with an
    /// empty list diff identically.
    pub fn add<I, S>(&mut self, repo: &RepoId, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = names.into_iter().peekable();
        if names.peek().is_none() {
            return;
        }
        let set = self.entries.entry(repo.clone()).or_default();
        for name in names {
            set.insert(name.into());
        }
    }

    /// Remove `names` from the repository's set; empty entries are dropped so
    /// that iteration never yields a repository with nothing requested.
    pub fn remove<'a, I>(&mut self, repo: &RepoId, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some(set) = self.entries.get_mut(repo) {
            for name in names {
                set.remove(name);
            }
            if set.is_empty() {
                self.entries.remove(repo);
            }
        }
    }

    /// Union of `self` and `other`, per repository. Pure: neither input is
    /// mutated, which keeps aggregation of configuration subtrees safe.
    pub fn merge(&self, other: &PackageSet) -> PackageSet {
        let mut merged = self.clone();
        for (repo, names) in &other.entries {
            merged.add(repo, names.iter().cloned());
        }
        merged
    }

    /// All package names across all repositories. Display/logging only:
    /// installation must remain repository-scoped.
    pub fn flatten(&self) -> Vec<String> {
        self.entries
            .values()
            .flat_map(|names| names.iter().cloned())
            .collect()
    }

    pub fn get(&self, repo: &RepoId) -> Option<&BTreeSet<String>> {
        self.entries.get(repo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RepoId, &BTreeSet<String>)> {
        self.entries.iter()
    }

    pub fn repos(&self) -> impl Iterator<Item = &RepoId> {
        self.entries.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    /// Sorted per-repository package lists keyed by repository name, the shape
    /// persisted in a generation record.
    pub fn to_sorted_lists(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .map(|(repo, names)| (repo.to_string(), names.iter().cloned().collect()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(name: &str) -> RepoId {
        RepoId::new(name)
    }

    #[test]
    fn add_unions_into_existing_entry() {
        let mut set = PackageSet::new();
        set.add(&repo("arch"), ["git", "vim"]);
        set.add(&repo("arch"), ["vim", "htop"]);
        let names = set.get(&repo("arch")).unwrap();
        assert_eq!(names.len(), 3);
        assert!(names.contains("htop"));
    }

    #[test]
    fn merge_is_pure_union() {
        let mut a = PackageSet::new();
        a.add(&repo("arch"), ["git"]);
        let mut b = PackageSet::new();
        b.add(&repo("arch"), ["vim"]);
        b.add(&repo("aur"), ["yay-bin"]);

        let merged = a.merge(&b);
        assert_eq!(merged.get(&repo("arch")).unwrap().len(), 2);
        assert_eq!(merged.get(&repo("aur")).unwrap().len(), 1);
        // inputs untouched
        assert_eq!(a.get(&repo("arch")).unwrap().len(), 1);
        assert!(b.get(&repo("arch")).unwrap().len() == 1);
    }

    #[test]
    fn flatten_crosses_repositories() {
        let mut set = PackageSet::new();
        set.add(&repo("arch"), ["git"]);
        set.add(&repo("flatpak"), ["org.gimp.GIMP"]);
        let mut flat = set.flatten();
        flat.sort();
        assert_eq!(flat, vec!["git".to_owned(), "org.gimp.GIMP".to_owned()]);
    }

    #[test]
    fn add_with_nothing_creates_no_entry() {
        let mut set = PackageSet::new();
        set.add(&repo("arch"), Vec::<String>::new());
        assert!(set.get(&repo("arch")).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn remove_drops_empty_entries() {
        let mut set = PackageSet::new();
        set.add(&repo("arch"), ["git"]);
        set.remove(&repo("arch"), ["git"]);
        assert!(set.get(&repo("arch")).is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn sorted_lists_are_deterministic() {
        let mut set = PackageSet::new();
        set.add(&repo("arch"), ["vim", "git", "htop"]);
        let lists = set.to_sorted_lists();
        assert_eq!(lists["arch"], vec!["git", "htop", "vim"]);
    }
}
