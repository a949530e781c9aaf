use std::path::{Path, PathBuf};

/// Search-path entries a finished package contributes to its consumers.
/// Appends are set-like: downstream tooling relies on each entry appearing
/// exactly once no matter how often a package is published.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct EnvironmentContribution {
    path: Vec<PathBuf>,
    pythonpath: Vec<PathBuf>,
}

impl EnvironmentContribution {
    pub fn add_path(&mut self, entry: PathBuf) {
        if !self.path.contains(&entry) {
            self.path.push(entry);
        }
    }

    pub fn add_pythonpath(&mut self, entry: PathBuf) {
        if !self.pythonpath.contains(&entry) {
            self.pythonpath.push(entry);
        }
    }

    pub fn path(&self) -> &[PathBuf] {
        &self.path
    }

    pub fn pythonpath(&self) -> &[PathBuf] {
        &self.pythonpath
    }
}

#[derive(Debug, Default)]
pub struct Publisher;

impl Publisher {
    pub fn new() -> Self {
        Publisher
    }

    pub fn publish(&self, package_dir: &Path, contribution: &mut EnvironmentContribution) {
        contribution.add_path(package_dir.join("bin"));
        contribution.add_pythonpath(package_dir.join("site-packages"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishing_twice_keeps_entries_unique() {
        let publisher = Publisher::new();
        let mut contribution = EnvironmentContribution::default();

        publisher.publish(Path::new("/pkg"), &mut contribution);
        publisher.publish(Path::new("/pkg"), &mut contribution);

        assert_eq!(contribution.path(), &[PathBuf::from("/pkg/bin")]);
        assert_eq!(
            contribution.pythonpath(),
            &[PathBuf::from("/pkg/site-packages")]
        );
    }

    #[test]
    fn distinct_packages_accumulate_in_order() {
        let publisher = Publisher::new();
        let mut contribution = EnvironmentContribution::default();

        publisher.publish(Path::new("/pkg-a"), &mut contribution);
        publisher.publish(Path::new("/pkg-b"), &mut contribution);

        assert_eq!(
            contribution.path(),
            &[PathBuf::from("/pkg-a/bin"), PathBuf::from("/pkg-b/bin")]
        );
    }
}
