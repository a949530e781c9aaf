use crate::definition::{CopyOrigin, CopyRule, InitRule, Profile};
use crate::engine::{EngineSettings, WorkTree};
use crate::Recipe;
use async_trait::async_trait;
use lazy_static::lazy_static;
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[async_trait]
pub trait Packager: Send + Sync + Debug {
    /// Collects build outputs into the canonical package dir and returns it.
    /// The profile supplies the package dirs of installed dependencies for
    /// rules that repackage a dependency subtree.
    async fn assemble(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
    ) -> Result<PathBuf, PackageError>;
}

pub trait PackagerBuilder {
    type Output: Packager + 'static;

    fn build(settings: Arc<EngineSettings>) -> Self::Output;
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("required artifact missing from build output: {}", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("no package directory known for dependency {name}")]
    DependencyUnavailable { name: String },

    #[error("invalid copy pattern \"{pattern}\": {message}")]
    Pattern { pattern: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

lazy_static! {
    /// Layout mirrored from the upstream recipe: license text, helper
    /// binaries, interface definitions, the installed module tree and the
    /// public headers.
    static ref DEFAULT_RULES: Vec<CopyRule> = vec![
        rule("LICENSE", ".", "licenses", CopyOrigin::Source),
        rule("**", "bin", "bin", CopyOrigin::Build),
        rule("**", "sip", "sip", CopyOrigin::Build),
        rule("**", "site-packages", "site-packages", CopyOrigin::Build),
        rule("**/*.h", "include", "include", CopyOrigin::Build),
    ];
}

fn rule(pattern: &str, src: &str, dst: &str, origin: CopyOrigin) -> CopyRule {
    CopyRule {
        pattern: pattern.to_string(),
        src: src.to_string(),
        dst: dst.to_string(),
        origin,
    }
}

/// Copies subtrees straight into a package directory on disk.
#[derive(Debug)]
pub struct TreePackager {
    settings: Arc<EngineSettings>,
}

impl PackagerBuilder for TreePackager {
    type Output = TreePackager;

    fn build(settings: Arc<EngineSettings>) -> Self::Output {
        TreePackager { settings }
    }
}

#[async_trait]
impl Packager for TreePackager {
    async fn assemble(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
    ) -> Result<PathBuf, PackageError> {
        tokio::fs::create_dir_all(&tree.package).await?;

        let rules = if recipe.package.rules.is_empty() {
            DEFAULT_RULES.as_slice()
        } else {
            recipe.package.rules.as_slice()
        };

        for rule in rules {
            self.apply_rule(rule, profile, tree).await?;
        }

        if let Some(init) = &recipe.package.init {
            self.apply_init(init, tree).await?;
        }

        Ok(tree.package.clone())
    }
}

impl TreePackager {
    async fn apply_rule(
        &self,
        rule: &CopyRule,
        profile: &Profile,
        tree: &WorkTree,
    ) -> Result<(), PackageError> {
        let base = match &rule.origin {
            CopyOrigin::Build => tree.build.clone(),
            CopyOrigin::Source => tree.source.clone(),
            CopyOrigin::Dependency(name) => match profile.package_dir(name) {
                Some(dir) => dir.to_path_buf(),
                None => {
                    return Err(PackageError::DependencyUnavailable { name: name.clone() })
                }
            },
        };

        let src_root = if rule.src == "." {
            base
        } else {
            base.join(&rule.src)
        };

        if tokio::fs::metadata(&src_root).await.is_err() {
            return Err(PackageError::MissingArtifact { path: src_root });
        }

        let glob = wax::Glob::from_str(&rule.pattern).map_err(|e| PackageError::Pattern {
            pattern: rule.pattern.clone(),
            message: e.to_string(),
        })?;

        let dst_root = tree.package.join(&rule.dst);

        for item in glob.walk(&src_root) {
            let item = match item {
                Err(_) => continue,
                Ok(item) => item,
            };

            if !item.file_type().is_file() {
                continue;
            }

            let candidate = item.to_candidate_path();
            let relative = PathBuf::from(candidate.as_ref());

            let dst = dst_root.join(&relative);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            tokio::fs::copy(src_root.join(&relative), dst).await?;
        }

        Ok(())
    }

    /// The loader entry file ships next to the recipe with fixed content; it
    /// overwrites whatever placeholder the install step generated.
    async fn apply_init(&self, init: &InitRule, tree: &WorkTree) -> Result<(), PackageError> {
        let src = self.settings.exports_path().join(&init.file);

        if tokio::fs::metadata(&src).await.is_err() {
            return Err(PackageError::MissingArtifact { path: src });
        }

        let dst = tree.package.join("site-packages").join(&init.dst);
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::copy(&src, &dst).await?;

        Ok(())
    }
}
