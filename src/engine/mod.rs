use crate::definition::Profile;
use crate::engine::build_state::BuildState;
use crate::engine::executor::{Executor, Shell};
use crate::engine::extractor::Extractor;
use crate::engine::fetcher::Fetcher;
use crate::engine::invoker::Invoker;
use crate::engine::locator::Locator;
use crate::engine::packager::{Packager, PackagerBuilder};
use crate::engine::publisher::{EnvironmentContribution, Publisher};
use crate::Recipe;
use anyhow::bail;
use futures::future::join_all;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod build_state;
pub mod executor;
mod extractor;
mod fetcher;
pub mod invoker;
mod locator;
pub mod packager;
pub mod publisher;

/// The build pipeline. Stages run strictly in this order; the first failing
/// stage aborts the run and nothing after it executes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(u8)]
pub enum Stage {
    Prepare,
    Fetch,
    Extract,
    Locate,
    Configure,
    Compile,
    Install,
    Package,
    Publish,
}

impl Stage {
    pub const fn stages() -> [Stage; 9] {
        [
            Stage::Prepare,
            Stage::Fetch,
            Stage::Extract,
            Stage::Locate,
            Stage::Configure,
            Stage::Compile,
            Stage::Install,
            Stage::Package,
            Stage::Publish,
        ]
    }
}

#[derive(Debug)]
pub struct Engine {
    fetcher: Fetcher,
    extractor: Extractor,
    locator: Locator,
    invoker: Invoker,
    packager: Box<dyn Packager>,
    publisher: Publisher,
    pub settings: Arc<EngineSettings>,
}

#[derive(Debug)]
pub struct EngineSettings {
    cache_path: PathBuf,
    source_path: PathBuf,
    build_path: PathBuf,
    package_path: PathBuf,
    exports_path: PathBuf,
    root_path: PathBuf,
}

impl EngineSettings {
    /// Scopes every working path beneath one root. Two runs sharing a root
    /// are unsupported; callers serialize builds themselves.
    pub fn under(root: &Path) -> Self {
        EngineSettings {
            cache_path: root.join("cache"),
            source_path: PathBuf::from("src"),
            build_path: PathBuf::from("build"),
            package_path: PathBuf::from("pkg"),
            exports_path: root.join("exports"),
            root_path: root.to_path_buf(),
        }
    }

    pub fn root_path(&self) -> &Path {
        self.root_path.as_path()
    }

    pub fn cache_path(&self) -> &Path {
        self.cache_path.as_path()
    }

    pub fn exports_path(&self) -> &Path {
        self.exports_path.as_path()
    }

    pub fn source_path(&self) -> PathBuf {
        self.root_path.join(&self.source_path)
    }

    /// Staging area the recipe's archives are unpacked into.
    pub fn source_path_for_recipe(&self, recipe: &Recipe) -> PathBuf {
        self.source_path().join(&recipe.name)
    }

    /// The canonical extracted source tree.
    pub fn extracted_source_path_for_recipe(&self, recipe: &Recipe) -> PathBuf {
        self.source_path_for_recipe(recipe).join(&recipe.source_dir)
    }

    pub fn build_path(&self) -> PathBuf {
        self.root_path.join(&self.build_path)
    }

    pub fn build_path_for_recipe(&self, recipe: &Recipe) -> PathBuf {
        self.build_path().join(&recipe.name)
    }

    pub fn package_path(&self) -> PathBuf {
        self.root_path.join(&self.package_path)
    }

    pub fn package_path_for_recipe(&self, recipe: &Recipe) -> PathBuf {
        self.package_path().join(&recipe.name)
    }

    pub fn work_tree(&self, recipe: &Recipe) -> WorkTree {
        let build = self.build_path_for_recipe(recipe);
        let site_packages = build.join("site-packages");

        WorkTree {
            source: self.extracted_source_path_for_recipe(recipe),
            bin: build.join("bin"),
            include: build.join("include"),
            sip: build.join("sip").join(&recipe.name),
            stubs: site_packages.join(&recipe.name),
            site_packages,
            package: self.package_path_for_recipe(recipe),
            build,
        }
    }
}

/// Filesystem paths owned by one orchestration run: the extracted source
/// tree, the build output subtrees and the package destination.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WorkTree {
    pub source: PathBuf,
    pub build: PathBuf,
    pub bin: PathBuf,
    pub include: PathBuf,
    pub sip: PathBuf,
    pub stubs: PathBuf,
    pub site_packages: PathBuf,
    pub package: PathBuf,
}

#[derive(Debug)]
pub struct EngineError {
    errors: Vec<anyhow::Error>,
}

impl std::error::Error for EngineError {}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Encountered {} errors:", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n\n\t{}", err)?;
        }

        Ok(())
    }
}

impl Engine {
    pub fn new<T: PackagerBuilder>() -> Self {
        Self::from_settings::<T>(
            EngineSettings {
                cache_path: PathBuf::from("/tmp/kiln/cache"),
                source_path: PathBuf::from(".kiln/src"),
                build_path: PathBuf::from(".kiln/build"),
                package_path: PathBuf::from(".kiln/pkg"),
                exports_path: PathBuf::from("recipes"),
                root_path: PathBuf::from("/tmp/kiln/root"),
            },
            Box::new(Shell),
        )
    }

    pub fn from_settings<T: PackagerBuilder>(
        settings: EngineSettings,
        executor: Box<dyn Executor>,
    ) -> Self {
        let settings = Arc::from(settings);
        Engine {
            fetcher: Fetcher::new(settings.clone()),
            extractor: Extractor::new(settings.clone()),
            locator: Locator::new(),
            invoker: Invoker::new(executor),
            packager: Box::new(T::build(settings.clone())),
            publisher: Publisher::new(),
            settings,
        }
    }

    pub async fn prepare_engine(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.settings.cache_path).await?;

        Ok(())
    }

    pub async fn build_recipe(
        &self,
        recipe: &Recipe,
        profile: &Profile,
    ) -> anyhow::Result<EnvironmentContribution> {
        let tree = self.settings.work_tree(recipe);

        let mut state = BuildState {
            recipe,
            stage: Stage::Prepare,
            artifacts: vec![],
            marker_dir: None,
            package_dir: None,
            contribution: EnvironmentContribution::default(),
        };

        for stage in Stage::stages() {
            println!("running stage: {:?}", stage);
            state.stage = stage;

            match stage {
                Stage::Prepare => {
                    self.prepare_engine().await?;
                }

                Stage::Fetch => {
                    self.fetch(&mut state).await?;
                }

                Stage::Extract => {
                    self.extract(&mut state).await?;
                }

                Stage::Locate => {
                    if let Some(marker) = &recipe.marker {
                        let candidates = profile.include_dirs(&marker.dependency);
                        let dir = self.locator.locate(candidates, &marker.file).await?;
                        state.marker_dir = Some(dir);
                    }
                }

                Stage::Configure => {
                    self.invoker
                        .configure(recipe, profile, &tree, state.marker_dir.as_deref())
                        .await?;
                }

                Stage::Compile => {
                    self.invoker.compile(recipe, profile, &tree).await?;
                }

                Stage::Install => {
                    self.invoker.install(recipe, profile, &tree).await?;
                }

                Stage::Package => {
                    let package_dir = self.packager.assemble(recipe, profile, &tree).await?;
                    state.package_dir = Some(package_dir);
                }

                Stage::Publish => {
                    let package_dir = match &state.package_dir {
                        Some(dir) => dir,
                        None => bail!("package stage produced no package directory"),
                    };

                    self.publisher.publish(package_dir, &mut state.contribution);
                }
            }
        }

        Ok(state.contribution)
    }

    async fn extract<'a>(&self, state: &mut BuildState<'a>) -> anyhow::Result<()> {
        if state.artifacts.is_empty() {
            return Ok(());
        }

        for item in &state.artifacts {
            self.extractor.extract(item, state.recipe).await?;
        }

        self.extractor.finalize(state.recipe).await?;

        Ok(())
    }

    async fn fetch<'a>(&self, state: &mut BuildState<'a>) -> anyhow::Result<()> {
        let all_fetch: Vec<_> = join_all(
            state
                .recipe
                .artifacts
                .iter()
                .map(|art| self.fetcher.fetch(art)),
        )
        .await;

        let mut errors = vec![];
        let mut ok = vec![];

        for item in all_fetch {
            match item {
                Ok(v) => ok.push(v),
                Err(e) => errors.push(e.into()),
            }
        }

        if !errors.is_empty() {
            return Err(EngineError { errors }.into());
        }

        state.artifacts = ok;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DependencyMarker, DependencyPaths, OsFamily, Platform};
    use crate::engine::executor::{Invocation, ProcessOutput};
    use crate::engine::invoker::BuildError;
    use crate::engine::packager::PackageError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug)]
    struct Scripted {
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Executor for Scripted {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            let line = invocation.command_line();

            let fails = self.fail_on.as_deref().map_or(false, |pat| line.contains(pat));
            Ok(ProcessOutput {
                code: if fails { Some(1) } else { Some(0) },
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    #[derive(Debug)]
    struct SpyPackager {
        called: Arc<AtomicBool>,
        package_dir: PathBuf,
    }

    #[async_trait]
    impl Packager for SpyPackager {
        async fn assemble(
            &self,
            _: &Recipe,
            _: &Profile,
            _: &WorkTree,
        ) -> Result<PathBuf, PackageError> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.package_dir.clone())
        }
    }

    fn engine(root: &Path, fail_on: Option<&str>, called: Arc<AtomicBool>) -> Engine {
        let settings = Arc::new(EngineSettings::under(root));

        Engine {
            fetcher: Fetcher::new(settings.clone()),
            extractor: Extractor::new(settings.clone()),
            locator: Locator::new(),
            invoker: Invoker::new(Box::new(Scripted {
                fail_on: fail_on.map(ToString::to_string),
            })),
            packager: Box::new(SpyPackager {
                called,
                package_dir: settings.package_path_for_recipe(&recipe()),
            }),
            publisher: Publisher::new(),
            settings,
        }
    }

    fn recipe() -> Recipe {
        Recipe {
            name: "PyQt5".to_string(),
            version: "5.11.3".to_string(),
            source_dir: "pyqt-src".to_string(),
            ..Default::default()
        }
    }

    fn linux_profile() -> Profile {
        Profile {
            platform: Platform {
                os: OsFamily::Linux,
                compiler: "gcc".to_string(),
                arch: "x86_64".to_string(),
                build_type: "Release".to_string(),
            },
            shared: None,
            deps: vec![],
        }
    }

    #[tokio::test]
    async fn failed_compile_never_reaches_the_packager() {
        let root = tempfile::tempdir().unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let engine = engine(root.path(), Some("make"), called.clone());

        let err = engine
            .build_recipe(&recipe(), &linux_profile())
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::CompileFailed { .. })
        ));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn missing_marker_aborts_before_any_build_step() {
        let root = tempfile::tempdir().unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let engine = engine(root.path(), None, called.clone());

        let mut recipe = recipe();
        recipe.marker = Some(DependencyMarker {
            dependency: "sip".to_string(),
            file: "sip.h".to_string(),
        });

        let profile = Profile {
            deps: vec![DependencyPaths {
                name: "sip".to_string(),
                include_dirs: vec![root.path().join("empty")],
                package_dir: None,
            }],
            ..linux_profile()
        };

        let err = engine.build_recipe(&recipe, &profile).await.unwrap_err();
        assert!(err.to_string().contains("sip.h"));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn successful_run_publishes_the_package_paths() {
        let root = tempfile::tempdir().unwrap();
        let called = Arc::new(AtomicBool::new(false));
        let engine = engine(root.path(), None, called.clone());

        let recipe = recipe();
        let contribution = engine
            .build_recipe(&recipe, &linux_profile())
            .await
            .unwrap();

        assert!(called.load(Ordering::SeqCst));
        let package = engine.settings.package_path_for_recipe(&recipe);
        assert_eq!(contribution.path(), &[package.join("bin")]);
        assert_eq!(contribution.pythonpath(), &[package.join("site-packages")]);
    }
}
