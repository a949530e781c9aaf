use crate::definition::{Platform, Profile};
use crate::engine::executor::{Executor, Invocation, ProcessOutput};
use crate::engine::WorkTree;
use crate::Recipe;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Runs the external configure/compile/install commands for a recipe. The
/// command lines are built from a closed set of platform variants and handed
/// to an injected executor, so the whole contract is testable without
/// spawning real toolchains.
#[derive(Debug)]
pub struct Invoker {
    executor: Box<dyn Executor>,
    cpus: usize,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BuildStep {
    Configure,
    Compile,
    Install,
}

impl BuildStep {
    fn failure(self, output: ProcessOutput) -> BuildError {
        let code = output.code;
        let output = output.combined();

        match self {
            BuildStep::Configure => BuildError::ConfigurationFailed { code, output },
            BuildStep::Compile => BuildError::CompileFailed { code, output },
            BuildStep::Install => BuildError::InstallFailed { code, output },
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("configure step exited with {code:?}:\n{output}")]
    ConfigurationFailed { code: Option<i32>, output: String },

    #[error("compile step exited with {code:?}:\n{output}")]
    CompileFailed { code: Option<i32>, output: String },

    #[error("install step exited with {code:?}:\n{output}")]
    InstallFailed { code: Option<i32>, output: String },

    #[error("failed spawning build command")]
    Spawn(#[from] std::io::Error),
}

impl Invoker {
    pub fn new(executor: Box<dyn Executor>) -> Self {
        Invoker {
            executor,
            cpus: num_cpus::get(),
        }
    }

    pub async fn configure(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
        marker_dir: Option<&Path>,
    ) -> Result<(), BuildError> {
        let invocation = self.configure_invocation(recipe, profile, tree, marker_dir);
        self.run_step(BuildStep::Configure, invocation).await
    }

    pub async fn compile(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
    ) -> Result<(), BuildError> {
        let driver = build_driver(recipe, &profile.platform);
        let args = if profile.platform.is_msvc() {
            // jom parallelizes across all cores on its own
            vec![]
        } else {
            vec![format!("-j{}", self.cpus)]
        };

        let invocation = shell_invocation(&profile.platform, driver, args, tree.source.clone());
        self.run_step(BuildStep::Compile, invocation).await
    }

    pub async fn install(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
    ) -> Result<(), BuildError> {
        let driver = build_driver(recipe, &profile.platform);
        let invocation = shell_invocation(
            &profile.platform,
            driver,
            vec!["install".to_string()],
            tree.source.clone(),
        );
        self.run_step(BuildStep::Install, invocation).await
    }

    fn configure_invocation(
        &self,
        recipe: &Recipe,
        profile: &Profile,
        tree: &WorkTree,
        marker_dir: Option<&Path>,
    ) -> Invocation {
        let script = recipe
            .build
            .configure_script
            .as_deref()
            .unwrap_or("./configure");

        let mut words = script.split_whitespace().map(ToString::to_string);
        let program = words.next().unwrap_or_else(|| "./configure".to_string());
        let mut args: Vec<String> = words.collect();

        args.push("--confirm-license".to_string());

        if !profile.shared(recipe) {
            args.push("--static".to_string());
        }

        args.push("--no-timestamp".to_string());
        args.push("--no-designer-plugin".to_string());

        for module in &recipe.build.disable {
            args.push(format!("--disable={}", module));
        }

        args.push("-c".to_string());
        args.push(format!("-j{}", self.cpus));
        args.push("--no-dist-info".to_string());

        args.push(format!("--stubsdir={}", tree.stubs.display()));
        args.push(format!("--bindir={}", tree.bin.display()));
        args.push(format!("--destdir={}", tree.site_packages.display()));
        args.push(format!("--sipdir={}", tree.sip.display()));

        if let Some(prefix) = &recipe.build.qtconf_prefix {
            args.push(format!("--qtconf-prefix={}", prefix));
        }

        if let Some(dir) = marker_dir {
            args.push(format!("--sip-incdir={}", dir.display()));
        }

        args.extend(recipe.build.configure_args.iter().cloned());

        shell_invocation(&profile.platform, program, args, tree.source.clone())
    }

    async fn run_step(&self, step: BuildStep, invocation: Invocation) -> Result<(), BuildError> {
        println!("    running: {}", invocation.command_line());

        let output = self.executor.run(&invocation).await?;
        if output.success() {
            Ok(())
        } else {
            Err(step.failure(output))
        }
    }
}

fn build_driver(recipe: &Recipe, platform: &Platform) -> String {
    recipe.build.make_command.clone().unwrap_or_else(|| {
        if platform.is_msvc() { "jom" } else { "make" }.to_string()
    })
}

/// The MSVC toolchain only exists inside a shell that has sourced the
/// compiler environment script, so every Windows invocation is wrapped with
/// it. Everywhere else the command runs directly.
fn shell_invocation(
    platform: &Platform,
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
) -> Invocation {
    let env = scoped_env(platform);

    match setup_command(platform) {
        Some(setup) => {
            let inner = Invocation {
                program,
                args,
                env: vec![],
                cwd: cwd.clone(),
            };

            Invocation {
                program: "cmd".to_string(),
                args: vec![
                    "/C".to_string(),
                    format!("{} && {}", setup, inner.command_line()),
                ],
                env,
                cwd,
            }
        }

        None => Invocation {
            program,
            args,
            env,
            cwd,
        },
    }
}

fn setup_command(platform: &Platform) -> Option<String> {
    platform
        .is_msvc()
        .then(|| format!("call vcvarsall.bat {}", platform.arch))
}

fn scoped_env(platform: &Platform) -> Vec<(String, String)> {
    if platform.is_msvc() {
        vec![("CXXFLAGS".to_string(), "/bigobj".to_string())]
    } else {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{BuildVars, OsFamily, RecipeOptions};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Recording {
        calls: Arc<Mutex<Vec<Invocation>>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Executor for Recording {
        async fn run(&self, invocation: &Invocation) -> std::io::Result<ProcessOutput> {
            self.calls.lock().unwrap().push(invocation.clone());

            let fails = self
                .fail_on
                .as_deref()
                .map_or(false, |pat| invocation.command_line().contains(pat));

            Ok(ProcessOutput {
                code: if fails { Some(2) } else { Some(0) },
                stdout: String::new(),
                stderr: if fails { "boom".to_string() } else { String::new() },
            })
        }
    }

    fn recipe() -> Recipe {
        Recipe {
            name: "PyQt5".to_string(),
            version: "5.11.3".to_string(),
            source_dir: "pyqt-src".to_string(),
            build: BuildVars {
                configure_script: Some("python configure.py".to_string()),
                disable: vec!["QtNfc".to_string()],
                qtconf_prefix: Some("Qt".to_string()),
                ..Default::default()
            },
            options: RecipeOptions { shared: Some(true) },
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

    fn msvc_profile() -> Profile {
        Profile {
            platform: Platform {
                os: OsFamily::Windows,
                compiler: "msvc".to_string(),
                arch: "x86_64".to_string(),
                build_type: "Release".to_string(),
            },
            shared: None,
            deps: vec![],
        }
    }

    fn tree() -> WorkTree {
        let build = PathBuf::from("/work/build/PyQt5");
        WorkTree {
            source: PathBuf::from("/work/src/PyQt5/pyqt-src"),
            bin: build.join("bin"),
            include: build.join("include"),
            sip: build.join("sip/PyQt5"),
            stubs: build.join("site-packages/PyQt5"),
            site_packages: build.join("site-packages"),
            package: PathBuf::from("/work/pkg/PyQt5"),
            build,
        }
    }

    fn invoker(calls: Arc<Mutex<Vec<Invocation>>>, fail_on: Option<&str>) -> Invoker {
        Invoker {
            executor: Box::new(Recording {
                calls,
                fail_on: fail_on.map(ToString::to_string),
            }),
            cpus: 4,
        }
    }

    #[tokio::test]
    async fn posix_configure_runs_the_script_directly() {
        let calls = Arc::new(Mutex::new(vec![]));
        let invoker = invoker(calls.clone(), None);

        invoker
            .configure(
                &recipe(),
                &linux_profile(),
                &tree(),
                Some(Path::new("/opt/sip/include")),
            )
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "python");
        assert_eq!(calls[0].args[0], "configure.py");
        assert!(calls[0].args.contains(&"--confirm-license".to_string()));
        assert!(calls[0].args.contains(&"--disable=QtNfc".to_string()));
        assert!(calls[0].args.contains(&"-j4".to_string()));
        assert!(calls[0]
            .args
            .contains(&"--sip-incdir=/opt/sip/include".to_string()));
        assert!(!calls[0].args.contains(&"--static".to_string()));
        assert!(calls[0].env.is_empty());
        assert_eq!(calls[0].cwd, tree().source);
    }

    #[tokio::test]
    async fn static_variant_adds_the_static_flag() {
        let calls = Arc::new(Mutex::new(vec![]));
        let invoker = invoker(calls.clone(), None);

        let mut profile = linux_profile();
        profile.shared = Some(false);

        invoker
            .configure(&recipe(), &profile, &tree(), None)
            .await
            .unwrap();

        let calls = calls.lock().unwrap();
        assert!(calls[0].args.contains(&"--static".to_string()));
    }

    #[tokio::test]
    async fn windows_invocations_source_the_compiler_environment() {
        let calls = Arc::new(Mutex::new(vec![]));
        let invoker = invoker(calls.clone(), None);

        let recipe = recipe();
        let profile = msvc_profile();
        let tree = tree();

        invoker.configure(&recipe, &profile, &tree, None).await.unwrap();
        invoker.compile(&recipe, &profile, &tree).await.unwrap();
        invoker.install(&recipe, &profile, &tree).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);

        for call in calls.iter() {
            assert_eq!(call.program, "cmd");
            assert!(call.args[1].starts_with("call vcvarsall.bat x86_64 && "));
            assert!(call
                .env
                .contains(&("CXXFLAGS".to_string(), "/bigobj".to_string())));
        }

        assert!(calls[1].args[1].ends_with("&& jom"));
        assert!(calls[2].args[1].ends_with("&& jom install"));
    }

    #[tokio::test]
    async fn posix_compile_and_install_use_make() {
        let calls = Arc::new(Mutex::new(vec![]));
        let invoker = invoker(calls.clone(), None);

        let recipe = recipe();
        let profile = linux_profile();
        let tree = tree();

        invoker.compile(&recipe, &profile, &tree).await.unwrap();
        invoker.install(&recipe, &profile, &tree).await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0].program, "make");
        assert_eq!(calls[0].args, vec!["-j4".to_string()]);
        assert_eq!(calls[1].args, vec!["install".to_string()]);
        assert!(calls[0].env.is_empty());
    }

    #[tokio::test]
    async fn failing_compile_surfaces_the_output() {
        let calls = Arc::new(Mutex::new(vec![]));
        let invoker = invoker(calls.clone(), Some("make"));

        let err = invoker
            .compile(&recipe(), &linux_profile(), &tree())
            .await
            .unwrap_err();

        match err {
            BuildError::CompileFailed { code, output } => {
                assert_eq!(code, Some(2));
                assert!(output.contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
