pub mod parsing;

use kiln_utils::WalkStrings;
use ring::digest::{Context, SHA256};
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

#[derive(Default, Debug, Clone)]
pub struct Document {
    pub recipes: Vec<Recipe>,
}

/// A parsed recipe. Immutable once template substitution has run.
#[derive(Default, Debug, Clone, WalkStrings)]
pub struct Recipe {
    pub name: String,
    pub version: String,
    pub description: String,
    pub home: Option<String>,
    pub license: Vec<String>,
    pub maintainers: Vec<String>,
    /// Canonical name of the extracted source tree.
    pub source_dir: String,
    /// Top-level directory inside the archive. When absent the extractor
    /// expects the staging area to contain exactly one directory.
    pub archive_root: Option<String>,
    pub artifacts: Vec<Artifact>,
    pub build: BuildVars,
    pub marker: Option<DependencyMarker>,
    pub package: PackageSpec,
    pub options: RecipeOptions,
}

#[derive(Default, Debug, Clone, WalkStrings)]
pub struct RecipeOptions {
    pub shared: Option<bool>,
}

/// Knobs for the external configure/compile/install commands.
#[derive(Default, Debug, Clone, WalkStrings)]
pub struct BuildVars {
    pub configure_script: Option<String>,
    pub configure_args: Vec<String>,
    /// Optional modules passed to the configure script as `--disable=<name>`.
    pub disable: Vec<String>,
    pub make_command: Option<String>,
    pub qtconf_prefix: Option<String>,
}

/// Declares which dependency's include directories must contain which file
/// for the build to proceed.
#[derive(Default, Debug, Clone, WalkStrings)]
pub struct DependencyMarker {
    pub dependency: String,
    pub file: String,
}

#[derive(Default, Debug, Clone, WalkStrings)]
pub struct PackageSpec {
    pub rules: Vec<CopyRule>,
    pub init: Option<InitRule>,
}

#[derive(Debug, Clone, WalkStrings)]
pub struct CopyRule {
    pub pattern: String,
    pub src: String,
    pub dst: String,
    #[skip]
    pub origin: CopyOrigin,
}

/// Which tree a copy rule's `src` is relative to: the build output tree, the
/// extracted source tree, or the package dir of an already-installed
/// dependency (used to repackage a dependency's subtree into this package).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CopyOrigin {
    Build,
    Source,
    Dependency(String),
}

impl Default for CopyOrigin {
    fn default() -> Self {
        CopyOrigin::Build
    }
}

/// A fixed-content loader entry file shipped next to the recipe, copied over
/// the generated placeholder inside the packaged module tree.
#[derive(Default, Debug, Clone, WalkStrings)]
pub struct InitRule {
    pub file: String,
    pub dst: String,
}

#[derive(Serialize, Debug)]
pub struct RecipeTemplate {
    #[serde(rename = "self-ref")]
    pub self_ref: String,
    pub name: String,
    pub version: String,
    pub description: String,
}

impl Recipe {
    pub fn template_vars(&self) -> RecipeTemplate {
        RecipeTemplate {
            self_ref: format!("{}-{}", self.name, self.version),
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, WalkStrings)]
pub struct Artifact {
    pub source: ArtifactSource,
    #[skip]
    pub verification: Verification,
}

impl Artifact {
    pub fn file_name(&self) -> &str {
        self.source.file_name()
    }

    pub fn hash_id(&self) -> [u8; 32] {
        let name = self.source.method_name();
        let hash_data = self.source.hash_data();
        let mut digest = Context::new(&SHA256);
        digest.update(name);
        digest.update(hash_data.as_ref());
        let fin = digest.finish();

        fin.as_ref()[..32].try_into().unwrap()
    }
}

#[derive(Debug, Clone, WalkStrings)]
pub enum ArtifactSource {
    Fetch(FetchArtifact),
}

impl ArtifactSource {
    pub fn method_name(&self) -> &[u8] {
        match self {
            ArtifactSource::Fetch(_) => b"fetch",
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            ArtifactSource::Fetch(f) => f.file_name(),
        }
    }

    pub fn hash_data(&self) -> Cow<'_, [u8]> {
        match self {
            ArtifactSource::Fetch(f) => f.hash_data(),
        }
    }
}

#[derive(Default, Debug, Clone, WalkStrings)]
pub struct FetchArtifact {
    pub url: String,
    pub file_name: String,
}

impl FetchArtifact {
    pub fn file_name(&self) -> &str {
        self.file_name.as_str()
    }

    pub fn hash_data(&self) -> Cow<'_, [u8]> {
        self.url.as_bytes().into()
    }
}

#[derive(Default, Debug, Clone)]
pub struct Verification {
    pub sha256: Option<[u8; 32]>,
}

/// Injected build context: the target platform, the link variant, and the
/// include-path candidates of already-installed dependencies.
#[derive(Debug, Clone)]
pub struct Profile {
    pub platform: Platform,
    pub shared: Option<bool>,
    pub deps: Vec<DependencyPaths>,
}

impl Default for Profile {
    fn default() -> Self {
        Profile {
            platform: Platform::host(),
            shared: None,
            deps: vec![],
        }
    }
}

impl Profile {
    pub fn include_dirs(&self, dependency: &str) -> &[PathBuf] {
        self.deps
            .iter()
            .find(|dep| dep.name == dependency)
            .map_or(&[], |dep| dep.include_dirs.as_slice())
    }

    /// Package dir of an installed dependency, when the outer resolver
    /// supplied one.
    pub fn package_dir(&self, dependency: &str) -> Option<&Path> {
        self.deps
            .iter()
            .find(|dep| dep.name == dependency)
            .and_then(|dep| dep.package_dir.as_deref())
    }

    /// The profile overrides the recipe default; shared linkage wins when
    /// neither says anything.
    pub fn shared(&self, recipe: &Recipe) -> bool {
        self.shared.or(recipe.options.shared).unwrap_or(true)
    }
}

#[derive(Debug, Clone)]
pub struct DependencyPaths {
    pub name: String,
    pub include_dirs: Vec<PathBuf>,
    pub package_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Platform {
    pub os: OsFamily,
    pub compiler: String,
    pub arch: String,
    pub build_type: String,
}

impl Platform {
    pub fn host() -> Self {
        let os = OsFamily::host();
        Platform {
            compiler: match os {
                OsFamily::Windows => "msvc",
                OsFamily::Macos => "clang",
                OsFamily::Linux => "gcc",
            }
            .to_string(),
            arch: std::env::consts::ARCH.to_string(),
            build_type: "Release".to_string(),
            os,
        }
    }

    pub fn is_msvc(&self) -> bool {
        self.os == OsFamily::Windows && self.compiler == "msvc"
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::host()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OsFamily {
    Linux,
    Macos,
    Windows,
}

impl OsFamily {
    pub fn parse<T: AsRef<str>>(data: T) -> Option<OsFamily> {
        Some(match data.as_ref() {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::Macos,
            "windows" => OsFamily::Windows,
            _ => return None,
        })
    }

    pub fn host() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else if cfg!(target_os = "macos") {
            OsFamily::Macos
        } else {
            OsFamily::Linux
        }
    }
}
