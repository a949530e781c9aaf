use crate::engine::fetcher::FetchedArtifact;
use crate::engine::publisher::EnvironmentContribution;
use crate::engine::Stage;
use crate::Recipe;
use std::path::PathBuf;

pub struct BuildState<'a> {
    pub recipe: &'a Recipe,
    pub stage: Stage,
    pub artifacts: Vec<FetchedArtifact<'a>>,
    pub marker_dir: Option<PathBuf>,
    pub package_dir: Option<PathBuf>,
    pub contribution: EnvironmentContribution,
}
