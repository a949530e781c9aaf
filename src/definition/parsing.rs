use crate::definition::{
    Artifact, ArtifactSource, BuildVars, CopyOrigin, CopyRule, DependencyMarker, DependencyPaths,
    FetchArtifact, InitRule, OsFamily, PackageSpec, Platform, Profile, RecipeOptions, Verification,
};
use crate::{Document, Recipe};
use kdl::{KdlDocument, KdlNode};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[error("Failed parsing kiln document")]
pub struct KilnParserCompoundError {
    #[source_code]
    pub source_code: NamedSource,
    #[related]
    pub(crate) errors: Vec<KilnParseError>,
}

#[derive(Debug, Diagnostic, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct KilnParseError {
    /// Offset in chars of the error.
    #[label("{}", label.unwrap_or("here"))]
    pub span: SourceSpan,

    /// Label text for this span. Defaults to `"here"`.
    pub label: Option<&'static str>,

    /// Suggestion for fixing the parser error.
    #[help]
    pub help: Option<String>,

    /// Specific error kind for this parser error.
    pub kind: &'static str,
}

const EMPTY_NODES: &[KdlNode] = &[];

pub(crate) trait GetNodes {
    fn nodes(&self) -> &[KdlNode];
}

impl GetNodes for KdlNode {
    fn nodes(&self) -> &[KdlNode] {
        self.children().map_or(EMPTY_NODES, |x| x.nodes())
    }
}

pub trait ParseDocument {
    /// Refuses the document when any diagnostic was collected, even if a
    /// value could be assembled. Parse failures are never downgraded.
    fn parse_document_strict(
        input: &KdlDocument,
        source: &str,
        filename: Option<&str>,
    ) -> miette::Result<Self>
    where
        Self: Sized,
    {
        let (data, errors) = Self::parse_document_with_errors(input);

        match data {
            Some(obj) if errors.is_empty() => Ok(obj),

            _ => Err(KilnParserCompoundError {
                source_code: NamedSource::new(
                    filename
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "[memory.kdl]".to_string()),
                    source.to_string(),
                ),
                errors,
            }
            .into()),
        }
    }

    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized;
}

pub trait ParseNode {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized;
}

#[macro_export]
macro_rules! parse_string_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        use $crate::definition::parsing::extract_single_string_value;

        match extract_single_string_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a string"),
            concat!("only 1 string expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n.into(),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_bool_into {
    ($input:ident, $into:expr, $errors:expr, $name:literal) => {
        use $crate::definition::parsing::extract_single_bool_value;

        match extract_single_bool_value(
            $input,
            concat!($name, " missing"),
            concat!($name, " should be a bool"),
            concat!("only 1 bool expected for ", $name),
            concat!($name, " expected a value, property found instead"),
        ) {
            Ok(n) => $into = n.into(),
            Err(e) => $errors.push(e),
        };
    };
}

#[macro_export]
macro_rules! parse_string_list_into {
    ($input:ident, $into:ident, $errors:expr, $name:literal) => {
        use $crate::definition::parsing::extract_string_values;

        match extract_string_values(
            $input,
            concat!($name, " expects only string values"),
            concat!($name, " expected values, property found instead"),
        ) {
            Ok(n) => $into.extend(n),
            Err(e) => $errors.push(e),
        };
    };
}

impl ParseDocument for Document {
    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut recipes = vec![];
        let mut errors = vec![];

        for node in input.nodes() {
            if node.name().value() == "recipe" {
                let (recipe, err) = Recipe::parse_node_with_errors(node);
                if let Some(recipe) = recipe {
                    recipes.push(recipe);
                }
                errors.extend(err);
            }
        }

        (Some(Document { recipes }), errors)
    }
}

impl ParseNode for Recipe {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors: Vec<KilnParseError> = vec![];

        let mut name: String = "<unnamed>".to_string();
        let mut found_version = false;
        let mut version: String = "0.0.0".to_string();
        let mut description: String = "".to_string();
        let mut home: Option<String> = None;
        let mut source_dir: Option<String> = None;
        let mut archive_root: Option<String> = None;
        let mut license: Vec<String> = vec![];
        let mut maintainers: Vec<String> = vec![];
        let mut artifacts: Vec<Artifact> = vec![];
        let mut build: Option<BuildVars> = None;
        let mut marker: Option<DependencyMarker> = None;
        let mut package: Option<PackageSpec> = None;
        let mut options: Option<RecipeOptions> = None;

        parse_string_into!(input, name, errors, "name of recipe");
        for node in input.nodes() {
            match node.name().value() {
                "version" => {
                    found_version = true;
                    parse_string_into!(node, version, errors, "version");
                }

                "description" => {
                    parse_string_into!(node, description, errors, "description");
                }

                "home" => {
                    parse_string_into!(node, home, errors, "home");
                }

                "source-dir" => {
                    parse_string_into!(node, source_dir, errors, "source-dir");
                }

                "archive-root" => {
                    parse_string_into!(node, archive_root, errors, "archive-root");
                }

                "license" => {
                    parse_string_list_into!(node, license, errors, "license");
                }

                "maintainer" => {
                    parse_string_list_into!(node, maintainers, errors, "maintainer");
                }

                "artifacts" => {
                    let (artifacts_opt, err) = Vec::<Artifact>::parse_node_with_errors(node);

                    if let Some(arts) = artifacts_opt {
                        artifacts.extend(arts);
                    }

                    errors.extend(err);
                }

                "build" => {
                    if build.is_some() {
                        errors.push(KilnParseError {
                            span: *node.span(),
                            label: Some("second definition of build here"),
                            help: None,
                            kind: "redefinition of build, can only have one build block",
                        });
                        continue;
                    }

                    let (vars, err) = BuildVars::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(vars) = vars {
                        build = Some(vars);
                    }
                }

                "marker" => {
                    let (mk, err) = DependencyMarker::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(mk) = mk {
                        marker = Some(mk);
                    }
                }

                "package" => {
                    let (pkg, err) = PackageSpec::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(pkg) = pkg {
                        package = Some(pkg);
                    }
                }

                "options" => {
                    let (opt, err) = RecipeOptions::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(opt) = opt {
                        options = Some(opt);
                    }
                }

                _ => {}
            }
        }

        if !found_version {
            errors.push(KilnParseError {
                span: *input.span(),
                label: None,
                help: None,
                kind: "recipe missing version",
            })
        }

        let recipe = Recipe {
            source_dir: source_dir.unwrap_or(format!("{}-{}", name, version)),
            name,
            version,
            description,
            home,
            license,
            maintainers,
            archive_root,
            artifacts,
            build: build.unwrap_or_default(),
            marker,
            package: package.unwrap_or_default(),
            options: options.unwrap_or_default(),
        };

        (Some(recipe), errors)
    }
}

impl ParseNode for Vec<Artifact> {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut data = vec![];
        let mut errors = vec![];

        for node in input.nodes() {
            let (art, err) = Artifact::parse_node_with_errors(node);
            errors.extend(err);

            if let Some(art) = art {
                data.push(art);
            }
        }

        (Some(data), errors)
    }
}

impl ParseNode for Artifact {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let (verification, mut errors) = Verification::parse_node_with_errors(input);

        let verification = if let Some(ver) = verification {
            ver
        } else {
            return (None, errors);
        };

        let (source, err) = ArtifactSource::parse_node_with_errors(input);
        errors.extend(err);

        let source = if let Some(source) = source {
            source
        } else {
            return (None, errors);
        };

        (
            Some(Artifact {
                source,
                verification,
            }),
            errors,
        )
    }
}

impl ParseNode for ArtifactSource {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        match input.name().value() {
            "fetch" => {
                let (obj, err) = FetchArtifact::parse_node_with_errors(input);
                (obj.map(ArtifactSource::Fetch), err)
            }

            _ => (
                None,
                vec![KilnParseError {
                    span: *input.name().span(),
                    label: None,
                    help: None,
                    kind: "Unknown type of artifact",
                }],
            ),
        }
    }
}

impl ParseNode for FetchArtifact {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut url = None;
        let mut errors = vec![];
        let mut file_name = None;
        for node in input.nodes() {
            match node.name().value() {
                "url" => {
                    parse_string_into!(node, url, errors, "url of artifact");
                }

                "name" => {
                    parse_string_into!(node, file_name, errors, "name of artifact");
                }

                _ => {}
            }
        }

        let res = if let Some(url) = url {
            Some(FetchArtifact {
                file_name: file_name.unwrap_or_else(|| {
                    url.rsplit('/')
                        .next()
                        .unwrap()
                        .split('?')
                        .next()
                        .unwrap()
                        .to_string()
                }),
                url,
            })
        } else {
            errors.push(KilnParseError {
                span: *input.span(),
                label: None,
                help: None,
                kind: "fetch artifact requires an url to be given",
            });
            None
        };

        (res, errors)
    }
}

impl ParseNode for Verification {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut sha256 = None;
        for node in input.nodes() {
            if node.name().value() == "sha256" {
                let mut str_sha = None;
                parse_string_into!(node, str_sha, errors, "sha256");

                if let Some(str_sha) = str_sha {
                    match hex::decode(str_sha) {
                        Ok(v) if v.len() != 32 => errors.push(KilnParseError {
                            span: *node.entries().first().unwrap().span(),
                            label: None,
                            help: None,
                            kind: "expected 32 byte long hex string for sha256",
                        }),
                        Ok(v) => sha256 = Some(v.try_into().unwrap()),
                        Err(v) => errors.push(KilnParseError {
                            span: *node.entries().first().unwrap().span(),
                            label: None,
                            help: Some(format!("{}", v)),
                            kind: "invalid hex string",
                        }),
                    }
                }
            }
        }

        (Some(Verification { sha256 }), errors)
    }
}

impl ParseNode for BuildVars {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut vars = BuildVars::default();
        let mut errors = vec![];

        for node in input.nodes() {
            match node.name().value() {
                "configure-script" => {
                    parse_string_into!(node, vars.configure_script, errors, "configure script");
                }

                "configure-args" => {
                    let mut args = vec![];
                    parse_string_list_into!(node, args, errors, "configure args");
                    vars.configure_args.extend(args);
                }

                "disable" => {
                    let mut modules = vec![];
                    parse_string_list_into!(node, modules, errors, "disable");
                    vars.disable.extend(modules);
                }

                "make-command" => {
                    parse_string_into!(node, vars.make_command, errors, "make command");
                }

                "qtconf-prefix" => {
                    parse_string_into!(node, vars.qtconf_prefix, errors, "qtconf prefix");
                }

                _ => {}
            }
        }

        (Some(vars), errors)
    }
}

impl ParseNode for DependencyMarker {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];

        let dependency = match extract_property_string(input, "dependency") {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let file = match extract_property_string(input, "file") {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        (
            dependency
                .zip(file)
                .map(|(dependency, file)| DependencyMarker { dependency, file }),
            errors,
        )
    }
}

impl ParseNode for PackageSpec {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut rules = vec![];
        let mut init = None;

        for node in input.nodes() {
            match node.name().value() {
                "copy" => {
                    let (rule, err) = CopyRule::parse_node_with_errors(node);
                    errors.extend(err);

                    if let Some(rule) = rule {
                        rules.push(rule);
                    }
                }

                "init" => {
                    if init.is_some() {
                        errors.push(KilnParseError {
                            span: *node.span(),
                            label: Some("second init definition"),
                            help: None,
                            kind: "only one init file can be declared",
                        });
                        continue;
                    }

                    let (rule, err) = InitRule::parse_node_with_errors(node);
                    errors.extend(err);
                    init = rule;
                }

                _ => {
                    errors.push(KilnParseError {
                        span: *node.span(),
                        label: None,
                        help: None,
                        kind: "unknown package rule",
                    });
                }
            }
        }

        (Some(PackageSpec { rules, init }), errors)
    }
}

impl ParseNode for CopyRule {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut pattern: String = "*".to_string();

        let positional: Vec<_> = input.entries().iter().filter(|e| e.name().is_none()).collect();
        match positional.len() {
            0 => {}
            1 => {
                if let Some(v) = positional[0].value().as_string() {
                    pattern = v.to_string();
                } else {
                    errors.push(KilnParseError {
                        span: *positional[0].span(),
                        label: None,
                        help: None,
                        kind: "copy pattern should be a string",
                    });
                }
            }
            _ => {
                errors.push(KilnParseError {
                    span: *input.span(),
                    label: None,
                    help: None,
                    kind: "copy expects at most one pattern",
                });
            }
        }

        let src = match extract_property_string(input, "src") {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let dst = match extract_property_string(input, "dst") {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let mut origin = CopyOrigin::Build;
        for entry in input.entries() {
            if entry.name().map_or(false, |n| n.value() == "from") {
                match entry.value().as_string() {
                    Some("build") => origin = CopyOrigin::Build,
                    Some("source") => origin = CopyOrigin::Source,
                    Some("dependency") => match extract_property_string(input, "dependency") {
                        Ok(name) => origin = CopyOrigin::Dependency(name),
                        Err(e) => errors.push(e),
                    },
                    _ => errors.push(KilnParseError {
                        span: *entry.span(),
                        label: None,
                        help: Some("expected \"build\", \"source\" or \"dependency\"".to_string()),
                        kind: "unknown copy origin",
                    }),
                }
            }
        }

        (
            src.zip(dst).map(|(src, dst)| CopyRule {
                pattern,
                src,
                dst,
                origin,
            }),
            errors,
        )
    }
}

impl ParseNode for InitRule {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut file: Option<String> = None;
        parse_string_into!(input, file, errors, "init file");

        let dst = match extract_property_string(input, "dst") {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(e);
                None
            }
        };

        (
            file.zip(dst).map(|(file, dst)| InitRule { file, dst }),
            errors,
        )
    }
}

impl ParseNode for RecipeOptions {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut shared = None;

        for node in input.nodes() {
            if node.name().value() == "shared" {
                parse_bool_into!(node, shared, errors, "shared");
            }
        }

        (Some(RecipeOptions { shared }), errors)
    }
}

impl ParseDocument for Profile {
    fn parse_document_with_errors(input: &KdlDocument) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut profile = Profile::default();

        for node in input.nodes() {
            if node.name().value() != "profile" {
                continue;
            }

            for node in node.nodes() {
                match node.name().value() {
                    "os" => {
                        let mut os: Option<String> = None;
                        parse_string_into!(node, os, errors, "os");

                        match os.as_deref().and_then(OsFamily::parse) {
                            Some(v) => profile.platform.os = v,
                            None => errors.push(KilnParseError {
                                span: *node.span(),
                                label: None,
                                help: Some(
                                    "expected \"linux\", \"macos\" or \"windows\"".to_string(),
                                ),
                                kind: "unknown os family",
                            }),
                        }
                    }

                    "compiler" => {
                        parse_string_into!(node, profile.platform.compiler, errors, "compiler");
                    }

                    "arch" => {
                        parse_string_into!(node, profile.platform.arch, errors, "arch");
                    }

                    "build-type" => {
                        parse_string_into!(node, profile.platform.build_type, errors, "build type");
                    }

                    "shared" => {
                        parse_bool_into!(node, profile.shared, errors, "shared");
                    }

                    "dependency" => {
                        let (dep, err) = DependencyPaths::parse_node_with_errors(node);
                        errors.extend(err);

                        if let Some(dep) = dep {
                            profile.deps.push(dep);
                        }
                    }

                    _ => {}
                }
            }
        }

        (Some(profile), errors)
    }
}

impl ParseNode for DependencyPaths {
    fn parse_node_with_errors(input: &KdlNode) -> (Option<Self>, Vec<KilnParseError>)
    where
        Self: Sized,
    {
        let mut errors = vec![];
        let mut name = String::new();
        parse_string_into!(input, name, errors, "name of dependency");

        let mut include_dirs = vec![];
        let mut package_dir: Option<String> = None;
        for node in input.nodes() {
            match node.name().value() {
                "include" => {
                    let mut dirs: Vec<String> = vec![];
                    parse_string_list_into!(node, dirs, errors, "include dirs");
                    include_dirs.extend(dirs.into_iter().map(PathBuf::from));
                }

                "package" => {
                    parse_string_into!(node, package_dir, errors, "package dir");
                }

                _ => {}
            }
        }

        (
            Some(DependencyPaths {
                name,
                include_dirs,
                package_dir: package_dir.map(PathBuf::from),
            }),
            errors,
        )
    }
}

fn extract_property_string(input: &KdlNode, name: &'static str) -> Result<String, KilnParseError> {
    for entry in input.entries() {
        if entry.name().map_or(false, |n| n.value() == name) {
            return if let Some(v) = entry.value().as_string() {
                Ok(v.to_string())
            } else {
                Err(KilnParseError {
                    span: *entry.span(),
                    label: None,
                    help: None,
                    kind: "property should be a string",
                })
            };
        }
    }

    Err(KilnParseError {
        span: *input.name().span(),
        label: Some("property missing on this node"),
        help: Some(format!("add {}=\"...\"", name)),
        kind: "missing property",
    })
}

pub(crate) fn extract_single_bool_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<bool, KilnParseError> {
    match input.entries().len() {
        0 => Err(KilnParseError {
            span: *input.name().span(),
            label: None,
            help: None,
            kind: missing_error,
        }),

        1 => {
            let name_entry = input.entries().first().unwrap();

            if name_entry.name().is_some() {
                return Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: property_found_error,
                });
            }

            if let Some(v) = name_entry.value().as_bool() {
                Ok(v)
            } else {
                Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: wrong_type_error,
                })
            }
        }

        _ => Err(KilnParseError {
            span: entries_span(input),
            label: None,
            help: None,
            kind: too_many_error,
        }),
    }
}

pub(crate) fn extract_single_string_value(
    input: &KdlNode,
    missing_error: &'static str,
    wrong_type_error: &'static str,
    too_many_error: &'static str,
    property_found_error: &'static str,
) -> Result<String, KilnParseError> {
    match input.entries().len() {
        0 => Err(KilnParseError {
            span: *input.name().span(),
            label: None,
            help: None,
            kind: missing_error,
        }),

        1 => {
            let name_entry = input.entries().first().unwrap();

            if name_entry.name().is_some() {
                return Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: property_found_error,
                });
            }

            if let Some(v) = name_entry.value().as_string() {
                Ok(v.to_string())
            } else {
                Err(KilnParseError {
                    span: *name_entry.span(),
                    label: None,
                    help: None,
                    kind: wrong_type_error,
                })
            }
        }

        _ => Err(KilnParseError {
            span: entries_span(input),
            label: None,
            help: None,
            kind: too_many_error,
        }),
    }
}

pub(crate) fn extract_string_values(
    input: &KdlNode,
    wrong_type_error: &'static str,
    property_found_error: &'static str,
) -> Result<Vec<String>, KilnParseError> {
    let mut values = vec![];

    for entry in input.entries() {
        if entry.name().is_some() {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: property_found_error,
            });
        }

        if let Some(v) = entry.value().as_string() {
            values.push(v.to_string());
        } else {
            return Err(KilnParseError {
                span: *entry.span(),
                label: None,
                help: None,
                kind: wrong_type_error,
            });
        }
    }

    Ok(values)
}

fn entries_span(input: &KdlNode) -> SourceSpan {
    let start_args = input.entries().first().unwrap().span().offset();
    let end_args = input
        .entries()
        .last()
        .map(|x| x.span().len() + x.span().offset())
        .unwrap();

    SourceSpan::new(start_args.into(), (end_args - start_args).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CopyOrigin;
    use std::path::Path;

    const RECIPE: &str = r#"
recipe "pyqt5" {
    version "5.11.3"
    description "Python binding for Qt5"
    home "https://www.riverbankcomputing.com/software/pyqt/"
    license "GPL-3.0-only"
    source-dir "pyqt-src"
    archive-root "PyQt5_gpl-{{version}}"

    artifacts {
        fetch {
            url "https://example.org/PyQt5_gpl-{{version}}.tar.gz"
            sha256 "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        }
    }

    build {
        configure-script "python configure.py"
        disable "QtNfc"
        qtconf-prefix "Qt"
    }

    marker dependency="sip" file="sip.h"

    options {
        shared true
    }

    package {
        copy "LICENSE" src="." dst="licenses" from="source"
        copy "*" src="bin" dst="bin"
        copy "*.h" src="include" dst="include"
        init "pyqt5_init.py" dst="PyQt5/__init__.py"
    }
}
"#;

    const PROFILE: &str = r#"
profile {
    os "linux"
    compiler "gcc"
    arch "x86_64"
    build-type "Release"
    shared true

    dependency "sip" {
        include "/opt/sip/include" "/opt/sip2/include"
        package "/opt/sip"
    }
}
"#;

    #[test]
    fn parses_full_recipe() {
        let doc: KdlDocument = RECIPE.parse().unwrap();
        let document = Document::parse_document_strict(&doc, RECIPE, None).unwrap();

        assert_eq!(document.recipes.len(), 1);
        let recipe = &document.recipes[0];
        assert_eq!(recipe.name, "pyqt5");
        assert_eq!(recipe.version, "5.11.3");
        assert_eq!(recipe.source_dir, "pyqt-src");
        assert_eq!(recipe.archive_root.as_deref(), Some("PyQt5_gpl-{{version}}"));
        assert_eq!(recipe.artifacts.len(), 1);
        assert!(recipe.artifacts[0].verification.sha256.is_some());
        assert_eq!(recipe.build.disable, vec!["QtNfc".to_string()]);
        assert_eq!(recipe.options.shared, Some(true));

        let marker = recipe.marker.as_ref().unwrap();
        assert_eq!(marker.dependency, "sip");
        assert_eq!(marker.file, "sip.h");

        assert_eq!(recipe.package.rules.len(), 3);
        assert_eq!(recipe.package.rules[0].origin, CopyOrigin::Source);
        assert_eq!(recipe.package.rules[1].origin, CopyOrigin::Build);

        let init = recipe.package.init.as_ref().unwrap();
        assert_eq!(init.file, "pyqt5_init.py");
        assert_eq!(init.dst, "PyQt5/__init__.py");
    }

    #[test]
    fn parses_profile() {
        let doc: KdlDocument = PROFILE.parse().unwrap();
        let profile = Profile::parse_document_strict(&doc, PROFILE, None).unwrap();

        assert_eq!(profile.platform.os, OsFamily::Linux);
        assert_eq!(profile.platform.compiler, "gcc");
        assert_eq!(profile.shared, Some(true));
        assert_eq!(
            profile.include_dirs("sip"),
            &[
                PathBuf::from("/opt/sip/include"),
                PathBuf::from("/opt/sip2/include")
            ]
        );
        assert!(profile.include_dirs("qt").is_empty());
        assert_eq!(profile.package_dir("sip"), Some(Path::new("/opt/sip")));
        assert_eq!(profile.package_dir("qt"), None);
    }

    #[test]
    fn profile_with_unknown_os_is_an_error() {
        let source = r#"profile { os "solaris"; }"#;
        let doc: KdlDocument = source.parse().unwrap();

        let (_, errors) = Profile::parse_document_with_errors(&doc);
        assert!(errors.iter().any(|e| e.kind == "unknown os family"));

        // the strict entry point used by the binary must refuse the document
        assert!(Profile::parse_document_strict(&doc, source, None).is_err());
    }

    #[test]
    fn copy_rule_can_take_a_dependency_origin() {
        let source = r#"
recipe "pyqt5" {
    version "5.11.3"
    package {
        copy "**" src="site-packages" dst="site-packages" from="dependency" dependency="sip"
    }
}
"#;
        let doc: KdlDocument = source.parse().unwrap();
        let document = Document::parse_document_strict(&doc, source, None).unwrap();

        let rule = &document.recipes[0].package.rules[0];
        assert_eq!(rule.origin, CopyOrigin::Dependency("sip".to_string()));
    }

    #[test]
    fn dependency_origin_requires_the_dependency_name() {
        let source = r#"
recipe "pyqt5" {
    version "5.11.3"
    package {
        copy "**" src="site-packages" dst="site-packages" from="dependency"
    }
}
"#;
        let doc: KdlDocument = source.parse().unwrap();
        let (_, errors) = Document::parse_document_with_errors(&doc);

        assert!(errors.iter().any(|e| e.kind == "missing property"));
    }

    #[test]
    fn missing_version_is_an_error() {
        let source = r#"recipe "broken" { description "no version"; }"#;
        let doc: KdlDocument = source.parse().unwrap();
        let (document, errors) = Document::parse_document_with_errors(&doc);

        assert!(document.is_some());
        assert!(errors.iter().any(|e| e.kind == "recipe missing version"));
    }

    #[test]
    fn copy_rule_requires_src_and_dst() {
        let source = r#"
recipe "broken" {
    version "1.0"
    package {
        copy "*" dst="bin"
    }
}
"#;
        let doc: KdlDocument = source.parse().unwrap();
        let (document, errors) = Document::parse_document_with_errors(&doc);

        assert!(errors.iter().any(|e| e.kind == "missing property"));
        let recipe = &document.unwrap().recipes[0];
        assert!(recipe.package.rules.is_empty());
    }
}
