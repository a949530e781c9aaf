use crate::definition::parsing::{KilnParserCompoundError, ParseDocument};
use crate::definition::{Document, Profile, Recipe, RecipeTemplate};
use crate::engine::packager::TreePackager;
use crate::engine::Engine;
use handlebars::Handlebars;
use kdl::KdlDocument;
use kiln_utils::{StringWalker, WalkStrings};
use miette::NamedSource;

mod definition;
mod engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let recipe_source = include_str!("../recipes/pyqt5.kdl");
    let kdl_document: KdlDocument = recipe_source.parse()?;
    let (document, errors) = Document::parse_document_with_errors(&kdl_document);

    if !errors.is_empty() {
        let error = miette::Error::new(KilnParserCompoundError {
            source_code: NamedSource::new("pyqt5.kdl", recipe_source),
            errors,
        });

        println!("{:?}", error);
    }

    let document = document.map(|mut x| {
        x.recipes.iter_mut().for_each(|y| {
            let vars = y.template_vars();
            y.walk(&mut TemplateReplace {
                engine: Default::default(),
                vars,
            })
        });
        x
    });

    let profile_source = include_str!("../recipes/profile.kdl");
    let profile_document: KdlDocument = profile_source.parse()?;
    let profile =
        Profile::parse_document_strict(&profile_document, profile_source, Some("profile.kdl"))
            .map_err(|e| anyhow::anyhow!(e))?;

    if let Some(doc) = document {
        let engine = Engine::new::<TreePackager>();

        engine.prepare_engine().await?;
        let contribution = engine.build_recipe(&doc.recipes[0], &profile).await?;

        println!("{:#?}", contribution);
    }

    Ok(())
}

pub struct TemplateReplace<'a> {
    engine: Handlebars<'a>,
    vars: RecipeTemplate,
}

impl StringWalker for TemplateReplace<'_> {
    fn enter_string(&mut self, value: &mut String) {
        *value = self.engine.render_template(value, &self.vars).unwrap();
    }
}
