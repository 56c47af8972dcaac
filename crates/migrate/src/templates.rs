//! Built-in templates for the generated migrator crate and for scaffolding

use tera::{Context, Tera};

use crate::error::MigrateResult;

pub const ENTRY_CARGO_TOML: &str = "entry_cargo.toml";
pub const ENTRY_MAIN: &str = "entry_main.rs";
pub const MIGRATION: &str = "migration.rs";
pub const SEEDER: &str = "seeder.rs";

/// Template engine preloaded with the built-in templates
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new() -> MigrateResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            (ENTRY_CARGO_TOML, include_str!("templates/entry_cargo.toml.tera")),
            (ENTRY_MAIN, include_str!("templates/entry_main.rs.tera")),
            (MIGRATION, include_str!("templates/migration.rs.tera")),
            (SEEDER, include_str!("templates/seeder.rs.tera")),
        ])?;
        tera.autoescape_on(vec![]);

        Ok(Self { tera })
    }

    pub fn render_with_context(&self, template: &str, context: &Context) -> MigrateResult<String> {
        Ok(self.tera.render(template, context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_main_calls_registry_hook() {
        let engine = TemplateEngine::new().unwrap();
        let mut context = Context::new();
        context.insert("entry_fn", "migrate_main");
        context.insert("crate_name", "blog_app");
        context.insert("module_path", "database::migrations");

        let main = engine.render_with_context(ENTRY_MAIN, &context).unwrap();
        assert!(main.contains(
            "elif_migrate::child::migrate_main(blog_app::database::migrations::registry())"
        ));
    }

    #[test]
    fn test_no_html_escaping() {
        let engine = TemplateEngine::new().unwrap();
        let mut context = Context::new();
        context.insert("bin_name", "elif-migrator");
        context.insert("project_package", "blog-app");
        context.insert("project_dependency", "path = \"/srv/blog & co\"\n");
        context.insert("migrate_dependency", "version = \"0.1\"\n");

        let manifest = engine.render_with_context(ENTRY_CARGO_TOML, &context).unwrap();
        assert!(manifest.contains("path = \"/srv/blog & co\""));
        assert!(manifest.contains("[dependencies.blog-app]"));
        assert!(manifest.trim_end().ends_with("[workspace]"));
    }
}
