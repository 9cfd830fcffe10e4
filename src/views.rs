use std::sync::Arc;

use axum::response::Html;
use minijinja::Environment;
use serde::Serialize;

use crate::error::Result;

const TEMPLATES: &[(&str, &str)] = &[
    ("home.html", include_str!("../templates/home.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("logout.html", include_str!("../templates/logout.html")),
];

/// The compiled page templates.
#[derive(Clone)]
pub struct Views {
    env: Arc<Environment<'static>>,
}

impl Views {
    /// Compiles every embedded template.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env: Arc::new(env) })
    }

    /// Renders `name` with `context`.
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<Html<String>> {
        let html = self.env.get_template(name)?.render(context)?;
        Ok(Html(html))
    }
}
