//! Jinja2-style expression evaluation and template rendering.

mod engine;

pub use engine::TemplateEngine;
