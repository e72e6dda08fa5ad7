//! Template engine implementation using minijinja.

use minijinja::{Environment, UndefinedBehavior, Value};

use crate::error::StepError;

/// Expression evaluator and template renderer with Jinja2-compatible syntax.
///
/// Undefined variables are errors, never silently empty.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }

    /// Evaluate a bare expression (`count > 3`, `user.tags`) to a JSON value.
    ///
    /// An expression wrapped in a single `{{ ... }}` is unwrapped first.
    pub fn eval_expression(
        &self,
        expression: &str,
        context: &serde_json::Value,
    ) -> Result<serde_json::Value, StepError> {
        let source = unwrap_expression(expression);
        let compiled = self
            .env
            .compile_expression_owned(source.to_string())
            .map_err(|e| StepError::Evaluation(format!("invalid expression '{}': {}", source, e)))?;

        let value = compiled
            .eval(context)
            .map_err(|e| StepError::Evaluation(format!("'{}': {}", source, e)))?;

        if value.is_undefined() {
            return Err(StepError::Evaluation(format!("'{}' is undefined", source)));
        }

        to_json(&value)
    }

    /// Evaluate an expression and coerce the result to a boolean.
    pub fn eval_truthy(
        &self,
        expression: &str,
        context: &serde_json::Value,
    ) -> Result<bool, StepError> {
        let value = self.eval_expression(expression, context)?;
        Ok(Value::from_serialize(&value).is_true())
    }

    /// Render a template string.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, StepError> {
        if !Self::is_template(template) {
            return Ok(template.to_string());
        }
        self.env
            .render_str(template, context)
            .map_err(|e| StepError::Evaluation(format!("template render error: {}", e)))
    }

    /// Render a nested structure recursively.
    ///
    /// A string that is exactly one `{{ expr }}` keeps the expression's type,
    /// so `"{{ item.count }}"` yields a number rather than its text.
    pub fn render_value(
        &self,
        value: &serde_json::Value,
        context: &serde_json::Value,
    ) -> Result<serde_json::Value, StepError> {
        match value {
            serde_json::Value::String(s) if is_single_expression(s) => {
                self.eval_expression(s, context)
            }
            serde_json::Value::String(s) if Self::is_template(s) => {
                Ok(serde_json::Value::String(self.render(s, context)?))
            }
            serde_json::Value::Object(obj) => {
                let mut result = serde_json::Map::new();
                for (k, v) in obj {
                    result.insert(k.clone(), self.render_value(v, context)?);
                }
                Ok(serde_json::Value::Object(result))
            }
            serde_json::Value::Array(arr) => {
                let result: Result<Vec<_>, _> = arr
                    .iter()
                    .map(|v| self.render_value(v, context))
                    .collect();
                Ok(serde_json::Value::Array(result?))
            }
            _ => Ok(value.clone()),
        }
    }

    /// Check if a string contains template syntax.
    pub fn is_template(s: &str) -> bool {
        (s.contains("{{") && s.contains("}}")) || (s.contains("{%") && s.contains("%}"))
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine").finish_non_exhaustive()
    }
}

/// `{{ expr }}` with nothing around it and no second placeholder.
fn is_single_expression(s: &str) -> bool {
    let trimmed = s.trim();
    if !(trimmed.starts_with("{{") && trimmed.ends_with("}}")) || trimmed.len() < 4 {
        return false;
    }
    let inner = &trimmed[2..trimmed.len() - 2];
    !inner.contains("{{") && !inner.contains("}}")
}

fn unwrap_expression(expression: &str) -> &str {
    let trimmed = expression.trim();
    if is_single_expression(trimmed) {
        trimmed[2..trimmed.len() - 2].trim()
    } else {
        trimmed
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, StepError> {
    serde_json::to_value(value)
        .map_err(|e| StepError::Evaluation(format!("result is not representable as JSON: {}", e)))
}
