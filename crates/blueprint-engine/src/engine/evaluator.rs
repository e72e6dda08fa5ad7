//! Expression evaluation for conditions, loops and bound inputs.
//!
//! Every function here reads the context and never mutates it.

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::template::TemplateEngine;

/// Pure evaluator over an execution context.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    engine: TemplateEngine,
}

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self {
            engine: TemplateEngine::new(),
        }
    }

    /// Evaluate an expression to a JSON value.
    pub fn evaluate(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        self.engine
            .eval_expression(expression, &ctx.to_template_context())
    }

    /// Evaluate a condition expression to a boolean.
    pub fn evaluate_condition(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
    ) -> Result<bool, StepError> {
        self.engine
            .eval_truthy(expression, &ctx.to_template_context())
    }

    /// Evaluate a loop source to its ordered elements.
    pub fn evaluate_sequence(
        &self,
        expression: &str,
        ctx: &ExecutionContext,
    ) -> Result<Vec<serde_json::Value>, StepError> {
        match self.evaluate(expression, ctx)? {
            serde_json::Value::Array(items) => Ok(items),
            other => Err(StepError::Evaluation(format!(
                "'{}' did not evaluate to a sequence (got {})",
                expression,
                json_type_name(&other)
            ))),
        }
    }

    /// Bind an action's parameters against the context.
    pub fn render_parameters(
        &self,
        parameters: &serde_json::Value,
        ctx: &ExecutionContext,
    ) -> Result<serde_json::Value, StepError> {
        self.engine
            .render_value(parameters, &ctx.to_template_context())
    }

    /// Bind a prompt template against the context.
    pub fn render_prompt(&self, prompt: &str, ctx: &ExecutionContext) -> Result<String, StepError> {
        self.engine.render(prompt, &ctx.to_template_context())
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx() -> ExecutionContext {
        let mut ctx = ExecutionContext::new("auto-1", Uuid::new_v4());
        ctx.set_variable("items", json!(["a", "b", "c"]));
        ctx.set_variable("count", json!(5));
        ctx.record_output("fetch", json!({"status": 200}));
        ctx
    }

    #[test]
    fn test_evaluate_condition() {
        let evaluator = ExpressionEvaluator::new();
        let ctx = ctx();

        assert!(evaluator.evaluate_condition("count > 3", &ctx).unwrap());
        assert!(evaluator
            .evaluate_condition("steps.fetch.status == 200", &ctx)
            .unwrap());
        assert!(!evaluator.evaluate_condition("count > 10", &ctx).unwrap());
    }

    #[test]
    fn test_evaluate_sequence() {
        let evaluator = ExpressionEvaluator::new();
        let ctx = ctx();

        let items = evaluator.evaluate_sequence("items", &ctx).unwrap();
        assert_eq!(items, vec![json!("a"), json!("b"), json!("c")]);

        let items = evaluator.evaluate_sequence("[]", &ctx).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_evaluate_sequence_rejects_scalars() {
        let evaluator = ExpressionEvaluator::new();
        let err = evaluator.evaluate_sequence("count", &ctx()).unwrap_err();
        match err {
            StepError::Evaluation(msg) => assert!(msg.contains("number")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_evaluation_does_not_mutate_context() {
        let evaluator = ExpressionEvaluator::new();
        let ctx = ctx();
        let before = ctx.to_template_context();

        let _ = evaluator.evaluate("count * 2", &ctx);
        let _ = evaluator.evaluate("undefined_var", &ctx);

        assert_eq!(ctx.to_template_context(), before);
    }

    #[test]
    fn test_render_prompt() {
        let evaluator = ExpressionEvaluator::new();
        let prompt = evaluator
            .render_prompt("Summarize {{ items | join(', ') }}", &ctx())
            .unwrap();
        assert_eq!(prompt, "Summarize a, b, c");
    }
}
