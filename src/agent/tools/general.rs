use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, required_str};

/// Hands the question back so the model answers it directly.
pub struct GeneralQueryTool;

impl Tool for GeneralQueryTool {
    fn kind(&self) -> ToolKind { ToolKind::GeneralQuery }

    fn description(&self) -> &'static str {
        "Handle general agricultural queries that don't fit other specific tools. Use this for questions \
         about farming techniques, government schemes, organic farming, irrigation methods, seed selection, etc."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({"query": {"type": "string", "description": "The user's agricultural question"}}),
            &["query"],
        )
    }

    fn run<'a>(&'a self, _ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let query = required_str(&args, "query")?;
            Ok(ToolResult::text(format!(
                "Please provide helpful agricultural advice for: {query}. Include practical tips relevant to Indian farmers."
            )))
        })
    }
}
