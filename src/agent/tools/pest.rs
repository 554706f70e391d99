use serde_json::{Value, json};

use super::backend::Fetch;
use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, optional_str, required_str};

pub struct PestInformationTool;

impl Tool for PestInformationTool {
    fn kind(&self) -> ToolKind { ToolKind::PestInformation }

    fn description(&self) -> &'static str {
        "Get information about agricultural pests, diseases, and their management. Use this when the user \
         asks about pest identification, pest control, disease management, or pesticide recommendations."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "pest_name": {"type": "string", "description": "Name of the pest or disease"},
                "crop": {"type": "string", "description": "Optional crop name for specific advice"},
            }),
            &["pest_name"],
        )
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let pest = required_str(&args, "pest_name")?;
            let mut params = vec![("pest", pest)];
            if let Some(crop) = optional_str(&args, "crop") {
                params.push(("crop", crop));
            }
            let res = match ctx.backend.get_json(&ctx.backend.urls.pest, "/api/pest", &params).await {
                Fetch::Ok(data) => ToolResult::json(format!("pest info for {pest}"), data),
                Fetch::Status => ToolResult::text(format!("Could not fetch pest information for {pest}. Please try again.")),
                Fetch::Failed(e) => {
                    tracing::error!(session_id = ctx.session_id, error = %e, "pest api error");
                    ToolResult::text(format!("Pest information service temporarily unavailable. Error: {e}"))
                }
            };
            Ok(res)
        })
    }
}
