use serde_json::{Value, json};

use super::backend::Fetch;
use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, optional_str, required_str};

pub struct WeatherAdvisoryTool;

impl Tool for WeatherAdvisoryTool {
    fn kind(&self) -> ToolKind { ToolKind::WeatherAdvisory }

    fn description(&self) -> &'static str {
        "Get weather information and agricultural advisory for a location. Use this when the user asks \
         about weather, climate, rainfall, temperature, or needs weather-based farming advice."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "location": {"type": "string", "description": "The city or village name in India"},
                "crop": {"type": "string", "description": "Optional crop name for specific advisory"},
            }),
            &["location"],
        )
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let location = required_str(&args, "location")?;
            let mut params = vec![("location", location)];
            if let Some(crop) = optional_str(&args, "crop") {
                params.push(("crop", crop));
            }
            let res = match ctx.backend.get_json(&ctx.backend.urls.weather, "/api/weather", &params).await {
                Fetch::Ok(data) => ToolResult::json(format!("weather for {location}"), data),
                Fetch::Status => ToolResult::text(format!("Could not fetch weather data for {location}. Please try again.")),
                Fetch::Failed(e) => {
                    tracing::error!(session_id = ctx.session_id, error = %e, "weather api error");
                    ToolResult::text(format!("Weather service temporarily unavailable. Error: {e}"))
                }
            };
            Ok(res)
        })
    }
}
