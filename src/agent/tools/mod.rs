use std::future::Future;
use std::pin::Pin;

use serde_json::{Value, json};

use crate::models::ToolSchema;
use crate::session::ToolInvocation;

pub mod backend;
pub mod calendar;
pub mod fertilizer;
pub mod general;
pub mod market;
pub mod pest;
pub mod weather;

pub use backend::BackendClient;

pub struct ToolContext<'a> {
    pub backend: &'a BackendClient,
    pub session_id: &'a str,
}

pub struct ToolResult {
    pub summary: String,
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn text(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), data: None }
    }

    pub fn json(summary: impl Into<String>, data: Value) -> Self {
        Self { summary: summary.into(), data: Some(data) }
    }

    /// Content handed back to the model.
    pub fn into_content(self) -> String {
        match self.data {
            Some(Value::String(s)) => s,
            Some(v) => v.to_string(),
            None => self.summary,
        }
    }
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<ToolResult>> + Send + 'a>>;

pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;
    fn description(&self) -> &'static str;
    fn parameters(&self) -> Value;
    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a>;
}

/// The closed set of capabilities the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    WeatherAdvisory,
    PestInformation,
    MarketPrices,
    FertilizerRecommendation,
    CropCalendar,
    GeneralQuery,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::WeatherAdvisory,
        ToolKind::PestInformation,
        ToolKind::MarketPrices,
        ToolKind::FertilizerRecommendation,
        ToolKind::CropCalendar,
        ToolKind::GeneralQuery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::WeatherAdvisory => "get_weather_advisory",
            ToolKind::PestInformation => "get_pest_information",
            ToolKind::MarketPrices => "get_market_prices",
            ToolKind::FertilizerRecommendation => "get_fertilizer_recommendation",
            ToolKind::CropCalendar => "get_crop_calendar",
            ToolKind::GeneralQuery => "general_agriculture_query",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self { Self { tools: Vec::new() } }

    pub fn with_default_tools() -> Self {
        let mut r = Self::new();
        r.register(Box::new(weather::WeatherAdvisoryTool));
        r.register(Box::new(pest::PestInformationTool));
        r.register(Box::new(market::MarketPricesTool));
        r.register(Box::new(fertilizer::FertilizerTool));
        r.register(Box::new(calendar::CropCalendarTool));
        r.register(Box::new(general::GeneralQueryTool));
        r
    }

    pub fn register(&mut self, t: Box<dyn Tool>) {
        self.tools.retain(|existing| existing.kind() != t.kind());
        self.tools.push(t);
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.kind() == kind)
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.kind().name().into(),
                description: t.description().into(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Run one model-requested call. Never fails: every problem becomes the
    /// string the model sees as the tool result.
    pub async fn dispatch(&self, ctx: ToolContext<'_>, call: &ToolInvocation) -> String {
        let Some(tool) = ToolKind::from_name(&call.name).and_then(|k| self.get(k)) else {
            tracing::warn!(session_id = ctx.session_id, tool = %call.name, "model requested unknown tool");
            return format!("Error: unknown tool '{}'. Available tools: {}.", call.name, self.names().join(", "));
        };
        let args = match parse_arguments(&call.arguments) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!(session_id = ctx.session_id, tool = %call.name, error = %e, "malformed tool arguments");
                return format!("Error: invalid arguments for {}: {e}", call.name);
            }
        };
        let session_id = ctx.session_id;
        match tool.run(ctx, args).await {
            Ok(res) => {
                tracing::debug!(session_id, tool = %call.name, summary = %res.summary, "tool finished");
                res.into_content()
            }
            Err(e) => {
                tracing::warn!(session_id, tool = %call.name, error = %e, "tool failed");
                format!("Error running {}: {e}", call.name)
            }
        }
    }

    fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.kind().name()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self { Self::with_default_tools() }
}

fn parse_arguments(raw: &str) -> anyhow::Result<Value> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    let v: Value = serde_json::from_str(raw)?;
    if !v.is_object() {
        anyhow::bail!("expected a JSON object");
    }
    Ok(v)
}

pub(crate) fn required_str<'v>(args: &'v Value, key: &str) -> anyhow::Result<&'v str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("missing {key}"))
}

pub(crate) fn optional_str<'v>(args: &'v Value, key: &str) -> Option<&'v str> {
    args.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|s| !s.is_empty())
}

pub(crate) fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({"type": "object", "properties": properties, "required": required})
}
