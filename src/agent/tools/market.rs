use serde_json::{Value, json};

use super::backend::Fetch;
use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, required_str};

pub struct MarketPricesTool;

impl Tool for MarketPricesTool {
    fn kind(&self) -> ToolKind { ToolKind::MarketPrices }

    fn description(&self) -> &'static str {
        "Get current market prices (mandi prices) for agricultural commodities. Use this when the user asks \
         about crop prices, mandi rates, selling prices, or market information."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "commodity": {"type": "string", "description": "Name of the crop/commodity (e.g., wheat, rice, tomato)"},
                "location": {"type": "string", "description": "Market location or state name"},
            }),
            &["commodity", "location"],
        )
    }

    fn run<'a>(&'a self, ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let commodity = required_str(&args, "commodity")?;
            let location = required_str(&args, "location")?;
            let params = [("commodity", commodity), ("location", location)];
            let res = match ctx.backend.get_json(&ctx.backend.urls.market, "/api/market", &params).await {
                Fetch::Ok(data) => ToolResult::json(format!("prices for {commodity} in {location}"), data),
                Fetch::Status => ToolResult::text(format!("Could not fetch market prices for {commodity} in {location}.")),
                Fetch::Failed(e) => {
                    tracing::error!(session_id = ctx.session_id, error = %e, "market api error");
                    ToolResult::text(format!("Market price service temporarily unavailable. Error: {e}"))
                }
            };
            Ok(res)
        })
    }
}
