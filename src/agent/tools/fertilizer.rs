use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, optional_str, required_str};

pub struct FertilizerTool;

/// (crop, base dose, timing, micronutrients)
const RECOMMENDATIONS: &[(&str, &str, &str, &str)] = &[
    (
        "wheat",
        "NPK 120:60:40 kg/ha",
        "Apply 50% N + full P + full K at sowing, remaining N in 2 splits",
        "Zinc sulfate 25 kg/ha if deficient",
    ),
    (
        "rice",
        "NPK 120:60:60 kg/ha",
        "Apply 50% N + full P + full K at transplanting",
        "Zinc sulfate 25 kg/ha in zinc deficient soils",
    ),
    (
        "cotton",
        "NPK 150:60:60 kg/ha",
        "Apply in 3-4 splits during crop growth",
        "Boron and Magnesium sprays during flowering",
    ),
    (
        "sugarcane",
        "NPK 250:60:60 kg/ha",
        "Apply N in 3 splits, P and K at planting",
        "Iron and Zinc if deficient",
    ),
    (
        "tomato",
        "NPK 120:60:60 kg/ha",
        "Basal dose + top dressing at flowering",
        "Calcium for preventing blossom end rot",
    ),
];

pub fn recommend(crop: &str, soil_type: Option<&str>, location: Option<&str>) -> Value {
    let key = crop.to_lowercase();
    match RECOMMENDATIONS.iter().find(|(name, ..)| *name == key) {
        Some((_, base, timing, micronutrients)) => json!({
            "crop": crop,
            "recommendation": {"base": base, "timing": timing, "micronutrients": micronutrients},
            "soil_type": soil_type.unwrap_or("general"),
            "location": location.unwrap_or("India"),
            "note": "Get soil tested for precise recommendations. Contact your local KVK for detailed advice.",
        }),
        None => json!({
            "crop": crop,
            "recommendation": "General NPK 100:50:50 kg/ha as base. Adjust based on soil test.",
            "note": "For specific recommendations, please consult your local agricultural officer or KVK.",
        }),
    }
}

impl Tool for FertilizerTool {
    fn kind(&self) -> ToolKind { ToolKind::FertilizerRecommendation }

    fn description(&self) -> &'static str {
        "Get fertilizer recommendations for crops based on soil type and region. Use this when the user \
         asks about fertilizers, nutrients, soil health, or crop nutrition."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "crop": {"type": "string", "description": "Name of the crop"},
                "soil_type": {"type": "string", "description": "Type of soil (e.g., clay, sandy, loamy)"},
                "location": {"type": "string", "description": "Location for regional recommendations"},
            }),
            &["crop"],
        )
    }

    fn run<'a>(&'a self, _ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let crop = required_str(&args, "crop")?;
            let data = recommend(crop, optional_str(&args, "soil_type"), optional_str(&args, "location"));
            Ok(ToolResult::json(format!("fertilizer plan for {crop}"), data))
        })
    }
}
