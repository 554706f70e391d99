use serde_json::{Value, json};

use super::{Tool, ToolContext, ToolFuture, ToolKind, ToolResult, object_schema, optional_str, required_str};

pub struct CropCalendarTool;

struct Calendar {
    crop: &'static str,
    season: &'static str,
    sowing: &'static str,
    harvesting: &'static str,
    duration: &'static str,
    activities: &'static [&'static str],
}

const CALENDARS: &[Calendar] = &[
    Calendar {
        crop: "wheat",
        season: "Rabi",
        sowing: "October-November",
        harvesting: "March-April",
        duration: "120-150 days",
        activities: &[
            "Land preparation: September-October",
            "Sowing: October 15 - November 15",
            "First irrigation: 20-25 days after sowing",
            "Top dressing: 30-35 days after sowing",
            "Harvesting: March-April",
        ],
    },
    Calendar {
        crop: "rice",
        season: "Kharif",
        sowing: "June-July (transplanting)",
        harvesting: "October-November",
        duration: "120-150 days",
        activities: &[
            "Nursery: May-June",
            "Transplanting: June-July",
            "Weeding: 20-40 days after transplanting",
            "Top dressing: Tillering and panicle stages",
            "Harvesting: October-November",
        ],
    },
    Calendar {
        crop: "cotton",
        season: "Kharif",
        sowing: "April-May",
        harvesting: "October-January",
        duration: "150-180 days",
        activities: &[
            "Land preparation: March-April",
            "Sowing: April-May",
            "Thinning: 15-20 days after sowing",
            "First picking: October",
            "Multiple pickings till January",
        ],
    },
];

pub fn calendar_for(crop: &str, location: Option<&str>) -> Value {
    let key = crop.to_lowercase();
    match CALENDARS.iter().find(|c| c.crop == key) {
        Some(c) => json!({
            "crop": crop,
            "season": c.season,
            "sowing": c.sowing,
            "harvesting": c.harvesting,
            "duration": c.duration,
            "activities": c.activities,
            "location": location.unwrap_or("North India (adjust for your region)"),
        }),
        None => json!({
            "crop": crop,
            "message": "Crop calendar not available. Please consult local agricultural department.",
            "general_tip": "Kharif crops: June-October, Rabi crops: October-March, Zaid crops: March-June",
        }),
    }
}

impl Tool for CropCalendarTool {
    fn kind(&self) -> ToolKind { ToolKind::CropCalendar }

    fn description(&self) -> &'static str {
        "Get crop calendar and seasonal farming activities. Use this when the user asks about sowing time, \
         harvesting time, crop seasons, or farming schedule."
    }

    fn parameters(&self) -> Value {
        object_schema(
            json!({
                "crop": {"type": "string", "description": "Name of the crop"},
                "location": {"type": "string", "description": "Location for regional calendar"},
            }),
            &["crop"],
        )
    }

    fn run<'a>(&'a self, _ctx: ToolContext<'a>, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let crop = required_str(&args, "crop")?;
            let data = calendar_for(crop, optional_str(&args, "location"));
            Ok(ToolResult::json(format!("calendar for {crop}"), data))
        })
    }
}
