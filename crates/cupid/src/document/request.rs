//! Structured date-plan requests and their lenient decoding.
//!
//! Models produce list arguments in several shapes: real JSON arrays, JSON
//! encoded strings, the string `"null"`, or garbage. Anything that is not a
//! list of objects decodes to an empty list so the rest of the plan survives.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::GenerationError;

/// Everything needed to render one date plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatePlanRequest {
    pub title: String,
    pub restaurant: Restaurant,
    pub schedule: Vec<ScheduleEntry>,
    pub gifts: Vec<GiftEntry>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Restaurant {
    pub name: String,
    pub time: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleEntry {
    pub time: String,
    pub activity: String,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GiftEntry {
    pub name: String,
    pub price: String,
    pub status: String,
}

impl DatePlanRequest {
    /// Decode capability arguments.
    ///
    /// Accepts the nested shape (`restaurant`, `schedule`, `gifts`, `notes`)
    /// and the flat shape (`restaurant_name`, `activity_schedule_json`,
    /// `gift_list_json`, `additional_notes`, ...). Only a missing or blank
    /// title is rejected.
    pub fn from_arguments(args: &Value) -> Result<Self, GenerationError> {
        let empty = Map::new();
        let args = args.as_object().unwrap_or(&empty);

        let title = text(args.get("title"));
        if title.trim().is_empty() {
            return Err(GenerationError::Validation("title is required".to_string()));
        }

        let nested = args.get("restaurant").and_then(Value::as_object);
        let restaurant_field = |key: &str, flat: &str| match nested.and_then(|r| r.get(key)) {
            Some(value) => text(Some(value)),
            None => text(args.get(flat)),
        };
        let restaurant = Restaurant {
            name: restaurant_field("name", "restaurant_name"),
            time: restaurant_field("time", "restaurant_time"),
            address: restaurant_field("address", "restaurant_address"),
            phone: restaurant_field("phone", "restaurant_phone"),
        };

        let schedule = object_list(first_present(args, &["schedule", "activity_schedule_json"]), "schedule")
            .iter()
            .map(|entry| ScheduleEntry {
                time: text(entry.get("time")),
                activity: text(entry.get("activity")),
                location: text(entry.get("location")),
            })
            .collect();

        let gifts = object_list(first_present(args, &["gifts", "gift_list_json"]), "gifts")
            .iter()
            .map(|entry| GiftEntry {
                name: text(entry.get("name")),
                price: text(entry.get("price")),
                status: text(entry.get("status")),
            })
            .collect();

        let notes = text(first_present(args, &["notes", "additional_notes"]));

        Ok(Self {
            title: title.trim().to_string(),
            restaurant,
            schedule,
            gifts,
            notes,
        })
    }
}

fn first_present<'a>(args: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| args.get(*key))
}

/// Render a scalar as display text; null and missing become empty.
fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Decode a list of objects, degrading to empty on any malformed encoding.
fn object_list(value: Option<&Value>, field: &'static str) -> Vec<Map<String, Value>> {
    let items = match value {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() || raw == "null" {
                return Vec::new();
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Array(items)) => items,
                Ok(Value::Null) => return Vec::new(),
                Ok(_) => {
                    warn!(field, "list argument is not an array, treating as empty");
                    return Vec::new();
                }
                Err(e) => {
                    warn!(field, error = %e, "list argument is not valid JSON, treating as empty");
                    return Vec::new();
                }
            }
        }
        Some(_) => {
            warn!(field, "list argument has unexpected type, treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_nested_shape() {
        let request = DatePlanRequest::from_arguments(&json!({
            "title": "七夕约会计划",
            "restaurant": {"name": "花园餐厅", "time": "18:30", "address": "人民路1号", "phone": "123"},
            "schedule": [{"time": "14:00", "activity": "看电影", "location": "万达影城"}],
            "gifts": [{"name": "玫瑰花", "price": "99元", "status": "已购买"}],
            "notes": "记得带伞"
        }))
        .unwrap();

        assert_eq!(request.title, "七夕约会计划");
        assert_eq!(request.restaurant.name, "花园餐厅");
        assert_eq!(request.schedule.len(), 1);
        assert_eq!(request.schedule[0].activity, "看电影");
        assert_eq!(request.gifts[0].status, "已购买");
        assert_eq!(request.notes, "记得带伞");
    }

    #[test]
    fn decodes_flat_shape_with_json_strings() {
        let request = DatePlanRequest::from_arguments(&json!({
            "title": "情人节",
            "restaurant_name": "小馆",
            "restaurant_time": "",
            "activity_schedule_json": "[{\"time\":\"10:00\",\"activity\":\"散步\",\"location\":\"公园\"}]",
            "gift_list_json": "[]",
            "additional_notes": ""
        }))
        .unwrap();

        assert_eq!(request.restaurant.name, "小馆");
        assert_eq!(request.schedule[0].location, "公园");
        assert!(request.gifts.is_empty());
    }

    #[test]
    fn malformed_lists_degrade_to_empty() {
        for bad in [json!("null"), json!("not json"), json!("{\"a\":1}"), json!(42), json!("")] {
            let request = DatePlanRequest::from_arguments(&json!({
                "title": "计划",
                "schedule": bad.clone(),
                "gifts": bad,
            }))
            .unwrap();
            assert!(request.schedule.is_empty());
            assert!(request.gifts.is_empty());
        }
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let request = DatePlanRequest::from_arguments(&json!({
            "title": "计划",
            "gifts": ["玫瑰", {"name": "巧克力", "price": 50}],
        }))
        .unwrap();
        assert_eq!(request.gifts.len(), 1);
        assert_eq!(request.gifts[0].price, "50");
    }

    #[test]
    fn missing_or_blank_title_is_rejected() {
        for args in [json!({}), json!({"title": "   "}), json!("just a string")] {
            let err = DatePlanRequest::from_arguments(&args).unwrap_err();
            assert!(matches!(err, GenerationError::Validation(_)));
        }
    }
}
