use std::collections::BTreeMap;

use closelink_core::domain::directory::{CustomFieldRef, CustomFieldType};
use closelink_core::domain::operation::Resource;
use closelink_core::errors::CrmError;
use closelink_core::richtext::plain_text_to_html;
use serde_json::{Map, Number, Value};

pub const CUSTOM_FIELDS_PARAM: &str = "customFields";

/// Renames the generic camelCase to snake_case conversion gets wrong.
/// `None` applies to every resource.
const FIXED_RENAMES: &[(Option<Resource>, &str, &str)] = &[
    (Some(Resource::Task), "taskType", "_type"),
    (Some(Resource::Lead), "sourceLeadId", "source"),
    (Some(Resource::Lead), "destinationLeadId", "destination"),
    (None, "statusId", "status_id"),
    (None, "customActivityTypeId", "custom_activity_type_id"),
    (None, "noteHtml", "note_html"),
];

/// Filter names that map onto query operators rather than plain fields.
const FILTER_RENAMES: &[(&str, &str)] = &[
    ("dateCreatedAfter", "date_created__gte"),
    ("dateCreatedBefore", "date_created__lte"),
    ("dateUpdatedAfter", "date_updated__gte"),
    ("dateUpdatedBefore", "date_updated__lte"),
    ("dueAfter", "date__gte"),
    ("dueBefore", "date__lte"),
    ("taskIds", "id__in"),
    ("leadIds", "lead_id__in"),
];

pub fn to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    let mut previous_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if previous_lower {
                snake.push('_');
            }
            snake.push(ch.to_ascii_lowercase());
            previous_lower = false;
        } else {
            previous_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
            snake.push(ch);
        }
    }
    snake
}

pub fn wire_name(resource: Resource, param: &str) -> String {
    FIXED_RENAMES
        .iter()
        .find(|(scope, from, _)| *from == param && scope.map_or(true, |scoped| scoped == resource))
        .map(|(_, _, to)| (*to).to_string())
        .unwrap_or_else(|| to_snake_case(param))
}

/// Converts a caller field group into the request body. Null values are
/// dropped; `customFields` expands to `custom.<id>` keys; a note's plain
/// `note` text becomes `note_html`.
pub fn wire_fields(resource: Resource, group: Map<String, Value>) -> Result<Map<String, Value>, CrmError> {
    let mut body = Map::new();
    for (param, value) in group {
        if value.is_null() {
            continue;
        }
        if param == CUSTOM_FIELDS_PARAM {
            for (key, custom_value) in custom_field_entries(&value)? {
                body.insert(key, custom_value);
            }
            continue;
        }
        if resource == Resource::Note && param == "note" {
            body.insert("note_html".to_string(), note_html(&value)?);
            continue;
        }
        body.insert(wire_name(resource, &param), value);
    }
    Ok(body)
}

pub fn note_html(value: &Value) -> Result<Value, CrmError> {
    match value {
        Value::String(text) => Ok(Value::String(plain_text_to_html(text))),
        _ => Err(CrmError::LocalValidation("`note` must be text".to_string())),
    }
}

/// Converts a filter group into query parameters.
pub fn query_params(
    resource: Resource,
    filters: Map<String, Value>,
) -> Result<BTreeMap<String, String>, CrmError> {
    let mut query = BTreeMap::new();
    for (param, value) in filters {
        let Some(text) = query_value(&value) else {
            continue;
        };
        let key = FILTER_RENAMES
            .iter()
            .find(|(from, _)| *from == param)
            .map(|(_, to)| (*to).to_string())
            .unwrap_or_else(|| wire_name(resource, &param));
        if key.starts_with("custom.") || param == CUSTOM_FIELDS_PARAM {
            return Err(CrmError::LocalValidation(
                "custom fields cannot be used as search filters".to_string(),
            ));
        }
        query.insert(key, text);
    }
    Ok(query)
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(query_value).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

fn custom_field_entries(value: &Value) -> Result<Vec<(String, Value)>, CrmError> {
    let entries = match value {
        Value::Array(entries) => entries,
        _ => {
            return Err(CrmError::LocalValidation(
                "`customFields` must be a list of {field, value} entries".to_string(),
            ))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let field = entry.get("field").cloned().ok_or_else(|| {
                CrmError::LocalValidation(format!("customFields[{index}] is missing `field`"))
            })?;
            let field: CustomFieldRef = serde_json::from_value(field).map_err(|_| {
                CrmError::LocalValidation(format!(
                    "customFields[{index}].field must be {{fieldId, fieldType}}"
                ))
            })?;
            if field.field_id.trim().is_empty() {
                return Err(CrmError::LocalValidation(format!(
                    "customFields[{index}].field.fieldId is empty"
                )));
            }
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            Ok((field.payload_key(), coerce_custom_value(&field, value)?))
        })
        .collect()
}

fn coerce_custom_value(field: &CustomFieldRef, value: Value) -> Result<Value, CrmError> {
    match (field.field_type, value) {
        (CustomFieldType::Number, Value::String(text)) if !text.trim().is_empty() => {
            parse_number(text.trim()).ok_or_else(|| {
                CrmError::LocalValidation(format!(
                    "custom field `{}` expects a number, got `{text}`",
                    field.field_id
                ))
            })
        }
        (_, value) => Ok(value),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}
