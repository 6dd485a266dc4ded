use serde::{Deserialize, Serialize};

use crate::errors::CrmError;

/// Entity a workflow trigger listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerObject {
    Lead,
    Contact,
    Opportunity,
    Task,
    Note,
    Call,
    Email,
    Sms,
    Meeting,
    CustomActivity,
}

impl TriggerObject {
    pub const ALL: [TriggerObject; 10] = [
        Self::Lead,
        Self::Contact,
        Self::Opportunity,
        Self::Task,
        Self::Note,
        Self::Call,
        Self::Email,
        Self::Sms,
        Self::Meeting,
        Self::CustomActivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Opportunity => "opportunity",
            Self::Task => "task",
            Self::Note => "note",
            Self::Call => "call",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Meeting => "meeting",
            Self::CustomActivity => "customActivity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        Self::ALL.into_iter().find(|object| object.as_str().eq_ignore_ascii_case(normalized))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    Created,
    Updated,
    Deleted,
    StatusChange,
    Completed,
    Merged,
}

impl TriggerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::StatusChange => "status_change",
            Self::Completed => "completed",
            Self::Merged => "merged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            "status_change" | "statuschange" => Some(Self::StatusChange),
            "completed" => Some(Self::Completed),
            "merged" => Some(Self::Merged),
            _ => None,
        }
    }
}

/// One entry of the `events` array sent when creating a subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventFilter {
    pub object_type: String,
    pub action: String,
}

struct TriggerMapping {
    object: TriggerObject,
    action: TriggerAction,
    object_type: &'static str,
    event_action: &'static str,
}

const fn mapping(
    object: TriggerObject,
    action: TriggerAction,
    object_type: &'static str,
    event_action: &'static str,
) -> TriggerMapping {
    TriggerMapping { object, action, object_type, event_action }
}

use TriggerAction::{Completed, Created, Deleted, Merged, StatusChange, Updated};
use TriggerObject as O;

/// Every supported trigger. Status changes and task events are published
/// by the CRM under activity or task sub-types, not the entity itself.
const TRIGGER_TABLE: &[TriggerMapping] = &[
    mapping(O::Lead, Created, "lead", "created"),
    mapping(O::Lead, Updated, "lead", "updated"),
    mapping(O::Lead, Deleted, "lead", "deleted"),
    mapping(O::Lead, Merged, "lead", "merged"),
    mapping(O::Lead, StatusChange, "activity.lead_status_change", "created"),
    mapping(O::Contact, Created, "contact", "created"),
    mapping(O::Contact, Updated, "contact", "updated"),
    mapping(O::Contact, Deleted, "contact", "deleted"),
    mapping(O::Opportunity, Created, "opportunity", "created"),
    mapping(O::Opportunity, Updated, "opportunity", "updated"),
    mapping(O::Opportunity, Deleted, "opportunity", "deleted"),
    mapping(O::Opportunity, StatusChange, "activity.opportunity_status_change", "created"),
    mapping(O::Task, Created, "task.lead", "created"),
    mapping(O::Task, Updated, "task.lead", "updated"),
    mapping(O::Task, Deleted, "task.lead", "deleted"),
    mapping(O::Task, Completed, "task.lead", "completed"),
    mapping(O::Note, Created, "activity.note", "created"),
    mapping(O::Note, Updated, "activity.note", "updated"),
    mapping(O::Note, Deleted, "activity.note", "deleted"),
    mapping(O::Call, Created, "activity.call", "created"),
    mapping(O::Call, Updated, "activity.call", "updated"),
    mapping(O::Call, Deleted, "activity.call", "deleted"),
    mapping(O::Email, Created, "activity.email", "created"),
    mapping(O::Email, Updated, "activity.email", "updated"),
    mapping(O::Email, Deleted, "activity.email", "deleted"),
    mapping(O::Sms, Created, "activity.sms", "created"),
    mapping(O::Sms, Updated, "activity.sms", "updated"),
    mapping(O::Sms, Deleted, "activity.sms", "deleted"),
    mapping(O::Meeting, Created, "activity.meeting", "created"),
    mapping(O::Meeting, Updated, "activity.meeting", "updated"),
    mapping(O::Meeting, Deleted, "activity.meeting", "deleted"),
    mapping(O::CustomActivity, Created, "activity.custom_activity", "created"),
    mapping(O::CustomActivity, Updated, "activity.custom_activity", "updated"),
    mapping(O::CustomActivity, Deleted, "activity.custom_activity", "deleted"),
];

/// Actions a trigger object can subscribe to, in table order.
pub fn supported_actions(object: TriggerObject) -> Vec<TriggerAction> {
    TRIGGER_TABLE.iter().filter(|entry| entry.object == object).map(|entry| entry.action).collect()
}

/// Translates a trigger selection into the subscription's event filters.
/// Duplicated actions collapse; an empty or unsupported selection is a
/// local validation error.
pub fn event_filters(
    object: TriggerObject,
    actions: &[TriggerAction],
) -> Result<Vec<EventFilter>, CrmError> {
    if actions.is_empty() {
        return Err(CrmError::LocalValidation(format!(
            "select at least one action for the `{}` trigger",
            object.as_str()
        )));
    }

    let mut filters: Vec<EventFilter> = Vec::with_capacity(actions.len());
    for action in actions {
        let entry = TRIGGER_TABLE
            .iter()
            .find(|entry| entry.object == object && entry.action == *action)
            .ok_or_else(|| {
                CrmError::LocalValidation(format!(
                    "action `{}` is not available for the `{}` trigger",
                    action.as_str(),
                    object.as_str()
                ))
            })?;

        let filter = EventFilter {
            object_type: entry.object_type.to_string(),
            action: entry.event_action.to_string(),
        };
        if !filters.contains(&filter) {
            filters.push(filter);
        }
    }

    Ok(filters)
}
