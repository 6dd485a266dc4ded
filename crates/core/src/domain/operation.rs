use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::CrmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resource {
    Lead,
    LeadStatus,
    Opportunity,
    OpportunityStatus,
    Task,
    Note,
    Call,
    Email,
    Meeting,
    Sms,
    CustomActivity,
    Contact,
}

impl Resource {
    pub const ALL: [Resource; 12] = [
        Self::Lead,
        Self::LeadStatus,
        Self::Opportunity,
        Self::OpportunityStatus,
        Self::Task,
        Self::Note,
        Self::Call,
        Self::Email,
        Self::Meeting,
        Self::Sms,
        Self::CustomActivity,
        Self::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::LeadStatus => "leadStatus",
            Self::Opportunity => "opportunity",
            Self::OpportunityStatus => "opportunityStatus",
            Self::Task => "task",
            Self::Note => "note",
            Self::Call => "call",
            Self::Email => "email",
            Self::Meeting => "meeting",
            Self::Sms => "sms",
            Self::CustomActivity => "customActivity",
            Self::Contact => "contact",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        Self::ALL.into_iter().find(|resource| resource.as_str().eq_ignore_ascii_case(normalized))
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Create,
    Find,
    Get,
    Update,
    Delete,
    List,
    Merge,
    BulkUpdate,
    GetPublished,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Self::Create,
        Self::Find,
        Self::Get,
        Self::Update,
        Self::Delete,
        Self::List,
        Self::Merge,
        Self::BulkUpdate,
        Self::GetPublished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Find => "find",
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Merge => "merge",
            Self::BulkUpdate => "bulkUpdate",
            Self::GetPublished => "getPublished",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim();
        Self::ALL.into_iter().find(|operation| operation.as_str().eq_ignore_ascii_case(normalized))
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caller invocation. Parameters use the caller's camelCase naming and
/// have already been validated for type by the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub resource: Resource,
    pub operation: Operation,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl OperationRequest {
    pub fn new(resource: Resource, operation: Operation, parameters: Value) -> Self {
        let parameters = match parameters {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { resource, operation, parameters }
    }

    pub fn required_str(&self, name: &str) -> Result<String, CrmError> {
        self.optional_str(name).ok_or_else(|| CrmError::missing_parameter(name))
    }

    /// Non-blank string parameter; numbers are accepted and stringified.
    pub fn optional_str(&self, name: &str) -> Option<String> {
        match self.parameters.get(name)? {
            Value::String(value) => {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn required_value(&self, name: &str) -> Result<Value, CrmError> {
        match self.parameters.get(name) {
            None | Some(Value::Null) => Err(CrmError::missing_parameter(name)),
            Some(Value::String(value)) if value.trim().is_empty() => {
                Err(CrmError::missing_parameter(name))
            }
            Some(value) => Ok(value.clone()),
        }
    }

    /// Object-valued parameter group such as `additionalFields`; an absent
    /// group reads as empty.
    pub fn group(&self, name: &str) -> Map<String, Value> {
        match self.parameters.get(name) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        match self.parameters.get(name) {
            Some(Value::Bool(value)) => *value,
            Some(Value::String(value)) => value.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    pub fn u32_or(&self, name: &str, default: u32) -> u32 {
        match self.parameters.get(name) {
            Some(Value::Number(value)) => value
                .as_u64()
                .and_then(|value| u32::try_from(value).ok())
                .filter(|value| *value > 0)
                .unwrap_or(default),
            Some(Value::String(value)) => {
                value.trim().parse().ok().filter(|value| *value > 0).unwrap_or(default)
            }
            _ => default,
        }
    }
}
