use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldType {
    Text,
    Number,
    Date,
    Datetime,
    Choices,
    User,
    Contact,
}

impl CustomFieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Choices => "choices",
            Self::User => "user",
            Self::Contact => "contact",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "textarea" | "url" => Some(Self::Text),
            "number" => Some(Self::Number),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::Datetime),
            "choices" => Some(Self::Choices),
            "user" => Some(Self::User),
            "contact" => Some(Self::Contact),
            _ => None,
        }
    }

    /// Whether a form should render a dropdown rather than a free-text input.
    pub fn offers_choices(&self) -> bool {
        matches!(self, Self::Choices | Self::User)
    }
}

/// Selector for a custom field: which field, and what kind of value it takes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldRef {
    pub field_id: String,
    pub field_type: CustomFieldType,
}

impl CustomFieldRef {
    pub fn payload_key(&self) -> String {
        format!("custom.{}", self.field_id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", deserialize_with = "de_field_type")]
    pub field_type: CustomFieldType,
    #[serde(default)]
    pub accepts_multiple_values: bool,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

impl CustomFieldDescriptor {
    pub fn reference(&self) -> CustomFieldRef {
        CustomFieldRef { field_id: self.id.clone(), field_type: self.field_type }
    }
}

fn de_field_type<'de, D>(deserializer: D) -> Result<CustomFieldType, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    // Field types the CRM adds later still deserialize; they behave as text.
    Ok(CustomFieldType::parse(&raw).unwrap_or(CustomFieldType::Text))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDirectoryEntry {
    pub id: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl UserDirectoryEntry {
    /// Builds an entry from a `/user/` record, falling back to the email
    /// and then the id when the name is blank.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = record.get("id").and_then(Value::as_str)?.to_string();
        let email = record.get("email").and_then(Value::as_str).map(str::to_string);
        let name = ["first_name", "last_name"]
            .iter()
            .filter_map(|key| record.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let display_name = if !name.is_empty() {
            name
        } else if let Some(email) = email.as_deref().filter(|email| !email.is_empty()) {
            email.to_string()
        } else {
            id.clone()
        };

        Some(Self { id, display_name, email })
    }
}

/// Cache identity for one Close organization, derived from the API key
/// without retaining it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceKey(pub String);

impl WorkspaceKey {
    pub fn from_api_key(api_key: &SecretString) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(api_key.expose_secret().trim().as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("ws_{}", &digest[..16]))
    }
}
