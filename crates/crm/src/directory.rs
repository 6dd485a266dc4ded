//! Workspace directories (custom field definitions and users) behind
//! explicit, injectable TTL caches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use closelink_core::config::CacheConfig;
use closelink_core::domain::call::{HttpCallSpec, PageLimit};
use closelink_core::domain::directory::{
    CustomFieldDescriptor, CustomFieldRef, CustomFieldType, UserDirectoryEntry, WorkspaceKey,
};
use closelink_core::errors::CrmError;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::pagination::paginate;
use crate::transport::CrmTransport;

/// Object kinds that carry custom fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldObject {
    Lead,
    Contact,
    Opportunity,
    Activity,
}

impl CustomFieldObject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Contact => "contact",
            Self::Opportunity => "opportunity",
            Self::Activity => "activity",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lead" => Some(Self::Lead),
            "contact" => Some(Self::Contact),
            "opportunity" => Some(Self::Opportunity),
            "activity" => Some(Self::Activity),
            _ => None,
        }
    }
}

#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn fetch_custom_fields(
        &self,
        object: CustomFieldObject,
    ) -> Result<Vec<CustomFieldDescriptor>, CrmError>;

    async fn fetch_users(&self) -> Result<Vec<UserDirectoryEntry>, CrmError>;
}

/// Reads directories from the CRM through any transport.
pub struct CloseDirectory {
    transport: Arc<dyn CrmTransport>,
}

impl CloseDirectory {
    pub fn new(transport: Arc<dyn CrmTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl DirectorySource for CloseDirectory {
    async fn fetch_custom_fields(
        &self,
        object: CustomFieldObject,
    ) -> Result<Vec<CustomFieldDescriptor>, CrmError> {
        let call = HttpCallSpec::get(&format!("/custom_field/{}/", object.as_str()));
        let records = paginate(self.transport.as_ref(), &call, PageLimit::all()).await?;

        records
            .into_iter()
            .map(|record| {
                serde_json::from_value(record).map_err(|error| {
                    CrmError::Decode(format!("custom field definition: {error}"))
                })
            })
            .collect()
    }

    async fn fetch_users(&self) -> Result<Vec<UserDirectoryEntry>, CrmError> {
        let records =
            paginate(self.transport.as_ref(), &HttpCallSpec::get("/user/"), PageLimit::all())
                .await?;

        let users: Vec<UserDirectoryEntry> =
            records.iter().filter_map(UserDirectoryEntry::from_record).collect();
        if users.len() < records.len() {
            warn!(
                event_name = "crm.directory.users_skipped",
                skipped = records.len() - users.len(),
                "user records without an id were skipped"
            );
        }
        Ok(users)
    }
}

/// Independent TTL caches for the two directories, keyed by workspace.
/// Entries are whole snapshots; a refresh replaces the entry.
#[derive(Clone)]
pub struct DirectoryCache {
    custom_fields: Cache<(WorkspaceKey, CustomFieldObject), Arc<Vec<CustomFieldDescriptor>>>,
    users: Cache<WorkspaceKey, Arc<Vec<UserDirectoryEntry>>>,
}

impl DirectoryCache {
    pub fn new(custom_field_ttl: Duration, user_ttl: Duration, max_capacity: u64) -> Self {
        Self {
            custom_fields: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(custom_field_ttl)
                .build(),
            users: Cache::builder().max_capacity(max_capacity).time_to_live(user_ttl).build(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.custom_field_ttl_secs),
            Duration::from_secs(config.user_ttl_secs),
            config.max_capacity,
        )
    }

    pub async fn invalidate_workspace(&self, workspace: &WorkspaceKey) {
        self.users.invalidate(workspace).await;
        for object in [
            CustomFieldObject::Lead,
            CustomFieldObject::Contact,
            CustomFieldObject::Opportunity,
            CustomFieldObject::Activity,
        ] {
            self.custom_fields.invalidate(&(workspace.clone(), object)).await;
        }
    }
}

impl Default for DirectoryCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(900), 256)
    }
}

/// A dropdown entry for the host's form.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptionEntry {
    pub name: String,
    pub value: Value,
}

/// Directory lookups for one workspace.
#[derive(Clone)]
pub struct DirectoryService {
    source: Arc<dyn DirectorySource>,
    cache: DirectoryCache,
    workspace: WorkspaceKey,
}

impl DirectoryService {
    pub fn new(source: Arc<dyn DirectorySource>, cache: DirectoryCache, workspace: WorkspaceKey) -> Self {
        Self { source, cache, workspace }
    }

    pub async fn custom_fields(
        &self,
        object: CustomFieldObject,
    ) -> Result<Arc<Vec<CustomFieldDescriptor>>, CrmError> {
        let key = (self.workspace.clone(), object);
        if let Some(cached) = self.cache.custom_fields.get(&key).await {
            return Ok(cached);
        }

        let fields = Arc::new(self.source.fetch_custom_fields(object).await?);
        self.cache.custom_fields.insert(key, fields.clone()).await;
        debug!(
            event_name = "crm.directory.custom_fields_refreshed",
            workspace = %self.workspace.0,
            object = object.as_str(),
            fields = fields.len(),
            "custom field cache refreshed"
        );
        Ok(fields)
    }

    pub async fn users(&self) -> Result<Arc<Vec<UserDirectoryEntry>>, CrmError> {
        if let Some(cached) = self.cache.users.get(&self.workspace).await {
            return Ok(cached);
        }

        let users = Arc::new(self.source.fetch_users().await?);
        self.cache.users.insert(self.workspace.clone(), users.clone()).await;
        debug!(
            event_name = "crm.directory.users_refreshed",
            workspace = %self.workspace.0,
            users = users.len(),
            "user cache refreshed"
        );
        Ok(users)
    }

    /// Custom field selector options; each value is a tagged
    /// [`CustomFieldRef`] so the form knows which input to render.
    pub async fn custom_field_options(
        &self,
        object: CustomFieldObject,
    ) -> Result<Vec<OptionEntry>, CrmError> {
        let fields = self.custom_fields(object).await?;
        let mut options: Vec<OptionEntry> = fields
            .iter()
            .map(|field| OptionEntry { name: field.name.clone(), value: json!(field.reference()) })
            .collect();
        options.sort_by(|left, right| left.name.to_lowercase().cmp(&right.name.to_lowercase()));
        Ok(options)
    }

    /// Value options for one custom field: the user list for user fields,
    /// the declared choices otherwise. Free-text fields have none.
    pub async fn custom_field_value_options(
        &self,
        object: CustomFieldObject,
        field: &CustomFieldRef,
    ) -> Result<Vec<OptionEntry>, CrmError> {
        if !field.field_type.offers_choices() {
            return Ok(Vec::new());
        }

        let fields = self.custom_fields(object).await?;
        let descriptor = fields.iter().find(|candidate| candidate.id == field.field_id).ok_or_else(
            || CrmError::LocalValidation(format!("unknown custom field `{}`", field.field_id)),
        )?;

        if descriptor.field_type == CustomFieldType::User {
            return self.user_options().await;
        }

        Ok(descriptor
            .choices
            .iter()
            .flatten()
            .map(|choice| OptionEntry { name: choice.clone(), value: json!(choice) })
            .collect())
    }

    pub async fn user_options(&self) -> Result<Vec<OptionEntry>, CrmError> {
        let users = self.users().await?;
        Ok(users
            .iter()
            .map(|user| OptionEntry { name: user.display_name.clone(), value: json!(user.id) })
            .collect())
    }
}
