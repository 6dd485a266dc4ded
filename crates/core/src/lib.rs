pub mod config;
pub mod domain;
pub mod errors;
pub mod richtext;
pub mod webhook;

pub use domain::call::{CallPlan, HttpCallSpec, HttpMethod, PageLimit};
pub use domain::directory::{CustomFieldDescriptor, CustomFieldRef, UserDirectoryEntry, WorkspaceKey};
pub use domain::operation::{Operation, OperationRequest, Resource};
pub use domain::state::{StaticState, WebhookSubscription};
pub use errors::{CrmError, ErrorEnvelope, ErrorKind};
pub use richtext::plain_text_to_html;
pub use webhook::{DeliveryOutcome, InboundDelivery, WebhookError, WebhookVerifier};
