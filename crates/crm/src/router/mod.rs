//! Maps caller operations onto Close API calls.
//!
//! Each resource is described once in [`RESOURCE_TABLE`]: its collection
//! path, identifying parameter, supported operations and the parameters a
//! create call requires. Routing is pure; nothing here touches the network.

pub mod fields;

use closelink_core::domain::call::{CallPlan, HttpCallSpec, PageLimit};
use closelink_core::domain::operation::{Operation, OperationRequest, Resource};
use closelink_core::errors::CrmError;
use serde_json::{Map, Value};

use self::fields::{note_html, query_params, wire_fields, wire_name};

pub const DEFAULT_LIMIT: u32 = 50;

const ADDITIONAL_FIELDS: &str = "additionalFields";
const UPDATE_FIELDS: &str = "updateFields";
const FILTERS: &str = "filters";

/// Static description of one resource.
#[derive(Debug)]
pub struct ResourceSpec {
    pub resource: Resource,
    pub path: &'static str,
    pub id_param: &'static str,
    pub operations: &'static [Operation],
    /// `(caller parameter, wire field)` pairs a create call must carry.
    pub create_required: &'static [(&'static str, &'static str)],
}

impl ResourceSpec {
    pub fn for_resource(resource: Resource) -> Option<&'static ResourceSpec> {
        RESOURCE_TABLE.iter().find(|spec| spec.resource == resource)
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }

    pub fn item_path(&self) -> String {
        format!("{}{{id}}/", self.path)
    }
}

use Operation::{BulkUpdate, Create, Delete, Find, Get, GetPublished, List, Merge, Update};

const ENTITY_OPS: &[Operation] = &[Create, Get, Find, Update, Delete];
const STATUS_OPS: &[Operation] = &[Create, List, Update, Delete];

pub const RESOURCE_TABLE: &[ResourceSpec] = &[
    ResourceSpec {
        resource: Resource::Lead,
        path: "/lead/",
        id_param: "leadId",
        operations: &[Create, Get, Find, Update, Delete, Merge],
        create_required: &[("name", "name")],
    },
    ResourceSpec {
        resource: Resource::LeadStatus,
        path: "/status/lead/",
        id_param: "statusId",
        operations: STATUS_OPS,
        create_required: &[("label", "label")],
    },
    ResourceSpec {
        resource: Resource::Opportunity,
        path: "/opportunity/",
        id_param: "opportunityId",
        operations: ENTITY_OPS,
        create_required: &[("leadId", "lead_id")],
    },
    ResourceSpec {
        resource: Resource::OpportunityStatus,
        path: "/status/opportunity/",
        id_param: "statusId",
        operations: STATUS_OPS,
        create_required: &[("label", "label"), ("statusType", "status_type")],
    },
    ResourceSpec {
        resource: Resource::Task,
        path: "/task/",
        id_param: "taskId",
        operations: &[Create, Get, Find, Update, Delete, BulkUpdate],
        create_required: &[("leadId", "lead_id"), ("text", "text")],
    },
    ResourceSpec {
        resource: Resource::Note,
        path: "/activity/note/",
        id_param: "noteId",
        operations: ENTITY_OPS,
        create_required: &[("leadId", "lead_id"), ("note", "note_html")],
    },
    ResourceSpec {
        resource: Resource::Call,
        path: "/activity/call/",
        id_param: "callId",
        operations: ENTITY_OPS,
        create_required: &[("leadId", "lead_id")],
    },
    ResourceSpec {
        resource: Resource::Email,
        path: "/activity/email/",
        id_param: "emailId",
        operations: ENTITY_OPS,
        create_required: &[("leadId", "lead_id"), ("status", "status")],
    },
    ResourceSpec {
        resource: Resource::Meeting,
        path: "/activity/meeting/",
        id_param: "meetingId",
        operations: &[Get, Find, Update, Delete],
        create_required: &[],
    },
    ResourceSpec {
        resource: Resource::Sms,
        path: "/activity/sms/",
        id_param: "smsId",
        operations: ENTITY_OPS,
        create_required: &[
            ("leadId", "lead_id"),
            ("localPhone", "local_phone"),
            ("remotePhone", "remote_phone"),
        ],
    },
    ResourceSpec {
        resource: Resource::CustomActivity,
        path: "/activity/custom/",
        id_param: "customActivityId",
        operations: &[Create, Get, Find, Update, Delete, GetPublished],
        create_required: &[
            ("leadId", "lead_id"),
            ("customActivityTypeId", "custom_activity_type_id"),
        ],
    },
    ResourceSpec {
        resource: Resource::Contact,
        path: "/contact/",
        id_param: "contactId",
        operations: ENTITY_OPS,
        create_required: &[("name", "name")],
    },
];

/// Builds the call plan for one operation. Missing identifiers and other
/// local validation failures are reported here, before any request exists.
pub fn route(request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let spec = ResourceSpec::for_resource(request.resource).ok_or_else(|| {
        CrmError::LocalValidation(format!("resource `{}` is not supported", request.resource))
    })?;
    if !spec.supports(request.operation) {
        return Err(CrmError::LocalValidation(format!(
            "operation `{}` is not available for resource `{}`",
            request.operation, request.resource
        )));
    }

    match request.operation {
        Create => create(spec, request),
        Get => get(spec, request),
        Find => find(spec, request),
        Update => update(spec, request),
        Delete => delete(spec, request),
        List => list(spec, request),
        Merge => merge_leads(request),
        BulkUpdate => bulk_update_tasks(spec, request),
        GetPublished => published_custom_activities(spec, request),
    }
}

/// `returnAll` walks every page; otherwise one page of `limit` records.
pub fn page_limit(request: &OperationRequest) -> PageLimit {
    if request.bool_or("returnAll", false) {
        PageLimit::all()
    } else {
        PageLimit::Max(request.u32_or("limit", DEFAULT_LIMIT))
    }
}

fn create(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let mut body = Map::new();
    for (param, wire) in spec.create_required {
        let value = request.required_value(param)?;
        let value = if spec.resource == Resource::Note && *param == "note" {
            note_html(&value)?
        } else {
            value
        };
        body.insert((*wire).to_string(), value);
    }

    // Required parameters win over the same field repeated in the group.
    for (key, value) in wire_fields(spec.resource, request.group(ADDITIONAL_FIELDS))? {
        body.entry(key).or_insert(value);
    }

    Ok(CallPlan::Single(HttpCallSpec::post(spec.path).with_body(body)))
}

fn get(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let id = request.required_str(spec.id_param)?;
    Ok(CallPlan::Single(HttpCallSpec::get(&spec.item_path()).with_path_param("id", &id)))
}

fn find(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    if let Some(id) = request.optional_str(spec.id_param) {
        return Ok(CallPlan::Single(
            HttpCallSpec::get(&spec.item_path()).with_path_param("id", &id),
        ));
    }

    let query = query_params(spec.resource, request.group(FILTERS))?;
    if query.is_empty() {
        return Ok(CallPlan::Empty);
    }

    let mut call = HttpCallSpec::get(spec.path);
    call.query = query;
    Ok(CallPlan::Paginate { call, limit: page_limit(request) })
}

fn update(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let id = request.required_str(spec.id_param)?;
    let body = wire_fields(spec.resource, request.group(UPDATE_FIELDS))?;
    Ok(CallPlan::Single(
        HttpCallSpec::put(&spec.item_path()).with_path_param("id", &id).with_body(body),
    ))
}

fn delete(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let id = request.required_str(spec.id_param)?;
    Ok(CallPlan::Single(HttpCallSpec::delete(&spec.item_path()).with_path_param("id", &id)))
}

fn list(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    Ok(CallPlan::Paginate { call: HttpCallSpec::get(spec.path), limit: page_limit(request) })
}

fn merge_leads(request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let mut body = Map::new();
    for param in ["sourceLeadId", "destinationLeadId"] {
        let id = request.required_str(param)?;
        body.insert(wire_name(Resource::Lead, param), Value::String(id));
    }
    if body.get("source") == body.get("destination") {
        return Err(CrmError::LocalValidation(
            "a lead cannot be merged into itself".to_string(),
        ));
    }
    Ok(CallPlan::Single(HttpCallSpec::post("/lead/merge/").with_body(body)))
}

fn bulk_update_tasks(spec: &ResourceSpec, request: &OperationRequest) -> Result<CallPlan, CrmError> {
    let body = wire_fields(spec.resource, request.group(UPDATE_FIELDS))?;
    if body.is_empty() {
        return Err(CrmError::LocalValidation(
            "bulk update needs at least one field in `updateFields`".to_string(),
        ));
    }

    let query = query_params(spec.resource, request.group(FILTERS))?;
    if query.is_empty() {
        return Err(CrmError::LocalValidation(
            "bulk update needs at least one filter in `filters`".to_string(),
        ));
    }

    let mut call = HttpCallSpec::put(spec.path).with_body(body);
    call.query = query;
    Ok(CallPlan::Single(call))
}

fn published_custom_activities(
    spec: &ResourceSpec,
    request: &OperationRequest,
) -> Result<CallPlan, CrmError> {
    let mut call = HttpCallSpec::get(spec.path);
    call.query = query_params(spec.resource, request.group(FILTERS))?;
    for (param, wire) in [("leadId", "lead_id"), ("customActivityTypeId", "custom_activity_type_id")]
    {
        if let Some(value) = request.optional_str(param) {
            call.query.insert(wire.to_string(), value);
        }
    }
    call.query.insert("status".to_string(), "published".to_string());
    Ok(CallPlan::Paginate { call, limit: page_limit(request) })
}

#[cfg(test)]
mod tests {
    use closelink_core::domain::call::{CallPlan, HttpMethod, PageLimit};
    use closelink_core::domain::operation::{Operation, OperationRequest, Resource};
    use closelink_core::errors::CrmError;
    use serde_json::{json, Value};

    use super::{route, ResourceSpec, RESOURCE_TABLE};

    fn plan(resource: Resource, operation: Operation, parameters: Value) -> Result<CallPlan, CrmError> {
        route(&OperationRequest::new(resource, operation, parameters))
    }

    fn single(plan: Result<CallPlan, CrmError>) -> closelink_core::domain::call::HttpCallSpec {
        match plan {
            Ok(CallPlan::Single(call)) => call,
            other => panic!("expected single call, got {other:?}"),
        }
    }

    #[test]
    fn every_resource_has_one_table_entry() {
        for resource in Resource::ALL {
            let entries = RESOURCE_TABLE.iter().filter(|spec| spec.resource == resource).count();
            assert_eq!(entries, 1, "{resource}");
            let spec = ResourceSpec::for_resource(resource).expect("table entry");
            assert!(spec.path.ends_with('/'));
        }
    }

    #[test]
    fn update_with_blank_id_is_local_validation() {
        let result = plan(Resource::Lead, Operation::Update, json!({"leadId": "", "updateFields": {}}));
        assert_eq!(result, Err(CrmError::missing_parameter("leadId")));

        for (resource, operation) in [
            (Resource::Opportunity, Operation::Delete),
            (Resource::Task, Operation::Update),
            (Resource::CustomActivity, Operation::Get),
            (Resource::LeadStatus, Operation::Delete),
        ] {
            assert!(
                matches!(plan(resource, operation, json!({})), Err(CrmError::LocalValidation(_))),
                "{resource} {operation}"
            );
        }
    }

    #[test]
    fn unsupported_operation_is_rejected() {
        assert!(matches!(
            plan(Resource::Meeting, Operation::Create, json!({})),
            Err(CrmError::LocalValidation(message)) if message.contains("meeting")
        ));
        assert!(plan(Resource::Contact, Operation::Merge, json!({})).is_err());
    }

    #[test]
    fn find_prefers_direct_fetch_then_filters_then_nothing() {
        let call = single(plan(Resource::Lead, Operation::Find, json!({"leadId": "lead_1"})));
        assert_eq!(call.method, HttpMethod::Get);
        assert_eq!(call.path, "/lead/lead_1/");

        let filtered = plan(
            Resource::Call,
            Operation::Find,
            json!({"filters": {"leadId": "lead_1"}, "returnAll": true}),
        )
        .expect("plan");
        match filtered {
            CallPlan::Paginate { call, limit } => {
                assert_eq!(call.path, "/activity/call/");
                assert_eq!(call.query.get("lead_id").map(String::as_str), Some("lead_1"));
                assert_eq!(limit, PageLimit::all());
            }
            other => panic!("expected pagination, got {other:?}"),
        }

        assert_eq!(plan(Resource::Lead, Operation::Find, json!({"filters": {}})), Ok(CallPlan::Empty));
        assert_eq!(plan(Resource::Lead, Operation::Find, json!({})), Ok(CallPlan::Empty));
    }

    #[test]
    fn limit_defaults_to_fifty() {
        let plan = plan(Resource::LeadStatus, Operation::List, json!({})).expect("plan");
        assert!(matches!(plan, CallPlan::Paginate { limit: PageLimit::Max(50), .. }));

        let plan = plan_with_limit(7);
        assert!(matches!(plan, CallPlan::Paginate { limit: PageLimit::Max(7), .. }));
    }

    fn plan_with_limit(limit: u32) -> CallPlan {
        plan(Resource::OpportunityStatus, Operation::List, json!({"limit": limit})).expect("plan")
    }

    #[test]
    fn create_merges_required_and_additional_fields() {
        let call = single(plan(
            Resource::Opportunity,
            Operation::Create,
            json!({
                "leadId": "lead_1",
                "additionalFields": {
                    "statusId": "stat_1",
                    "valuePeriod": "monthly",
                    "leadId": "lead_other",
                    "customFields": [{"field": {"fieldId": "cf_1", "fieldType": "text"}, "value": "v"}]
                }
            }),
        ));

        assert_eq!(call.method, HttpMethod::Post);
        assert_eq!(call.path, "/opportunity/");
        let body = call.body.expect("body");
        assert_eq!(body["lead_id"], "lead_1");
        assert_eq!(body["status_id"], "stat_1");
        assert_eq!(body["value_period"], "monthly");
        assert_eq!(body["custom.cf_1"], "v");
    }

    #[test]
    fn note_create_renders_rich_text() {
        let call = single(plan(
            Resource::Note,
            Operation::Create,
            json!({"leadId": "lead_1", "note": "Line 1\nLine 2"}),
        ));
        let body = call.body.expect("body");
        assert_eq!(body["note_html"], "<body><p>Line 1<br>Line 2</p></body>");
        assert!(!body.contains_key("note"));
    }

    #[test]
    fn update_sends_snake_case_fields_to_item_path() {
        let call = single(plan(
            Resource::Task,
            Operation::Update,
            json!({"taskId": "task_1", "updateFields": {"isComplete": true, "taskType": "lead"}}),
        ));
        assert_eq!(call.method, HttpMethod::Put);
        assert_eq!(call.path, "/task/task_1/");
        assert_eq!(call.path_template, "/task/{id}/");
        let body = call.body.expect("body");
        assert_eq!(body["is_complete"], true);
        assert_eq!(body["_type"], "lead");
    }

    #[test]
    fn merge_posts_source_and_destination() {
        let call = single(plan(
            Resource::Lead,
            Operation::Merge,
            json!({"sourceLeadId": "lead_a", "destinationLeadId": "lead_b"}),
        ));
        assert_eq!(call.path, "/lead/merge/");
        let body = call.body.expect("body");
        assert_eq!(body["source"], "lead_a");
        assert_eq!(body["destination"], "lead_b");

        assert!(plan(
            Resource::Lead,
            Operation::Merge,
            json!({"sourceLeadId": "lead_a", "destinationLeadId": "lead_a"})
        )
        .is_err());
        assert_eq!(
            plan(Resource::Lead, Operation::Merge, json!({"sourceLeadId": "lead_a"})),
            Err(CrmError::missing_parameter("destinationLeadId"))
        );
    }

    #[test]
    fn bulk_update_splits_filters_and_fields() {
        let call = single(plan(
            Resource::Task,
            Operation::BulkUpdate,
            json!({
                "filters": {"leadId": "lead_1", "isComplete": false},
                "updateFields": {"assignedTo": "user_1"}
            }),
        ));
        assert_eq!(call.method, HttpMethod::Put);
        assert_eq!(call.path, "/task/");
        assert_eq!(call.query.get("lead_id").map(String::as_str), Some("lead_1"));
        assert_eq!(call.query.get("is_complete").map(String::as_str), Some("false"));
        assert_eq!(call.body.expect("body")["assigned_to"], "user_1");

        assert!(matches!(
            plan(Resource::Task, Operation::BulkUpdate, json!({"filters": {"leadId": "lead_1"}})),
            Err(CrmError::LocalValidation(_))
        ));
        assert!(matches!(
            plan(Resource::Task, Operation::BulkUpdate, json!({"updateFields": {"isComplete": true}})),
            Err(CrmError::LocalValidation(_))
        ));
    }

    #[test]
    fn published_custom_activities_filter_on_status() {
        let plan = plan(
            Resource::CustomActivity,
            Operation::GetPublished,
            json!({"leadId": "lead_1", "returnAll": true}),
        )
        .expect("plan");
        match plan {
            CallPlan::Paginate { call, .. } => {
                assert_eq!(call.path, "/activity/custom/");
                assert_eq!(call.query.get("status").map(String::as_str), Some("published"));
                assert_eq!(call.query.get("lead_id").map(String::as_str), Some("lead_1"));
            }
            other => panic!("expected pagination, got {other:?}"),
        }
    }

    #[test]
    fn status_create_requires_type_for_opportunities() {
        assert_eq!(
            plan(Resource::OpportunityStatus, Operation::Create, json!({"label": "Won big"})),
            Err(CrmError::missing_parameter("statusType"))
        );
        let call = single(plan(
            Resource::OpportunityStatus,
            Operation::Create,
            json!({"label": "Won big", "statusType": "won"}),
        ));
        assert_eq!(call.path, "/status/opportunity/");
        assert_eq!(call.body.expect("body")["status_type"], "won");
    }
}
