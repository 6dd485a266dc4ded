use closelink_core::domain::call::{HttpCallSpec, PageLimit};
use closelink_core::errors::CrmError;
use serde_json::Value;
use tracing::debug;

use crate::transport::CrmTransport;

/// Offset cursor over a `_skip`/`_limit` list endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationCursor {
    pub skip: u64,
    pub limit: u32,
    pub has_more: Option<bool>,
    exhausted: bool,
}

impl PaginationCursor {
    pub fn new(limit: u32) -> Self {
        Self { skip: 0, limit: limit.max(1), has_more: None, exhausted: false }
    }

    /// Records one fetched page. An explicit `has_more: false` ends the walk,
    /// as does an empty page even when the server claims more. Without the
    /// flag, only a short page ends it.
    pub fn advance(&mut self, fetched: usize, has_more: Option<bool>) {
        self.skip += fetched as u64;
        self.has_more = has_more;
        self.exhausted = fetched == 0
            || has_more == Some(false)
            || (has_more.is_none() && fetched < self.limit as usize);
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn page_call(&self, call: &HttpCallSpec) -> HttpCallSpec {
        call.clone()
            .with_query("_skip", self.skip.to_string())
            .with_query("_limit", self.limit.to_string())
    }
}

/// One decoded list response.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub has_more: Option<bool>,
}

impl Page {
    /// Unwraps the `{data, has_more}` envelope. A bare array is a page
    /// without the flag; any other value is a single record.
    pub fn from_response(response: Value) -> Self {
        match response {
            Value::Object(mut map) if matches!(map.get("data"), Some(Value::Array(_))) => {
                let has_more = map.get("has_more").and_then(Value::as_bool);
                let records = match map.remove("data") {
                    Some(Value::Array(records)) => records,
                    _ => Vec::new(),
                };
                Self { records, has_more }
            }
            Value::Array(records) => Self { records, has_more: None },
            record => Self { records: vec![record], has_more: Some(false) },
        }
    }
}

/// Fetches records for a list call, sequentially and in server order.
pub async fn paginate<T>(
    transport: &T,
    call: &HttpCallSpec,
    limit: PageLimit,
) -> Result<Vec<Value>, CrmError>
where
    T: CrmTransport + ?Sized,
{
    match limit {
        PageLimit::Max(max) => {
            let max = max.max(1);
            let cursor = PaginationCursor::new(max);
            let page = Page::from_response(transport.execute(&cursor.page_call(call)).await?);
            let mut records = page.records;
            records.truncate(max as usize);
            Ok(records)
        }
        PageLimit::All { page_size } => {
            let mut cursor = PaginationCursor::new(page_size);
            let mut records = Vec::new();
            let mut pages = 0_u32;

            loop {
                let page = Page::from_response(transport.execute(&cursor.page_call(call)).await?);
                pages += 1;
                let fetched = page.records.len();
                records.extend(page.records);
                cursor.advance(fetched, page.has_more);

                debug!(
                    event_name = "crm.pagination.page",
                    path = %call.path_template,
                    page = pages,
                    fetched,
                    total = records.len(),
                    has_more = ?page.has_more,
                    "fetched page"
                );

                if cursor.is_exhausted() {
                    break;
                }
            }

            Ok(records)
        }
    }
}
