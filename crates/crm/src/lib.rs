//! Close CRM plumbing: the HTTP transport, list pagination, the operation
//! router and executor, directory caches, webhook subscriptions and the
//! polling fallback.

pub mod directory;
pub mod executor;
pub mod pagination;
pub mod polling;
pub mod router;
pub mod subscriptions;
pub mod transport;

#[cfg(test)]
mod testing;

pub use directory::{CloseDirectory, CustomFieldObject, DirectoryCache, DirectoryService, DirectorySource};
pub use executor::Executor;
pub use pagination::{paginate, Page, PaginationCursor};
pub use polling::Poller;
pub use router::route;
pub use subscriptions::SubscriptionManager;
pub use transport::{CloseClient, CrmTransport};
