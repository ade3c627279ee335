//! Live preview hub: a virtual HTTP server for project files and the
//! message channels that keep every preview surface on the same page.
//!
//! Surfaces load pages from `/preview/{instance}/...` and connect to
//! `/api/preview/ws`. The editor drives the hub through [`hub::PreviewHub`]
//! (or the JSON API under `/api/editor`).

pub mod config;
pub mod coordinator;
pub mod correlator;
mod dispatch;
pub mod documents;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod markdown;
pub mod metrics;
pub mod paths;
pub mod registry;
pub mod resolver;
pub mod router;
pub mod server;
pub mod session;
pub mod trust;
pub mod views;

pub use coordinator::{NavigationCoordinator, PreviewTarget};
pub use correlator::RequestCorrelator;
pub use error::PreviewError;
pub use hub::{HubEvent, PreviewHub};
pub use registry::TabRegistry;
pub use resolver::{ContentResolver, ResolverSlot};
pub use router::ChannelRouter;
pub use server::AppState;
pub use session::{InstanceId, PreviewUrls};
pub use trust::TrustGate;
