//! Business logic: authorization, connection fan-out, long-poll waiters,
//! and the publish pipeline that ties them together.

pub mod authz;
pub mod connections;
pub mod message;
pub mod poll;
pub mod publish;

pub use authz::{AuthenticatedUser, AuthzDecision, Authorizer};
pub use connections::{ConnectionError, ConnectionId, ConnectionManager, PushFrame};
pub use message::{Action, Message, Topic};
pub use poll::{PollError, PollManager, PollOutcome};
pub use publish::{BulkPublishResult, BulkStatus, PublishError, PublishPipeline, PublishReceipt, PublishRequest};
