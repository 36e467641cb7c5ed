pub mod guard;
pub mod lifecycle;
pub mod rate_limit;
pub mod reactions;
pub mod service;
pub mod subscription;
pub mod unread;

pub use guard::{Access, Capability, Guard};
pub use lifecycle::{sanitize_content, MessageLifecycle};
pub use rate_limit::{Action, RateLimiter};
pub use reactions::ReactionLedger;
pub use service::{ChatService, FanoutMode};
pub use subscription::Subscription;
pub use unread::UnreadTracker;
