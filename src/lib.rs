pub mod clock;
pub mod config;
pub mod errors;
pub mod limiter;
pub mod metrics;
pub mod metrics_server;
pub mod middleware;
pub mod registry;
pub mod server;
pub mod sweeper;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, PolicyConfig, PolicyFileConfig, Preset};
pub use errors::{Result, WardenError};
pub use limiter::{Decision, LimitEvent, LimitNotifier, Policy, Quota, RateLimiter, RequestParts};
pub use middleware::{enforce, RateLimitLayerState};
pub use registry::PolicyRegistry;
pub use server::{start_server, ServerConfig};
