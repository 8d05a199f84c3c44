pub mod auth_service;
pub mod clock;
pub mod device_cache;
pub mod dispatcher;
pub mod recurrence;
pub mod retention;
pub mod scheduler;
pub mod telemetry;
pub mod token_service;

pub use auth_service::AuthService;
pub use clock::{Clock, SystemClock};
pub use device_cache::{DeviceCache, DeviceStatus};
pub use dispatcher::{CommandSink, MqttDispatcher};
pub use retention::RetentionService;
pub use scheduler::SchedulerService;
pub use telemetry::TelemetryService;
pub use token_service::{Token, TokenClaims, TokenService};
