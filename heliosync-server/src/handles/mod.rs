pub mod auth_handle;
pub mod device_handle;
pub mod energy_handle;
pub mod health_handle;
pub mod mode_handle;
pub mod schedule_handle;

pub use auth_handle::{auth_router, AuthState};
pub use device_handle::{device_router, DeviceState};
pub use energy_handle::{energy_router, EnergyState};
pub use health_handle::{health_router, HealthState};
pub use mode_handle::{mode_router, ModeState};
pub use schedule_handle::{schedule_router, ScheduleState};
