mod device;
mod energy_data;
mod energy_mode;
mod schedule;
mod user;

pub use device::{DeviceRepository, DeviceWithAccess};
pub use energy_data::{EnergyDataRepository, EnergyStats};
pub use energy_mode::{EnergyModeRepository, ModeHistoryEntry};
pub use schedule::{ScheduleDraft, ScheduleRepository};
pub use user::UserRepository;
