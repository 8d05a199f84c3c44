mod device;
mod energy_data;
mod energy_mode;
mod schedule;
mod user;
mod user_device;

pub use device::{Device, DeviceTable};
pub use energy_data::{EnergyData, EnergyDataTable};
pub use energy_mode::{ChangedBy, DeviceEnergyMode, EnergyModeTable, Mode, ModeHistoryTable};
pub use schedule::{RepeatType, Schedule, ScheduleKind, ScheduleTable};
pub use user::{User, UserTable};
pub use user_device::{UserDevice, UserDeviceTable};

pub trait Table {
    /// The name of the table
    fn name(&self) -> &'static str;

    /// The SQL statement to create the table
    fn create(&self) -> String;

    /// The SQL statement to dispose the table
    fn dispose(&self) -> String;

    /// The dependencies of the table
    fn dependencies(&self) -> Vec<&'static str>;
}
