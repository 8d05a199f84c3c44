use super::{AuthError, DeviceError, ModeError, ScheduleError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),

    #[error("Schedule error: {0}")]
    ScheduleError(#[from] ScheduleError),

    #[error("Mode error: {0}")]
    ModeError(#[from] ModeError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}
