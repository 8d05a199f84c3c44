use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not found")]
    DeviceNotFound,

    #[error("Access denied")]
    AccessDenied,

    #[error("Only device owner may perform this action")]
    NotOwner,

    #[error("Invalid confirmation code or device not found")]
    InvalidConfirmationCode,

    #[error("You already have access to this device")]
    AlreadyLinked,

    #[error("User already has access to this device")]
    TargetAlreadyLinked,
}

impl DeviceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeviceError::DeviceNotFound => StatusCode::NOT_FOUND,
            DeviceError::AccessDenied => StatusCode::FORBIDDEN,
            DeviceError::NotOwner => StatusCode::FORBIDDEN,
            DeviceError::InvalidConfirmationCode => StatusCode::BAD_REQUEST,
            DeviceError::AlreadyLinked => StatusCode::BAD_REQUEST,
            DeviceError::TargetAlreadyLinked => StatusCode::BAD_REQUEST,
        }
    }
}
