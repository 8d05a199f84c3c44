use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Invalid mode. Must be \"solar\" or \"grid\"")]
    InvalidMode,
}

impl ModeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ModeError::InvalidMode => StatusCode::BAD_REQUEST,
        }
    }
}
