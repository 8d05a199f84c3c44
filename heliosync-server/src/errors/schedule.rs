use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule not found")]
    ScheduleNotFound,

    #[error("Missing required fields: name, targetMode")]
    MissingRequiredFields,

    #[error("Invalid target mode")]
    InvalidTargetMode,

    #[error("Invalid secondary mode")]
    InvalidSecondaryMode,

    #[error("Invalid schedule type. Must be \"time\" or \"range\"")]
    InvalidScheduleType,

    #[error("Invalid repeat type")]
    InvalidRepeatType,

    #[error("Missing hour/minute for time schedule")]
    MissingFixedTimeFields,

    #[error("Missing start/end time for range schedule")]
    MissingRangeFields,

    #[error("Invalid time values")]
    InvalidTimeValues,

    #[error("Weekly schedules require a non-empty day list")]
    EmptyWeeklyDays,

    #[error("Invalid weekday list")]
    InvalidWeekdayList,
}

impl ScheduleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::ScheduleNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
