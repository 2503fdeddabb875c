use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error reading configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<&str> for ConfigError {
    fn from(e: &str) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PriceError {
    #[error("price feed request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("price feed document error: {0}")]
    Document(#[from] serde_json::Error),
    #[error("price feed unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("weather feed request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("weather feed document error: {0}")]
    Document(#[from] serde_json::Error),
    #[error("weather feed unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("actuator request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("actuator authorization failed, check the API key")]
    Unauthorized,
    #[error("actuator rejected command: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("error reading override file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing override file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum InitError {
    #[error("initialization error: {0}")]
    Setup(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Error covering anything that can break a running day cycle.
/// The supervisor in main catches it, logs and restarts after a backoff.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("price handling failed: {0}")]
    Price(#[from] PriceError),
    #[error("actuation failed: {0}")]
    Actuator(#[from] ActuatorError),
    #[error("calendar handling failed: {0}")]
    Calendar(#[from] CalendarError),
}
