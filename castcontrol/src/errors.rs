use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("discovery error: {0}")]
    Discovery(String),
    #[error("session {0} already exists")]
    SessionExists(String),
}

impl From<mdns_sd::Error> for ControlError {
    fn from(err: mdns_sd::Error) -> Self {
        ControlError::Discovery(err.to_string())
    }
}
