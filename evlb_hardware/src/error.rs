use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("charger {charger_id} did not respond to {command}")]
    NoResponse {
        charger_id: String,
        command: &'static str,
    },
    #[error("device disconnected")]
    Disconnected,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
