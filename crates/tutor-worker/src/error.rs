use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("broker error: {0}")]
    Broker(#[from] tutor_broker::BrokerError),
}
