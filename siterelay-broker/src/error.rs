//! Error types for queue transports.

use thiserror::Error;

/// Errors raised by a queue connection, sender or receiver.
///
/// All of these are transport faults: callers recover by discarding the
/// handle and reconnecting, never by surfacing the error further.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not establish a connection, channel or queue.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The handle was used after its connection dropped.
    #[error("Not connected")]
    NotConnected,

    /// The broker rejected or failed a publish.
    #[error("Send failed: {0}")]
    Send(String),

    /// Reading or acknowledging a delivery failed.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// The broker closed the subscription.
    #[error("Subscription closed by broker")]
    Closed,
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                BrokerError::NotConnected
            }
            other => BrokerError::Connection(other.to_string()),
        }
    }
}
