//! Fallback sink for faults raised inside the bus
//!
//! Mirror and observer failures are reported here instead of being appended
//! to the bus, which would recurse.

use tracing::{error, warn};

use super::error::MirrorError;
use super::hub::SubscriptionId;

/// A recovered fault, reported for operator visibility
#[derive(Debug)]
pub enum Fault {
    /// The persistence mirror failed to read, write or decode
    Persistence(MirrorError),
    /// An observer panicked while handling a snapshot
    Observer {
        subscription: SubscriptionId,
        message: String,
    },
}

impl From<MirrorError> for Fault {
    fn from(err: MirrorError) -> Self {
        Fault::Persistence(err)
    }
}

/// Destination for faults that must not re-enter the bus
pub trait FallbackSink: Send + Sync {
    fn report(&self, fault: &Fault);
}

/// Reports faults as `tracing` events under the `logbus::fallback` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl FallbackSink for TracingSink {
    fn report(&self, fault: &Fault) {
        match fault {
            Fault::Persistence(err) => {
                let kind = err
                    .disk_error_kind()
                    .map(|k| k.user_message())
                    .unwrap_or("codec failure");
                warn!(target: "logbus::fallback", error = %err, kind, "Persistence mirror fault");
            }
            Fault::Observer {
                subscription,
                message,
            } => {
                error!(
                    target: "logbus::fallback",
                    subscription = %subscription,
                    panic = %message,
                    "Observer panicked during delivery"
                );
            }
        }
    }
}
