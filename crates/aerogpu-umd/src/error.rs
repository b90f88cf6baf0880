use aero_protocol::aerogpu::aerogpu_ring::AerogpuRingDecodeError;
use aero_protocol::aerogpu::cmd_writer::CmdWriterError;
use thiserror::Error;

use crate::guest_memory::GuestMemoryError;

/// Errors returned by [`crate::Device`] entry points.
///
/// `NotImplemented` is returned after a best-effort record has already been encoded; every other
/// variant means the call changed nothing.
#[derive(Debug, Error)]
pub enum UmdError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("command buffer: {0}")]
    OutOfSpace(#[from] CmdWriterError),
    #[error("submission ring full (head {head}, tail {tail}, {entry_count} entries)")]
    RingFull { head: u32, tail: u32, entry_count: u32 },
    #[error("submission failed: {0}")]
    SubmitFailed(SubmitError),
    #[error(transparent)]
    Memory(#[from] GuestMemoryError),
}

impl UmdError {
    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::InvalidArg(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}

impl From<SubmitError> for UmdError {
    fn from(value: SubmitError) -> Self {
        match value {
            SubmitError::RingFull {
                head,
                tail,
                entry_count,
            } => Self::RingFull {
                head,
                tail,
                entry_count,
            },
            other => Self::SubmitFailed(other),
        }
    }
}

/// Transport-level failures reported by a [`crate::Submitter`].
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("submission ring full (head {head}, tail {tail}, {entry_count} entries)")]
    RingFull { head: u32, tail: u32, entry_count: u32 },
    #[error("submission of {size_bytes} bytes exceeds the {capacity} byte staging slot")]
    PayloadTooLarge { size_bytes: usize, capacity: usize },
    #[error("corrupt ring or fence page: {0:?}")]
    Ring(AerogpuRingDecodeError),
    #[error(transparent)]
    Memory(#[from] GuestMemoryError),
    #[error("submission rejected: {0}")]
    Rejected(String),
}

impl From<AerogpuRingDecodeError> for SubmitError {
    fn from(value: AerogpuRingDecodeError) -> Self {
        Self::Ring(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_full_maps_to_its_own_variant() {
        let err: UmdError = SubmitError::RingFull {
            head: 1,
            tail: 5,
            entry_count: 4,
        }
        .into();
        assert!(matches!(
            err,
            UmdError::RingFull {
                head: 1,
                tail: 5,
                entry_count: 4
            }
        ));

        let err: UmdError = SubmitError::Rejected("device lost".into()).into();
        assert!(matches!(err, UmdError::SubmitFailed(SubmitError::Rejected(_))));
    }

    #[test]
    fn display_includes_context() {
        let err = UmdError::invalid_arg("fill mode 9");
        assert_eq!(err.to_string(), "invalid argument: fill mode 9");
        assert!(UmdError::not_implemented("x").is_not_implemented());
    }
}
