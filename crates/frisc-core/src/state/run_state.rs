use crate::Fault;

/// Host-observable execution state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Ready to execute the next instruction.
    #[default]
    Ready,
    /// A taken `HALT` stopped the run loop.
    Halted,
    /// Fault is latched; only reset clears it.
    Faulted(Fault),
}

impl RunState {
    /// Returns the currently latched fault, if any.
    #[must_use]
    pub const fn latched_fault(self) -> Option<Fault> {
        match self {
            Self::Faulted(fault) => Some(fault),
            Self::Ready | Self::Halted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RunState;
    use crate::{DecodeError, Fault};

    #[test]
    fn run_state_default_is_ready() {
        assert_eq!(RunState::default(), RunState::Ready);
    }

    #[test]
    fn latched_fault_accessor_reports_only_faulted_variant() {
        let fault = Fault::Decode(DecodeError::UnknownOpcode { word: 0x7000_0000 });

        assert_eq!(RunState::Ready.latched_fault(), None);
        assert_eq!(RunState::Halted.latched_fault(), None);
        assert_eq!(RunState::Faulted(fault).latched_fault(), Some(fault));
    }
}
