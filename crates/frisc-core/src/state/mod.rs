//! Architectural CPU state model primitives.

/// Register file types and storage model.
pub mod registers;
/// Machine run-state model.
pub mod run_state;

pub use registers::{
    GeneralRegister, RegisterFile, GENERAL_REGISTER_COUNT, SR_ACTIVE_MASK, SR_C, SR_EINT0,
    SR_EINT1, SR_EINT2, SR_FLAGS_MASK, SR_GIE, SR_INT0, SR_INT1, SR_INT2, SR_MOVE_MASK, SR_N,
    SR_V, SR_Z,
};
pub use run_state::RunState;
