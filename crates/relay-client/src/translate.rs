//! Reshaping remote failures to a method's declared fault list.
//!
//! Callers only ever see failures their method signature allows: unchecked
//! failures pass through, declared (or subtype-of-declared) faults pass
//! through, and everything else is wrapped, as a remote failure if the method
//! declares the generic remote kind, otherwise as a business failure.

use relay_core::{MethodDescriptor, RelayError};

/// Translate `error` raised by a call to `method`.
pub fn translate_failure(method: &MethodDescriptor, error: RelayError) -> RelayError {
    if error.is_unchecked() {
        return error;
    }
    let Some(kind) = error.fault_kind() else {
        return error;
    };

    let mut declares_remote = false;
    for declared in method.declared_faults() {
        if kind.is_assignable_to(declared) {
            return error;
        }
        if declared.is_remote() {
            declares_remote = true;
        }
    }

    if declares_remote {
        error.into_remote()
    } else {
        error.into_business()
    }
}
