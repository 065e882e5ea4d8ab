//! Ambient "last future" slot for asynchronous value-returning calls.
//!
//! When an asynchronous proxy calls a method that returns a plain value, the
//! call itself yields a placeholder and the real result is parked here. The
//! slot is thread-local and written at the very end of the call, so the caller
//! must take it before its next `.await`.

use crate::invocation::ResponseFuture;
use std::cell::RefCell;

thread_local! {
    static FUTURE_RESULT: RefCell<Option<ResponseFuture>> = const { RefCell::new(None) };
}

/// Park the future of the call that just returned.
pub(crate) fn set_future_result(future: ResponseFuture) {
    FUTURE_RESULT.with(|slot| {
        *slot.borrow_mut() = Some(future);
    });
}

/// Take the future parked by the most recent asynchronous call on this thread.
pub fn take_future_result() -> Option<ResponseFuture> {
    FUTURE_RESULT.with(|slot| slot.borrow_mut().take())
}
