//! Allocation ledger for memory handed across the boundary
//!
//! Every box, string and slice buffer given to the caller goes through
//! these helpers so the number of live allocations can be observed.
//!
//! The count is kept per thread, so concurrent callers do not see each
//! other's allocations. An allocation is counted on the thread that made
//! it and uncounted on the thread that frees it: a handle moved to another
//! thread and released there leaves `+1` behind on the first thread and
//! `-1` on the second. Only the sum over all threads is exact.

use std::cell::Cell;
use std::ffi::{c_char, CString};

thread_local! {
    static LIVE: Cell<i64> = const { Cell::new(0) };
}

fn adjust(delta: i64) {
    LIVE.with(|live| live.set(live.get() + delta));
}

/// Move `value` to the heap and hand out ownership
pub fn into_raw<T>(value: T) -> *mut T {
    adjust(1);
    Box::into_raw(Box::new(value))
}

/// Take back ownership of a pointer produced by [`into_raw`]
///
/// # Safety
/// `ptr` must come from `into_raw::<T>` and not have been reclaimed before.
pub unsafe fn from_raw<T>(ptr: *mut T) -> Box<T> {
    adjust(-1);
    Box::from_raw(ptr)
}

/// Hand out a nul-terminated copy of `s`. Interior nul bytes are dropped.
pub fn string_into_raw(s: &str) -> *mut c_char {
    let owned = CString::new(s.replace('\0', "")).unwrap_or_default();
    adjust(1);
    owned.into_raw()
}

/// # Safety
/// `ptr` must come from [`string_into_raw`] and not have been reclaimed before.
pub unsafe fn string_from_raw(ptr: *mut c_char) -> CString {
    adjust(-1);
    CString::from_raw(ptr)
}

/// Live allocations handed out on this thread
pub fn live_allocations() -> i64 {
    LIVE.with(Cell::get)
}

/// Live allocations handed out on the calling thread
#[no_mangle]
pub extern "C" fn opal_live_allocations() -> i64 {
    live_allocations()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_balances() {
        let before = live_allocations();
        let ptr = into_raw(42_u64);
        let s = string_into_raw("hello");
        assert_eq!(live_allocations(), before + 2);

        let value = unsafe { from_raw(ptr) };
        assert_eq!(*value, 42);
        let s = unsafe { string_from_raw(s) };
        assert_eq!(s.to_str().unwrap(), "hello");
        assert_eq!(live_allocations(), before);
    }

    #[test]
    fn test_ledger_is_per_thread() {
        let before = live_allocations();
        let ptr = into_raw(7_u32) as usize;
        let freed_there = std::thread::spawn(move || {
            drop(unsafe { from_raw(ptr as *mut u32) });
            live_allocations()
        })
        .join()
        .unwrap();
        assert_eq!(freed_there, -1);
        assert_eq!(live_allocations(), before + 1);
    }
}
