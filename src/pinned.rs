//! Heap slots whose address is handed to native code as callback user data.
//!
//! A [`PinnedSlot`] keeps one value at a stable address from construction
//! until release. Native code holds that address between a successful
//! registration (subscribe, context create, enumerate) and the matching
//! unregistration, so the owner must release the slot strictly after the
//! unregistration call has returned success.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;

#[cfg(test)]
thread_local! {
    static LIVE_SLOTS: std::cell::Cell<isize> = const { std::cell::Cell::new(0) };
}

/// Number of slots created and not yet released on this thread.
#[cfg(test)]
pub(crate) fn live_slots() -> isize {
    LIVE_SLOTS.with(|c| c.get())
}

pub struct PinnedSlot<T> {
    ptr: NonNull<T>,
    _owns: PhantomData<Box<T>>,
}

impl<T> PinnedSlot<T> {
    pub fn new(value: T) -> Self {
        #[cfg(test)]
        LIVE_SLOTS.with(|c| c.set(c.get() + 1));
        Self {
            ptr: NonNull::from(Box::leak(Box::new(value))),
            _owns: PhantomData,
        }
    }

    /// Address passed to native code.
    pub fn user_data(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    pub fn get(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }

    /// Owner-side access. Only valid while no native call that may invoke
    /// the slot is in flight, which `&mut self` on the owner guarantees.
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { self.ptr.as_mut() }
    }

    /// Free the slot. Call only after native code can no longer reach it.
    pub fn release(self) {
        drop(self);
    }

    /// Give up the slot without freeing it, for teardown paths where the
    /// native side could not confirm unregistration.
    pub fn abandon(self) {
        log::warn!("Abandoning pinned callback slot at {:p}", self.ptr);
        std::mem::forget(self);
    }

    /// Recover the slot value inside a native callback.
    ///
    /// # Safety
    /// `user_data` must be the address of a live `PinnedSlot<T>`, and no other
    /// reference to its value may be active.
    pub unsafe fn from_user_data<'a>(user_data: *mut c_void) -> &'a mut T {
        &mut *(user_data as *mut T)
    }

    /// Shared variant of [`from_user_data`](Self::from_user_data) for slots
    /// native code may reach from several threads at once.
    ///
    /// # Safety
    /// `user_data` must be the address of a live `PinnedSlot<T>`.
    pub unsafe fn shared_from_user_data<'a>(user_data: *mut c_void) -> &'a T {
        &*(user_data as *const T)
    }
}

impl<T> Drop for PinnedSlot<T> {
    fn drop(&mut self) {
        #[cfg(test)]
        LIVE_SLOTS.with(|c| c.set(c.get() - 1));
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
    }
}
