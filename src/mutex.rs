use core::{
    cell::UnsafeCell,
    sync::atomic::AtomicBool,
    sync::atomic::Ordering::*,
    future::poll_fn,
    task::Poll,
    ops::{Deref, DerefMut},
    };

/**
    mutex acquired by polling, usable without any runtime or allocator

    waiting tasks are rescheduled immediately, so holding it for long keeps the waiters spinning
*/
pub struct BusyMutex<T> {
    value: UnsafeCell<T>,
    locked: AtomicBool,
}
// SAFETY: access to the value is only given through a guard, and only one guard can exist at a time
unsafe impl<T: Send> Send for BusyMutex<T> {}
unsafe impl<T: Send> Sync for BusyMutex<T> {}

impl<T> BusyMutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            locked: AtomicBool::new(false),
        }
    }
    pub fn try_lock(&self) -> Option<BusyMutexGuard<'_, T>> {
        BusyMutexGuard::try_new(self)
    }
    /// busy polling future until lock is acquired
    pub async fn lock(&self) -> BusyMutexGuard<'_, T> {
        poll_fn(|context| match BusyMutexGuard::try_new(self) {
            Some(guard) => Poll::Ready(guard),
            None => {
                context.waker().wake_by_ref();
                Poll::Pending
            },
            }).await
    }
}

pub struct BusyMutexGuard<'m, T> {
    mutex: &'m BusyMutex<T>,
}
impl<'m, T> BusyMutexGuard<'m, T> {
    fn try_new(mutex: &'m BusyMutex<T>) -> Option<Self> {
        if mutex.locked.swap(true, Acquire)
            {None}
        else
            {Some(Self {mutex})}
    }
}
impl<T> Deref for BusyMutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe {& *self.mutex.value.get()}
    }
}
impl<T> DerefMut for BusyMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe {&mut *self.mutex.value.get()}
    }
}
impl<T> Drop for BusyMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Release);
    }
}
