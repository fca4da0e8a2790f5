//! Status codes and per-operation error types
use core::{fmt, mem::transmute};

/// The macro to define [`StatusCode`].
macro_rules! define_status_code {
    (
        $( #[$meta:meta] )*
        pub enum StatusCode {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident = $vd:expr
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        pub enum StatusCode {
            $(
                $( #[$vmeta] )*
                $vname = $vd
            ),*
        }

        impl StatusCode {
            /// Get the short name of the status code.
            ///
            /// # Examples
            ///
            /// ```
            /// use osal_core::StatusCode;
            /// assert_eq!(StatusCode::SemTimeout.as_str(), "SemTimeout");
            /// ```
            pub fn as_str(self) -> &'static str {
                match self {
                    $(
                        Self::$vname => stringify!($vname),
                    )*
                }
            }

            fn fmt(self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl fmt::Debug for StatusCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }

        impl fmt::Display for StatusCode {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                (*self).fmt(f)
            }
        }
    };
}

define_status_code! {
    /// All status codes (including success) that an implementation operation
    /// can report to the portable layer.
    ///
    /// The numeric values are the ones the portable layer uses at its
    /// boundary, so [`StatusCode::as_raw`] can be handed out unchanged.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    #[repr(i32)]
    pub enum StatusCode {
        /// The operation was successful.
        Success = 0,
        /// Generic failure with no more specific code.
        Error = -1,
        /// A pointer-like argument (e.g., system data) is malformed.
        InvalidPointer = -2,
        /// A timed wait on a condition variable elapsed.
        ErrorTimeout = -4,
        /// A semaphore or mutex operation failed in the kernel.
        SemFailure = -6,
        /// A timed semaphore take elapsed without the semaphore becoming
        /// available.
        SemTimeout = -7,
        /// A non-blocking queue receive found the queue empty.
        QueueEmpty = -8,
        /// The queue has no room for another message.
        QueueFull = -9,
        /// A timed queue receive elapsed.
        QueueTimeout = -10,
        /// A message or buffer size is out of range for the queue.
        QueueInvalidSize = -11,
        /// The object table of the requested category is full.
        ErrNoFreeIds = -14,
        /// The token does not resolve to a live object of the expected
        /// category.
        InvalidId = -16,
        /// The initial value of a counting semaphore is out of range.
        InvalidSemValue = -20,
        /// The operation is deliberately unsupported by this backend.
        NotImplemented = -28,
        /// A timebase argument is out of range.
        TimerErrInvalidArgs = -29,
        /// The timebase machinery (threads, locks, tick semaphore) could not
        /// be set up.
        TimerErrInternal = -32,
        /// The object is in a state that disallows the operation.
        IncorrectObjState = -35,
    }
}

impl StatusCode {
    /// Get a flag indicating whether the code represents a failure.
    ///
    /// Failure codes have negative values.
    #[inline]
    pub fn is_err(self) -> bool {
        (self as i32) < 0
    }

    /// Get a flag indicating whether the code represents a success.
    ///
    /// Success codes have non-negative values.
    #[inline]
    pub fn is_ok(self) -> bool {
        !self.is_err()
    }

    /// Get the numeric value reported at the portable-layer boundary.
    #[inline]
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

macro_rules! define_error {
    (
        mod $mod_name:ident {}
        $( #[$meta:meta] )*
        $vis:vis enum $name:ident $(: $($subty:ident),* $(,)*)? {
            $(
                $( #[$vmeta:meta] )*
                $vname:ident
            ),* $(,)*
        }
    ) => {
        $( #[$meta] )*
        ///
        /// See [`StatusCode`] for all status codes and generic descriptions.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(i32)]
        $vis enum $name {
            $(
                $( #[$vmeta] )*
                // Use the same discriminants as `StatusCode` for cost-free
                // conversion
                $vname = StatusCode::$vname as i32
            ),*
        }

        impl fmt::Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                StatusCode::from(*self).fmt(f)
            }
        }

        impl fmt::Display for $name {
            #[inline]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                StatusCode::from(*self).fmt(f)
            }
        }

        impl std::error::Error for $name {}

        impl From<Result<(), $name>> for StatusCode {
            #[inline]
            fn from(x: Result<(), $name>) -> Self {
                match x {
                    Ok(()) => Self::Success,
                    Err(e) => Self::from(e),
                }
            }
        }

        impl From<$name> for StatusCode {
            #[inline]
            fn from(x: $name) -> Self {
                // Safety: `StatusCode` and `$name` has the same representation
                //         type, and the representation of `StatusCode` is a
                //         superset of `x`.
                unsafe { transmute(x) }
            }
        }

        #[cfg(test)]
        mod $mod_name {
            use super::*;

            #[test]
            fn to_status_code() {
                $(
                    assert_eq!(
                        StatusCode::$vname,
                        StatusCode::from($name::$vname),
                    );
                )*
            }

            #[test]
            fn result_to_status_code() {
                $(
                    assert_eq!(
                        StatusCode::$vname,
                        StatusCode::from(Err($name::$vname)),
                    );
                )*
                assert_eq!(
                    StatusCode::Success,
                    StatusCode::from(Result::<(), $name>::Ok(())),
                );
            }
        }

        $($(
            $subty!(impl From<_> for $name);
        )*)?

        #[allow(unused_macros)]
        macro_rules! $name {
            (impl From<_> for $dest_ty:ty) => {
                impl From<$name> for $dest_ty {
                    #[inline]
                    fn from(x: $name) -> Self {
                        match x {
                            $(
                                $name::$vname => Self::$vname,
                            )*
                        }
                    }
                }
            };
        }
    };
}

define_error! {
    mod invalid_id_error {}
    /// Error type for resolving an object token.
    pub enum InvalidIdError {
        /// The token does not resolve to a live object of the expected
        /// category, or the category was never initialized.
        InvalidId,
    }
}

define_error! {
    mod init_error {}
    /// Error type for the per-category global initializer.
    pub enum InitError {
        /// The kernel could not provide a process-wide lock or semaphore.
        Error,
    }
}

define_error! {
    mod table_lock_error {}
    /// Error type for the per-category table lock.
    pub enum TableLockError: InvalidIdError {
        /// The category was never initialized.
        InvalidId,
        /// The lock is not held by the calling thread.
        Error,
    }
}

define_error! {
    mod alloc_id_error {}
    /// Error type for [`IdMap::allocate`].
    ///
    /// [`IdMap::allocate`]: crate::IdMap::allocate
    pub enum AllocIdError {
        /// Every slot of the category is in use.
        ErrNoFreeIds,
    }
}

define_error! {
    mod sem_error {}
    /// Error type for semaphore and mutex operations that do not time out.
    pub enum SemError: InvalidIdError {
        InvalidId,
        /// The kernel refused to allocate or operate the semaphore.
        SemFailure,
    }
}

define_error! {
    mod sem_timed_wait_error {}
    /// Error type for timed semaphore takes.
    pub enum SemTimedWaitError: InvalidIdError, SemError {
        InvalidId,
        SemFailure,
        /// The budget elapsed with no give or flush.
        SemTimeout,
    }
}

define_error! {
    mod count_sem_create_error {}
    /// Error type for counting semaphore creation.
    pub enum CountSemCreateError: InvalidIdError {
        InvalidId,
        /// The initial value exceeds [`SEM_VALUE_MAX`].
        ///
        /// [`SEM_VALUE_MAX`]: crate::SEM_VALUE_MAX
        InvalidSemValue,
        SemFailure,
    }
}

define_error! {
    mod get_info_error {}
    /// Error type for property queries.
    pub enum GetInfoError: InvalidIdError {
        InvalidId,
        /// The backend cannot report this property.
        NotImplemented,
    }
}

define_error! {
    mod cond_var_error {}
    /// Error type for condition variable operations.
    pub enum CondVarError: InvalidIdError {
        InvalidId,
        /// The kernel refused the operation (e.g., unlocking a mutex that
        /// the caller does not hold).
        Error,
    }
}

define_error! {
    mod cond_var_timed_wait_error {}
    /// Error type for timed condition variable waits.
    pub enum CondVarTimedWaitError: InvalidIdError, CondVarError {
        InvalidId,
        Error,
        /// The absolute wake-up time passed without a signal.
        ErrorTimeout,
    }
}

define_error! {
    mod queue_create_error {}
    /// Error type for queue creation.
    pub enum QueueCreateError: InvalidIdError {
        InvalidId,
        /// The depth or the message size is zero.
        QueueInvalidSize,
        /// Memory or kernel resources for the queue could not be allocated.
        Error,
    }
}

define_error! {
    mod queue_get_error {}
    /// Error type for receiving from a queue.
    pub enum QueueGetError: InvalidIdError {
        InvalidId,
        /// The caller's buffer is shorter than the oldest message.
        QueueInvalidSize,
        /// The queue was empty and the caller asked not to block.
        QueueEmpty,
        /// The timeout elapsed while the queue stayed empty.
        QueueTimeout,
    }
}

define_error! {
    mod queue_put_error {}
    /// Error type for sending to a queue.
    pub enum QueuePutError: InvalidIdError {
        InvalidId,
        /// The message is longer than the queue's maximum message size.
        QueueInvalidSize,
        /// The queue already holds `max_depth` messages.
        QueueFull,
    }
}

define_error! {
    mod task_error {}
    /// Error type for task operations.
    pub enum TaskError: InvalidIdError {
        InvalidId,
        /// The kernel could not create the thread, or the calling thread is
        /// not the task.
        Error,
    }
}

define_error! {
    mod not_implemented_error {}
    /// Error type for operations this backend deliberately does not support.
    pub enum NotImplementedError {
        NotImplemented,
    }
}

define_error! {
    mod validate_system_data_error {}
    /// Error type for validating foreign system data.
    pub enum ValidateSystemDataError {
        /// The data is missing or has the wrong size.
        InvalidPointer,
    }
}

define_error! {
    mod time_base_create_error {}
    /// Error type for timebase creation.
    pub enum TimeBaseCreateError: InvalidIdError {
        InvalidId,
        /// A lock, the tick semaphore or a helper thread could not be
        /// created. Everything acquired before the failure has been released.
        TimerErrInternal,
    }
}

define_error! {
    mod time_base_set_error {}
    /// Error type for arming a timebase.
    pub enum TimeBaseSetError: InvalidIdError {
        InvalidId,
        /// The start time or the interval does not fit in the portable
        /// layer's signed 32-bit tick count.
        TimerErrInvalidArgs,
    }
}
