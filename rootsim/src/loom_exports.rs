#[cfg(all(test, rootsim_loom))]
pub(crate) mod sync {
    pub(crate) use loom::sync::{Arc, Mutex};
    pub(crate) use std::sync::PoisonError;

    pub(crate) mod atomic {
        pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};
    }
}
#[cfg(not(all(test, rootsim_loom)))]
pub(crate) mod sync {
    pub(crate) use std::sync::{Mutex, PoisonError};

    pub(crate) mod atomic {
        pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};
    }
}
