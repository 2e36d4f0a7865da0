use crate::utils::{Result, TranscodeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Holds a session's export flag for as long as an export pass is alive and
/// clears it on drop, whether the pass finished, failed or was cancelled.
#[derive(Debug)]
pub struct ExportGuard {
    flag: Arc<AtomicBool>,
}

impl ExportGuard {
    pub fn reserve(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TranscodeError::ExportInProgress)?;
        Ok(Self {
            flag: Arc::clone(flag),
        })
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_reservation_rejected() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = ExportGuard::reserve(&flag).expect("first");
        assert!(flag.load(Ordering::Acquire));

        let err = ExportGuard::reserve(&flag).unwrap_err();
        assert!(matches!(err, TranscodeError::ExportInProgress));

        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(ExportGuard::reserve(&flag).is_ok());
    }

    #[test]
    fn test_flag_cleared_on_panic_unwind() {
        let flag = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&flag);
        let result = std::panic::catch_unwind(move || {
            let _guard = ExportGuard::reserve(&inner).expect("reserve");
            panic!("export blew up");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }
}
