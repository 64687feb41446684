//! 재전송 타이머
//!
//! 미확인 패킷 하나당 하나씩 사용. 한 번만 발화하며, 취소 이후에는 절대 콜백을 호출하지 않는다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// 무장된 타이머 상태
struct Armed {
    /// 발화/취소 중 먼저 일어난 쪽이 true로 바꾼다
    settled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// 단발성 재전송 타이머
///
/// tokio 런타임 안에서만 `arm` 할 수 있다.
#[derive(Default)]
pub struct RetransmitTimer {
    armed: Mutex<Option<Armed>>,
}

impl RetransmitTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 마감 시간 설정
    ///
    /// 이미 무장된 상태면 이전 마감은 취소된다.
    pub fn arm<F>(&self, duration: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let settled = Arc::new(AtomicBool::new(false));
        let settled_task = settled.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if !settled_task.swap(true, Ordering::SeqCst) {
                on_expire();
            }
        });

        let previous = self.armed.lock().replace(Armed { settled, handle });
        if let Some(previous) = previous {
            Self::settle(previous);
        }
    }

    /// 취소 (여러 번 호출해도, 발화 후 호출해도 안전)
    pub fn cancel(&self) {
        if let Some(armed) = self.armed.lock().take() {
            Self::settle(armed);
        }
    }

    /// 아직 발화/취소되지 않은 마감이 있는지
    pub fn is_armed(&self) -> bool {
        self.armed
            .lock()
            .as_ref()
            .map(|armed| !armed.settled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn settle(armed: Armed) {
        armed.settled.store(true, Ordering::SeqCst);
        armed.handle.abort();
    }
}

impl Drop for RetransmitTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
