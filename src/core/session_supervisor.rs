//! 会话监管：按会话串行化、取消令牌
//!
//! 同一 session_id 同一时刻最多一个运行中的 ReAct 调用（持有该会话的互斥锁直到保存完成）；
//! 不同 session_id 各自加锁，互不阻塞。每次运行拿到新的 CancellationToken，cancel 只影响当前运行。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 会话级生命周期管理：按键互斥 + 当前运行的取消令牌
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    /// session_id -> 会话锁
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// session_id -> (run_id, 当前运行的取消令牌)
    tokens: Mutex<HashMap<String, (Uuid, CancellationToken)>>,
}

/// 会话独占期间持有；drop 时释放该会话
pub struct SessionLease {
    session_id: String,
    run_id: Uuid,
    cancel_token: CancellationToken,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取会话独占权（同会话排队），并为本次运行登记新的取消令牌
    pub async fn acquire(&self, session_id: &str) -> SessionLease {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;

        let token = CancellationToken::new();
        let run_id = Uuid::new_v4();
        self.tokens
            .lock()
            .await
            .insert(session_id.to_string(), (run_id, token.clone()));

        SessionLease {
            session_id: session_id.to_string(),
            run_id,
            cancel_token: token,
            _guard: guard,
        }
    }

    /// 取消该会话当前的运行；没有运行中的调用时返回 false
    pub async fn cancel(&self, session_id: &str) -> bool {
        match self.tokens.lock().await.get(session_id) {
            Some((_, token)) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// 运行结束后移除令牌（仅当登记的仍是本次运行时）；没有其他调用在等待时一并移除会话锁
    pub async fn release(&self, lease: SessionLease) {
        let session_id = lease.session_id.clone();
        {
            let mut tokens = self.tokens.lock().await;
            if tokens
                .get(&session_id)
                .is_some_and(|(run_id, _)| *run_id == lease.run_id)
            {
                tokens.remove(&session_id);
            }
        }
        drop(lease);

        // acquire 只在持有 locks 时克隆 Arc，因此计数为 1 说明没有排队者
        let mut locks = self.locks.lock().await;
        if locks
            .get(&session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&session_id);
        }
    }

    /// 当前持有或等待会话锁的会话数
    pub async fn known_sessions(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let sup = Arc::new(SessionSupervisor::new());
        let lease = sup.acquire("s1").await;

        let sup2 = sup.clone();
        let waiter = tokio::spawn(async move {
            let lease = sup2.acquire("s1").await;
            sup2.release(lease).await;
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!waiter.is_finished());

        sup.release(lease).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("second acquire should proceed after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_sessions_do_not_block() {
        let sup = SessionSupervisor::new();
        let a = sup.acquire("a").await;
        let b = tokio::time::timeout(Duration::from_millis(200), sup.acquire("b"))
            .await
            .expect("different session must not wait");
        assert_eq!(a.session_id(), "a");
        assert_eq!(b.session_id(), "b");
        assert_eq!(sup.known_sessions().await, 2);
    }

    #[tokio::test]
    async fn test_cancel_current_run() {
        let sup = SessionSupervisor::new();
        let lease = sup.acquire("s").await;
        assert!(sup.cancel("s").await);
        assert!(lease.cancel_token().is_cancelled());
        assert!(!sup.cancel("missing").await);
    }

    #[tokio::test]
    async fn test_released_sessions_are_forgotten() {
        let sup = Arc::new(SessionSupervisor::new());
        for i in 0..10 {
            let lease = sup.acquire(&format!("user-{i}")).await;
            sup.release(lease).await;
        }
        assert_eq!(sup.known_sessions().await, 0);

        let lease = sup.acquire("busy").await;
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let sup2 = sup.clone();
        let waiter = tokio::spawn(async move {
            let lease = sup2.acquire("busy").await;
            let _ = done_rx.await;
            sup2.release(lease).await;
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        // 仍有排队者时保留会话锁
        sup.release(lease).await;
        assert_eq!(sup.known_sessions().await, 1);

        done_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert_eq!(sup.known_sessions().await, 0);
    }
}
