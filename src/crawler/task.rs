use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 后台任务，附带取消令牌，关闭或重新开始时可以确定地停止
pub struct Job<R: Send + 'static> {
    token: CancellationToken,
    handle: JoinHandle<R>,
}

impl<R: Send + 'static> Job<R> {
    pub fn spawn<F, Fut>(task: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(task(token.clone()));
        Self { token, handle }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub async fn wait(self) -> Result<R> {
        Ok(self.handle.await?)
    }
}

/// 等待指定时间；期间被取消则返回 false
pub async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
