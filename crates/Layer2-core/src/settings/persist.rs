//! Settings Persister - 설정 직렬 저장
//!
//! 저장은 하나의 writer 태스크가 순서대로 처리합니다. debounce가 0보다
//! 크면 조용한 구간 동안 들어온 쓰기를 마지막 것 하나로 합칩니다.

use splice_foundation::{Error, NativeBridge, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

enum PersistCommand {
    Write(String),
    Flush(oneshot::Sender<()>),
}

/// 설정 저장기
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistCommand>,
    requests: AtomicU64,
}

impl Persister {
    /// 현재 tokio 런타임에 writer 태스크 생성
    pub fn spawn(bridge: Arc<dyn NativeBridge>, debounce: Duration) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Settings(format!("No async runtime for settings writer: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_writer(bridge, rx, debounce));
        debug!(debounce_ms = debounce.as_millis() as u64, "Settings writer started");

        Ok(Self {
            tx,
            requests: AtomicU64::new(0),
        })
    }

    /// 저장 요청
    pub fn schedule(&self, text: String) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(PersistCommand::Write(text)).is_err() {
            warn!("Settings writer stopped, dropping write");
        }
    }

    /// 대기 중인 쓰기가 모두 저장될 때까지 대기
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(PersistCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

async fn run_writer(
    bridge: Arc<dyn NativeBridge>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    debounce: Duration,
) {
    let mut pending: Option<String> = None;

    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Write(text) => {
                pending = Some(text);

                if !debounce.is_zero() {
                    loop {
                        match tokio::time::timeout(debounce, rx.recv()).await {
                            Ok(Some(PersistCommand::Write(text))) => pending = Some(text),
                            Ok(Some(PersistCommand::Flush(ack))) => {
                                write_pending(&bridge, &mut pending).await;
                                let _ = ack.send(());
                            }
                            Ok(None) => {
                                write_pending(&bridge, &mut pending).await;
                                return;
                            }
                            Err(_) => break,
                        }
                    }
                }

                write_pending(&bridge, &mut pending).await;
            }
            PersistCommand::Flush(ack) => {
                write_pending(&bridge, &mut pending).await;
                let _ = ack.send(());
            }
        }
    }

    write_pending(&bridge, &mut pending).await;
    debug!("Settings writer stopped");
}

async fn write_pending(bridge: &Arc<dyn NativeBridge>, pending: &mut Option<String>) {
    let Some(text) = pending.take() else {
        return;
    };
    if let Err(e) = bridge.set_settings_text(text).await {
        error!("Failed to save settings: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splice_foundation::MemoryBridge;

    #[tokio::test]
    async fn test_writes_in_order() {
        let bridge = Arc::new(MemoryBridge::new());
        let persister = Persister::spawn(bridge.clone(), Duration::ZERO).unwrap();

        persister.schedule("1".to_string());
        persister.schedule("2".to_string());
        persister.flush().await;

        assert_eq!(bridge.writes(), vec!["1".to_string(), "2".to_string()]);
        assert_eq!(persister.requests(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_coalesces() {
        let bridge = Arc::new(MemoryBridge::new());
        let persister = Persister::spawn(bridge.clone(), Duration::from_millis(50)).unwrap();

        persister.schedule("a".to_string());
        persister.schedule("b".to_string());
        persister.schedule("c".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(bridge.writes(), vec!["c".to_string()]);
    }

    #[test]
    fn test_requires_runtime() {
        let bridge = Arc::new(MemoryBridge::new());
        assert!(Persister::spawn(bridge, Duration::ZERO).is_err());
    }
}
