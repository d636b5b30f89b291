//! 파일 시스템 감시 관리 모듈
//!
//! 엔드포인트별 notify watcher를 관리하고, 변경된 경로를 bounded 채널로 전달합니다.

use crate::media::WatchEndpoint;
use anyhow::{bail, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 콜백에서 처리 태스크로 넘기는 채널의 크기
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// 감시 중인 엔드포인트에서 나오는 경로 스트림
#[derive(Debug)]
pub struct WatchFeed {
    pub endpoint: WatchEndpoint,
    pub paths: mpsc::Receiver<PathBuf>,
    pub cancellation_token: CancellationToken,
}

/// 단일 엔드포인트의 Watcher 정보
pub struct EndpointWatcher {
    pub endpoint: WatchEndpoint,
    pub roots: Vec<PathBuf>,
    _watcher: RecommendedWatcher,
    cancellation_token: CancellationToken,
}

/// 여러 엔드포인트의 Watcher를 관리하는 매니저
#[derive(Default)]
pub struct WatcherManager {
    watchers: HashMap<WatchEndpoint, EndpointWatcher>,
}

impl std::fmt::Debug for WatcherManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherManager")
            .field("endpoints", &self.get_watching_endpoints())
            .finish()
    }
}

/// 새 파일로 볼 수 있는 이벤트인지 확인합니다.
fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

impl WatcherManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔드포인트의 루트들을 재귀적으로 감시합니다.
    /// 존재하지 않는 루트는 건너뛰고, 하나도 감시하지 못하면 에러를 반환합니다.
    pub fn start_watching(&mut self, endpoint: WatchEndpoint, roots: &[PathBuf]) -> Result<WatchFeed> {
        // 이미 감시 중이면 중지 후 재시작
        if self.watchers.contains_key(&endpoint) {
            self.stop_watching(endpoint);
        }

        let cancellation_token = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) if is_relevant(&event.kind) => event,
                Ok(_) => return,
                Err(e) => {
                    warn!("Watch error on {}: {e}", endpoint.key());
                    return;
                }
            };
            for path in event.paths {
                // 콜백은 블로킹하지 않음: 채널이 가득 차면 이벤트를 버립니다.
                if let Err(mpsc::error::TrySendError::Full(path)) = tx.try_send(path) {
                    warn!("Event queue for {} full, dropping {}", endpoint.key(), path.display());
                }
            }
        })?;

        let mut watched = Vec::new();
        for root in roots {
            if !root.is_dir() {
                debug!("Skipping missing watch root {}", root.display());
                continue;
            }
            match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => watched.push(root.clone()),
                Err(e) => warn!("Cannot watch {}: {e}", root.display()),
            }
        }
        if watched.is_empty() {
            bail!("No watchable roots for endpoint {}", endpoint.key());
        }

        debug!("Watching {} roots for {}", watched.len(), endpoint.key());
        self.watchers.insert(
            endpoint,
            EndpointWatcher {
                endpoint,
                roots: watched,
                _watcher: watcher,
                cancellation_token: cancellation_token.clone(),
            },
        );

        Ok(WatchFeed {
            endpoint,
            paths: rx,
            cancellation_token,
        })
    }

    /// 특정 엔드포인트의 감시를 중지합니다.
    pub fn stop_watching(&mut self, endpoint: WatchEndpoint) -> bool {
        // Drop에서 토큰이 취소됩니다.
        self.watchers.remove(&endpoint).is_some()
    }

    /// 감시 중인 엔드포인트 목록을 반환합니다.
    pub fn get_watching_endpoints(&self) -> Vec<WatchEndpoint> {
        let mut endpoints: Vec<_> = self.watchers.keys().copied().collect();
        endpoints.sort();
        endpoints
    }

    pub fn is_watching(&self, endpoint: WatchEndpoint) -> bool {
        self.watchers.contains_key(&endpoint)
    }

    /// 모든 감시를 중지합니다.
    pub fn stop_all(&mut self) {
        self.watchers.clear();
    }
}

impl Drop for EndpointWatcher {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}
