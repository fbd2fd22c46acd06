// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 服务器实例的共享状态，由所有连接任务通过 `Arc` 共享。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use log::warn;

use crate::config::ServerConfig;
use crate::param::DEBUG_ENV;
use crate::stats::ServerStatistics;
use crate::util::hostname;

pub struct ServerState {
    active: AtomicBool,
    ping_enabled: AtomicBool,
    debug: bool,
    headers: RwLock<Vec<(String, String)>>,
    statistics: Mutex<ServerStatistics>,
    file_root: PathBuf,
    max_body_size: usize,
    max_header_size: usize,
    hostname: String,
    next_id: AtomicU64,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        let debug = std::env::var(DEBUG_ENV)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let hostname = hostname();
        Self {
            active: AtomicBool::new(true),
            ping_enabled: AtomicBool::new(config.ping_enabled()),
            debug,
            headers: RwLock::new(
                config
                    .headers()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
            statistics: Mutex::new(ServerStatistics::new(hostname.clone())),
            file_root: PathBuf::from(config.file_root()),
            max_body_size: config.max_body_size(),
            max_header_size: config.max_header_size(),
            hostname,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 标记为非活动状态，返回调用前是否处于活动状态
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    pub fn ping_enabled(&self) -> bool {
        self.ping_enabled.load(Ordering::SeqCst)
    }

    /// 关闭自动应答的 `GET /api/ping`
    pub fn disable_ping(&self) {
        self.ping_enabled.store(false, Ordering::SeqCst);
    }

    /// 是否开启了 `AB_DEBUG` 调试输出
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// 替换附加到每个响应上的默认标头
    pub fn set_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        match self.headers.write() {
            Ok(mut guard) => *guard = headers,
            Err(poisoned) => {
                warn!("默认标头锁已中毒，继续使用");
                *poisoned.into_inner() = headers;
            }
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        match self.headers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock_statistics(&self) -> MutexGuard<'_, ServerStatistics> {
        match self.statistics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("统计信息锁已中毒，继续使用");
                poisoned.into_inner()
            }
        }
    }

    /// 当前统计信息的快照
    pub fn statistics(&self) -> ServerStatistics {
        self.lock_statistics().clone()
    }

    pub(crate) fn record_request(&self, secure: bool, bytes: u64) {
        self.lock_statistics().record_request(secure, bytes);
    }

    pub(crate) fn record_response(&self, bytes: u64) {
        self.lock_statistics().record_response(bytes);
    }

    pub fn file_root(&self) -> &Path {
        &self.file_root
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub(crate) fn next_id(&self) -> u128 {
        self.next_id.fetch_add(1, Ordering::Relaxed) as u128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deactivate_is_one_shot() {
        let state = ServerState::new(&ServerConfig::default());
        assert!(state.is_active());
        assert!(state.deactivate());
        assert!(!state.deactivate());
        assert!(!state.is_active());
    }

    #[test]
    fn test_disable_ping() {
        let state = ServerState::new(&ServerConfig::default());
        assert!(state.ping_enabled());
        state.disable_ping();
        assert!(!state.ping_enabled());
    }

    #[test]
    fn test_set_headers_replaces() {
        let config = ServerConfig::default().with_header("X-A", "1");
        let state = ServerState::new(&config);
        assert_eq!(state.headers(), vec![("X-A".to_string(), "1".to_string())]);
        state.set_headers([("X-B", "2")]);
        assert_eq!(state.headers(), vec![("X-B".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_statistics_snapshot_is_monotonic() {
        let state = ServerState::new(&ServerConfig::default());
        state.record_request(false, 10);
        let first = state.statistics();
        state.record_request(true, 5);
        state.record_response(3);
        let second = state.statistics();
        assert!(second.request.total() > first.request.total());
        assert_eq!(second.response.bytes, 3);
    }

    #[test]
    fn test_statistics_share_hostname_and_start_time() {
        let a = ServerState::new(&ServerConfig::default());
        let b = ServerState::new(&ServerConfig::default());
        assert_eq!(a.statistics().server.hostname, a.hostname());
        assert_eq!(a.statistics().server.start_time, b.statistics().server.start_time);
    }

    #[test]
    fn test_ids_increase() {
        let state = ServerState::new(&ServerConfig::default());
        let a = state.next_id();
        let b = state.next_id();
        assert!(b > a);
    }
}
