// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 服务器统计信息：请求/响应计数与字节数，以及进程元数据。
//!
//! 计数器只增不减，直到进程重启。

use chrono::{DateTime, Local};
use lazy_static::lazy_static;
use serde_derive::Serialize;

use crate::param::{SERVER_NAME, VERSION};
use crate::util::hostname;

lazy_static! {
    static ref PROCESS_START: DateTime<Local> = Local::now();
}

/// 进程启动时间。首次调用时确定，之后所有服务器实例共用同一个值。
pub fn process_start() -> DateTime<Local> {
    *PROCESS_START
}

/// 静态的服务器与进程元数据
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub start_time: String,
    pub pid: u32,
    pub version: String,
    pub component: String,
}

/// 单向计数器
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct Counter {
    pub count: u64,
    pub bytes: u64,
}

impl Counter {
    fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes += bytes;
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct RequestCounters {
    pub http: Counter,
    pub https: Counter,
}

impl RequestCounters {
    pub fn total(&self) -> u64 {
        self.http.count + self.https.count
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ServerStatistics {
    pub server: ServerInfo,
    pub request: RequestCounters,
    pub response: Counter,
}

impl ServerStatistics {
    pub fn new(hostname: String) -> Self {
        Self {
            server: ServerInfo {
                hostname,
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
                start_time: process_start().to_rfc3339(),
                pid: std::process::id(),
                version: VERSION.to_string(),
                component: SERVER_NAME.to_string(),
            },
            request: RequestCounters::default(),
            response: Counter::default(),
        }
    }

    /// 记录一个请求，按是否加密分别计数
    pub fn record_request(&mut self, secure: bool, bytes: u64) {
        if secure {
            self.request.https.add(bytes);
        } else {
            self.request.http.add(bytes);
        }
    }

    pub fn record_response(&mut self, bytes: u64) {
        self.response.add(bytes);
    }
}

impl Default for ServerStatistics {
    fn default() -> Self {
        Self::new(hostname())
    }
}
