// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器配置模块
//!
//! `ServerConfig` 描述一个服务器实例的全部启动参数。端口组合在构造时
//! 校验一次：每个端口为 0（禁用）或位于 `[1, 65535]`，不能同时为 0，
//! 也不能相等。校验失败即为致命的配置错误。

use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};

use log::{error, warn};
use serde_derive::{Deserialize, Serialize};

use crate::exception::Exception;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawConfig")]
pub struct ServerConfig {
    http_port: u16,
    https_port: u16,
    key_file: String,
    cert_file: String,
    file_root: String,
    local: bool,
    worker_threads: usize,
    max_body_size: usize,
    max_header_size: usize,
    ping_enabled: bool,
    headers: BTreeMap<String, String>,
}

/// 反序列化时的中间形态，端口保留为 `i64` 以便报告越界值
#[derive(Deserialize, Debug)]
struct RawConfig {
    #[serde(default = "default_http_port")]
    http_port: i64,
    #[serde(default)]
    https_port: i64,
    #[serde(default = "default_key_file")]
    key_file: String,
    #[serde(default = "default_cert_file")]
    cert_file: String,
    #[serde(default = "default_file_root")]
    file_root: String,
    #[serde(default)]
    local: bool,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    #[serde(default = "default_max_header_size")]
    max_header_size: usize,
    #[serde(default = "default_ping_enabled")]
    ping_enabled: bool,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

fn default_http_port() -> i64 {
    8080
}

fn default_key_file() -> String {
    "key.pem".to_string()
}

fn default_cert_file() -> String {
    "cert.pem".to_string()
}

fn default_file_root() -> String {
    ".".to_string()
}

fn default_max_body_size() -> usize {
    10485760 // 10MB
}

fn default_max_header_size() -> usize {
    65536 // 64KB
}

fn default_ping_enabled() -> bool {
    true
}

impl TryFrom<RawConfig> for ServerConfig {
    type Error = Exception;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let (http_port, https_port) = validate_ports(raw.http_port, raw.https_port)?;
        if raw.max_header_size == 0 {
            warn!("max_header_size被设置为0，将使用默认值{}", default_max_header_size());
        }
        Ok(Self {
            http_port,
            https_port,
            key_file: raw.key_file,
            cert_file: raw.cert_file,
            file_root: raw.file_root,
            local: raw.local,
            worker_threads: raw.worker_threads,
            max_body_size: raw.max_body_size,
            max_header_size: if raw.max_header_size == 0 {
                default_max_header_size()
            } else {
                raw.max_header_size
            },
            ping_enabled: raw.ping_enabled,
            headers: raw.headers,
        })
    }
}

/// 校验端口组合，返回 `(http_port, https_port)`。
///
/// 检查顺序：越界、同时为 0、两者相等。
pub fn validate_ports(http_port: i64, https_port: i64) -> Result<(u16, u16), Exception> {
    for port in [http_port, https_port] {
        if !(0..=65535).contains(&port) {
            return Err(Exception::PortOutOfRange(port));
        }
    }
    let (http_port, https_port) = (http_port as u16, https_port as u16);
    if http_port == 0 && https_port == 0 {
        return Err(Exception::NoPortEnabled);
    }
    if http_port == https_port {
        return Err(Exception::PortsEqual(http_port));
    }
    Ok((http_port, https_port))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            https_port: 0,
            key_file: default_key_file(),
            cert_file: default_cert_file(),
            file_root: default_file_root(),
            local: false,
            worker_threads: 0,
            max_body_size: default_max_body_size(),
            max_header_size: default_max_header_size(),
            ping_enabled: true,
            headers: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// 以一对端口构造配置，其余字段取默认值
    pub fn from_ports(http_port: i64, https_port: i64) -> Result<Self, Exception> {
        let (http_port, https_port) = validate_ports(http_port, https_port)?;
        Ok(Self {
            http_port,
            https_port,
            ..Self::default()
        })
    }

    /// 从 TOML 文件加载配置。
    ///
    /// 文件缺失或格式错误返回 `ConfigUnreadable`，端口非法返回对应的端口错误。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let str_val = fs::read_to_string(filename).map_err(|e| {
            error!("无法读取配置文件{}：{}", filename, e);
            Exception::ConfigUnreadable(format!("{}: {}", filename, e))
        })?;
        Self::from_toml_str(&str_val)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, Exception> {
        let raw: RawConfig = toml::from_str(content).map_err(|e| {
            error!("无法成功从配置文件构建配置对象：{}", e);
            Exception::ConfigUnreadable(e.to_string())
        })?;
        Self::try_from(raw)
    }

    pub fn with_tls_files(mut self, key_file: &str, cert_file: &str) -> Self {
        self.key_file = key_file.to_string();
        self.cert_file = cert_file.to_string();
        self
    }

    pub fn with_file_root(mut self, file_root: &str) -> Self {
        self.file_root = file_root.to_string();
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// 设置请求体上限，0 表示不限制
    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn with_max_header_size(mut self, max_header_size: usize) -> Self {
        if max_header_size > 0 {
            self.max_header_size = max_header_size;
        }
        self
    }

    pub fn with_ping_enabled(mut self, ping_enabled: bool) -> Self {
        self.ping_enabled = ping_enabled;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// 重新执行端口校验，供手工修改后的配置在启动前使用
    pub fn validate(&self) -> Result<(), Exception> {
        validate_ports(self.http_port as i64, self.https_port as i64).map(|_| ())
    }
}

impl ServerConfig {
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn https_port(&self) -> u16 {
        self.https_port
    }

    pub fn key_file(&self) -> &str {
        &self.key_file
    }

    pub fn cert_file(&self) -> &str {
        &self.cert_file
    }

    pub fn file_root(&self) -> &str {
        &self.file_root
    }

    pub fn local(&self) -> bool {
        self.local
    }

    /// 监听地址：`local` 为真时仅绑定回环地址
    pub fn bind_ip(&self) -> IpAddr {
        if self.local {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }

    /// 工作线程数，配置为 0 时取 CPU 核心数
    pub fn worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn ping_enabled(&self) -> bool {
        self.ping_enabled
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_port_pairs() {
        assert_eq!(validate_ports(8080, 0).unwrap(), (8080, 0));
        assert_eq!(validate_ports(0, 8443).unwrap(), (0, 8443));
        assert_eq!(validate_ports(80, 443).unwrap(), (80, 443));
        assert_eq!(validate_ports(1, 65535).unwrap(), (1, 65535));
    }

    #[test]
    fn test_invalid_port_pairs() {
        assert_eq!(validate_ports(0, 0), Err(Exception::NoPortEnabled));
        assert_eq!(validate_ports(8080, 8080), Err(Exception::PortsEqual(8080)));
        assert_eq!(validate_ports(-1, 80), Err(Exception::PortOutOfRange(-1)));
        assert_eq!(
            validate_ports(80, 65536),
            Err(Exception::PortOutOfRange(65536))
        );
    }

    #[test]
    fn test_from_ports_uses_defaults() {
        let config = ServerConfig::from_ports(9000, 9443).unwrap();
        assert_eq!(config.http_port(), 9000);
        assert_eq!(config.https_port(), 9443);
        assert_eq!(config.key_file(), "key.pem");
        assert_eq!(config.cert_file(), "cert.pem");
        assert_eq!(config.max_body_size(), 10485760);
        assert!(config.ping_enabled());
        assert!(config.headers().is_empty());
    }

    #[test]
    fn test_from_toml_str() {
        let toml = r#"
            http_port = 7878
            https_port = 7879
            local = true
            worker_threads = 2
            ping_enabled = false

            [headers]
            X-Powered-By = "abhttp"
        "#;
        let config = ServerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.http_port(), 7878);
        assert_eq!(config.https_port(), 7879);
        assert_eq!(config.worker_threads(), 2);
        assert_eq!(config.bind_ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(!config.ping_enabled());
        assert_eq!(
            config.headers().get("X-Powered-By").map(String::as_str),
            Some("abhttp")
        );
    }

    #[test]
    fn test_from_toml_str_rejects_bad_ports() {
        let result = ServerConfig::from_toml_str("http_port = 0\nhttps_port = 0\n");
        assert_eq!(result, Err(Exception::NoPortEnabled));
        let result = ServerConfig::from_toml_str("http_port = 70000\n");
        assert_eq!(result, Err(Exception::PortOutOfRange(70000)));
    }

    #[test]
    fn test_from_toml_str_garbage() {
        let result = ServerConfig::from_toml_str("http_port = \"eighty\"");
        assert!(matches!(result, Err(Exception::ConfigUnreadable(_))));
    }

    #[test]
    fn test_from_toml_missing_file() {
        let result = ServerConfig::from_toml("does/not/exist.toml");
        assert!(matches!(result, Err(Exception::ConfigUnreadable(_))));
    }

    #[test]
    fn test_worker_threads_zero_means_cpus() {
        let config = ServerConfig::default();
        assert_eq!(config.worker_threads(), num_cpus::get());
        assert_eq!(config.bind_ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[test]
    fn test_zero_header_limit_is_ignored() {
        let config = ServerConfig::default().with_max_header_size(0);
        assert_eq!(config.max_header_size(), 65536);
    }
}
