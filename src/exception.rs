// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在启动与请求处理生命周期中可能出现的全部异常情况。
//!
//! ## 分类
//! - **配置错误**：端口组合非法、配置文件无法读取。启动阶段致命。
//! - **启动错误**：端口绑定失败、TLS 证书/私钥加载失败。启动阶段致命。
//! - **协议错误**：请求报文无法解析、版本不支持、报文过大。转化为对应的 4xx/5xx 响应。
//! - **文件错误**：`send_file` / `read_file` 的路径校验与读取失败。
//!
//! `Display` 输出即为返回给客户端的错误描述，因此措辞面向调用者。

use std::fmt;

use crate::param::SERVER_NAME;

/// 服务器运行过程中发生的异常类型。
#[derive(Debug, Clone, PartialEq)]
pub enum Exception {
    /// 端口号不在 `[0, 65535]` 区间内。
    PortOutOfRange(i64),
    /// HTTP 与 HTTPS 端口相同。
    PortsEqual(u16),
    /// 两个端口都为 0，没有任何监听器可以启动。
    NoPortEnabled,
    /// 配置文件无法读取或无法反序列化。
    ConfigUnreadable(String),
    /// 监听端口绑定失败。
    BindFailed { port: u16, reason: String },
    /// TLS 证书或私钥缺失、格式错误。
    TlsMaterial(String),
    /// 请求行或标头格式不符合 HTTP/1.x 规范。
    MalformedRequest,
    /// 请求头部无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 客户端使用了 HTTP/1.0 与 HTTP/1.1 以外的协议版本。
    UnsupportedHttpVersion,
    /// 请求头部超过配置的上限。
    HeaderTooLarge,
    /// 请求体超过配置的上限（字节数）。
    BodyTooLarge(usize),
    /// 对端在报文完整到达之前关闭了连接。
    ConnectionClosed,
    /// 底层 Socket 读写失败。
    Io(String),
    /// 文件名中包含 NUL 字节。
    InvalidFileName(String),
    /// 未指定文件名。
    EmptyFileName,
    /// 规范化后的路径不在允许的根目录之下。
    OutsideFileRoot(String),
    /// 文件不存在。
    FileNotFound(String),
    /// 目标路径是一个目录。
    IsDirectory(String),
    /// 文件存在但读取失败。
    FileReadFailed(String),
}

use Exception::*;

impl Exception {
    /// 该异常对应的 HTTP 状态码。
    ///
    /// 启动阶段的错误不会出现在响应中，统一映射为 500。
    pub fn status_code(&self) -> u16 {
        match self {
            MalformedRequest | RequestIsNotUtf8 => 400,
            UnsupportedHttpVersion => 505,
            HeaderTooLarge => 431,
            BodyTooLarge(_) => 413,
            InvalidFileName(_) | EmptyFileName | OutsideFileRoot(_) | IsDirectory(_) => 400,
            FileNotFound(_) => 404,
            _ => 500,
        }
    }

    /// 是否属于配置错误（端口组合、配置文件）。
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PortOutOfRange(_) | PortsEqual(_) | NoPortEnabled | ConfigUnreadable(_)
        )
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortOutOfRange(port) => write!(
                f,
                "{}: Both port arguments must be between 0 and 65535 (got {})",
                SERVER_NAME, port
            ),
            PortsEqual(port) => write!(f, "{}: Both ports must not be equal ({})", SERVER_NAME, port),
            NoPortEnabled => write!(f, "{}: At least one port must be non-zero", SERVER_NAME),
            ConfigUnreadable(reason) => write!(f, "{}: Unable to load configuration: {}", SERVER_NAME, reason),
            BindFailed { port, reason } => write!(f, "{}: Unable to bind port {}: {}", SERVER_NAME, port, reason),
            TlsMaterial(reason) => write!(f, "{}: Unable to load TLS material: {}", SERVER_NAME, reason),
            MalformedRequest => write!(f, "Malformed HTTP request"),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            HeaderTooLarge => write!(f, "Request header fields too large"),
            BodyTooLarge(limit) => write!(f, "Request body exceeds the limit of {} bytes", limit),
            ConnectionClosed => write!(f, "Connection closed by peer"),
            Io(reason) => write!(f, "Socket error: {}", reason),
            InvalidFileName(name) => write!(f, "The filename {} contains invalid characters", name.escape_debug()),
            EmptyFileName => write!(f, "No filename specified"),
            OutsideFileRoot(path) => write!(f, "The file {} is outside of the base file path", path),
            FileNotFound(path) => write!(f, "The file {} does not exist", path),
            IsDirectory(path) => write!(f, "The file {} specifies a directory", path),
            FileReadFailed(path) => write!(f, "The file {} could not be read", path),
        }
    }
}

impl std::error::Error for Exception {}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => ConnectionClosed,
            _ => Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_errors_map_to_distinct_statuses() {
        assert_eq!(InvalidFileName("a\0b".to_string()).status_code(), 400);
        assert_eq!(EmptyFileName.status_code(), 400);
        assert_eq!(OutsideFileRoot("/etc/passwd".to_string()).status_code(), 400);
        assert_eq!(FileNotFound("x".to_string()).status_code(), 404);
        assert_eq!(IsDirectory("x".to_string()).status_code(), 400);
        assert_eq!(FileReadFailed("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_protocol_errors_status() {
        assert_eq!(MalformedRequest.status_code(), 400);
        assert_eq!(UnsupportedHttpVersion.status_code(), 505);
        assert_eq!(HeaderTooLarge.status_code(), 431);
        assert_eq!(BodyTooLarge(10).status_code(), 413);
    }

    #[test]
    fn test_config_error_classification() {
        assert!(PortOutOfRange(70000).is_config_error());
        assert!(PortsEqual(8080).is_config_error());
        assert!(NoPortEnabled.is_config_error());
        assert!(!TlsMaterial("missing".to_string()).is_config_error());
        assert!(!FileNotFound("x".to_string()).is_config_error());
    }

    #[test]
    fn test_display_names_component() {
        let message = NoPortEnabled.to_string();
        assert!(message.starts_with("ABHttpServer"));
        assert!(message.contains("non-zero"));
    }

    #[test]
    fn test_null_byte_is_escaped_in_message() {
        let message = InvalidFileName("index.html\0.jpg".to_string()).to_string();
        assert!(message.contains("\\0"));
        assert!(!message.contains('\0'));
    }

    #[test]
    fn test_from_io_error() {
        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(Exception::from(eof), ConnectionClosed);
        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(Exception::from(other), Io(_)));
    }
}
