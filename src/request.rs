// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 该模块负责把连接上读到的原始字节解析为强类型的请求，分两个阶段：
//! 1. `RequestHead`：请求行与标头，用于决定如何读取请求体。
//! 2. `Request`：请求体读取完毕后组装的规范化请求，交给处理器使用。
//!    包含解码后的路径、查询参数、Cookie、会话标识以及连接元数据。

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use lazy_static::lazy_static;
use log::error;
use regex::Regex;

use crate::{exception::Exception, param::*};

lazy_static! {
    /// 路径首尾的斜杠与空白
    static ref EDGE_SLASHES: Regex = Regex::new(r"^[/\s]+|[/\s]+$").unwrap();
    /// 路径中保持编码形式的保留字符：`# $ & + , / : ; = ? @`
    static ref RESERVED_ESCAPE: Regex = Regex::new(r"(?i)%(?:23|24|26|2b|2c|2f|3a|3b|3d|3f|40)").unwrap();
}

/// 在缓冲区中查找标头结束位置（`\r\n\r\n` 之后的下标）。
pub fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|index| index + 4)
}

/// 请求行与标头。
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP 请求方法
    method: HttpMethod,
    /// 请求目标（原样保留，含查询字符串）
    target: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 标头列表，名称已转为小写，保留出现顺序
    headers: Vec<(String, String)>,
}

impl RequestHead {
    /// 从原始字节缓冲区尝试构建 `RequestHead` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：确保请求头部是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、目标和协议版本。
    /// 3. 迭代解析标头：`名称: 值`，名称统一转为小写。
    ///
    /// # 参数
    /// * `buffer` - 从 Socket 读取的头部数据（可以包含结尾的空行）。
    /// * `id` - 连接 ID，用于在日志中追踪。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut request_lines = request_string.split(CRLF);
        let first_line = request_lines.next().unwrap_or_default();

        // 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let first_line_parts: Vec<&str> = first_line.split(' ').filter(|s| !s.is_empty()).collect();
        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
            return Err(Exception::MalformedRequest);
        }

        let method = HttpMethod::from_token(first_line_parts[0]);

        let version_str = first_line_parts[first_line_parts.len() - 1];
        let version = match HttpVersion::from_token(version_str) {
            Some(v) => v,
            None if version_str.to_ascii_uppercase().starts_with("HTTP/") => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
            None => {
                error!("[ID{}]HTTP请求行格式不正确：{}", id, first_line);
                return Err(Exception::MalformedRequest);
            }
        };

        // 路径中出现空格虽然不规范，但通过 join 尝试恢复
        let target = first_line_parts[1..first_line_parts.len() - 1].join(" ");

        let mut headers = Vec::new();
        for line in request_lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = match line.split_once(':') {
                Some(pair) => pair,
                None => {
                    error!("[ID{}]无法解析的标头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                error!("[ID{}]非法的标头名称：{}", id, name);
                return Err(Exception::MalformedRequest);
            }
            headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
        }

        Ok(Self {
            method,
            target,
            version,
            headers,
        })
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 按名称查找标头（大小写不敏感），返回第一个匹配值
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// 解析 `Content-Length`，非数字视为格式错误
    pub fn content_length(&self) -> Result<Option<usize>, Exception> {
        match self.header("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| Exception::MalformedRequest),
            None => Ok(None),
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false)
    }

    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .map(|v| v.eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false)
    }

    /// 连接是否保持。HTTP/1.1 默认保持，HTTP/1.0 默认关闭。
    pub fn keep_alive(&self) -> bool {
        let connection = self
            .header("connection")
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();
        let has = |token: &str| connection.split(',').any(|t| t.trim() == token);
        match self.version {
            HttpVersion::V1_1 => !has("close"),
            HttpVersion::V1_0 => has("keep-alive"),
        }
    }
}

/// 连接层面的元数据，由连接循环在握手后填写。
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub local_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub hostname: String,
    pub secure: bool,
    /// 协商得到的 TLS 协议版本，例如 `TLSv1_3`
    pub tls_version: Option<String>,
    /// 协商得到的密码套件
    pub tls_cipher: Option<String>,
}

/// 规范化后的请求，每个请求单独构建，响应结束后丢弃。
#[derive(Debug, Clone)]
pub struct Request {
    id: u128,
    method: HttpMethod,
    http_version: HttpVersion,
    url: String,
    path: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    body: Bytes,
    session: String,
    connection: ConnectionInfo,
}

impl Request {
    /// 由请求头、请求体和连接信息组装规范化请求。
    ///
    /// 会话标识取自 `ABSession` Cookie（名称大小写不敏感），缺失时为空，
    /// 由分发器负责签发。
    pub fn from_parts(id: u128, head: RequestHead, body: Bytes, connection: ConnectionInfo) -> Self {
        let (path, query) = split_target(&head.target);
        let path = normalize_path(path);
        let query = parse_query(query.unwrap_or_default());

        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in head.headers {
            match headers.get_mut(&name) {
                Some(existing) if name == "cookie" => {
                    existing.push_str("; ");
                    existing.push_str(&value);
                }
                Some(existing) => {
                    existing.push_str(", ");
                    existing.push_str(&value);
                }
                None => {
                    headers.insert(name, value);
                }
            }
        }

        let cookies = headers
            .get("cookie")
            .map(|c| parse_cookies(c))
            .unwrap_or_default();
        let session = cookies
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(SESSION_COOKIE))
            .map(|(_, value)| value.clone())
            .unwrap_or_default();

        Self {
            id,
            method: head.method,
            http_version: head.version,
            url: head.target,
            path,
            query,
            headers,
            cookies,
            body,
            session,
            connection,
        }
    }

    pub(crate) fn assign_session(&mut self, session: String) {
        self.session = session;
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 连接 ID，与日志中的 `[ID..]` 前缀一致
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn method(&self) -> &HttpMethod {
        &self.method
    }

    /// HTTP 协议版本
    pub fn http_version(&self) -> HttpVersion {
        self.http_version
    }

    /// 框架版本号
    pub fn version(&self) -> &'static str {
        VERSION
    }

    /// 原始请求目标（含查询字符串）
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 解码后的路径，首尾不含斜杠
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// 标头映射，名称为小写，重复标头以 `, ` 连接
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// 原始请求体
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 请求体的文本形式，非法 UTF-8 序列替换为 U+FFFD
    pub fn data(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// 会话标识
    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn server_address(&self) -> String {
        self.connection.local_addr.ip().to_string()
    }

    pub fn server_port(&self) -> u16 {
        self.connection.local_addr.port()
    }

    pub fn server_hostname(&self) -> &str {
        &self.connection.hostname
    }

    pub fn client_address(&self) -> String {
        self.connection.peer_addr.ip().to_string()
    }

    pub fn client_port(&self) -> u16 {
        self.connection.peer_addr.port()
    }

    /// 协议族：`IPv4` 或 `IPv6`
    pub fn family(&self) -> &'static str {
        if self.connection.peer_addr.is_ipv4() {
            "IPv4"
        } else {
            "IPv6"
        }
    }

    pub fn is_secure(&self) -> bool {
        self.connection.secure
    }

    pub fn tls_version(&self) -> Option<&str> {
        self.connection.tls_version.as_deref()
    }

    pub fn tls_cipher(&self) -> Option<&str> {
        self.connection.tls_cipher.as_deref()
    }
}

/// 把请求目标拆分为路径与查询字符串。绝对形式（`http://host/path`）会先去掉协议和主机部分。
pub fn split_target(target: &str) -> (&str, Option<&str>) {
    let mut rest = target;
    let lower = target.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        if let Some(scheme_end) = target.find("://") {
            let after = &target[scheme_end + 3..];
            rest = match after.find(|c| c == '/' || c == '?') {
                Some(index) => &after[index..],
                None => "",
            };
        }
    }
    match rest.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    }
}

/// 百分号解码，保留字符的转义序列（如 `%2F`、`%3F`）原样保留。
/// 任何一段解码结果不是合法 UTF-8 时返回 `None`。
fn decode_path(path: &str) -> Option<String> {
    let mut decoded = String::with_capacity(path.len());
    let mut last = 0;
    for escape in RESERVED_ESCAPE.find_iter(path) {
        decoded.push_str(&urlencoding::decode(&path[last..escape.start()]).ok()?);
        decoded.push_str(escape.as_str());
        last = escape.end();
    }
    decoded.push_str(&urlencoding::decode(&path[last..]).ok()?);
    Some(decoded)
}

/// 百分号解码后去掉首尾的斜杠与空白。解码结果不是合法 UTF-8 时使用原始路径。
pub fn normalize_path(path: &str) -> String {
    let decoded = decode_path(path).unwrap_or_else(|| path.to_string());
    EDGE_SLASHES.replace_all(&decoded, "").into_owned()
}

/// 解析查询字符串。
///
/// 以 `&` 分隔，忽略空片段；在第一个 `=` 处拆分；没有 `=` 的片段整体作为键，
/// 值为空字符串；重复的键以最后一次为准。键和值都不做百分号解码。
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for token in query.split('&').filter(|t| !t.is_empty()) {
        match token.split_once('=') {
            Some((key, value)) => map.insert(key.to_string(), value.to_string()),
            None => map.insert(token.to_string(), String::new()),
        };
    }
    map
}

/// 解析 `Cookie` 标头。没有 `=` 的片段被忽略，重复的名称以最后一次为准。
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for token in header.split(';') {
        if let Some((name, value)) = token.trim().split_once('=') {
            let name = name.trim();
            if !name.is_empty() {
                map.insert(name.to_string(), value.trim().to_string());
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionInfo {
        ConnectionInfo {
            local_addr: "127.0.0.1:8080".parse().unwrap(),
            peer_addr: "127.0.0.1:50000".parse().unwrap(),
            hostname: "testhost".to_string(),
            secure: false,
            tls_version: None,
            tls_cipher: None,
        }
    }

    fn build(raw: &str, body: &str) -> Request {
        let head = RequestHead::try_from(raw.as_bytes(), 0).unwrap();
        Request::from_parts(0, head, Bytes::from(body.to_string()), connection())
    }

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str = "GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\n\r\n";
        let head = RequestHead::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(head.method(), &HttpMethod::Get);
        assert_eq!(head.target(), "/");
        assert_eq!(head.version(), HttpVersion::V1_1);
        assert_eq!(head.header("user-agent"), Some("Test-Browser"));
        assert_eq!(head.header("HOST"), Some("localhost:7878"));
    }

    /// 注册表之外的方法不会被拒绝，交由分发器处理
    #[test]
    fn test_unknown_method_is_kept() {
        let head = RequestHead::try_from(b"BREW /pot HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(head.method(), &HttpMethod::Unknown("brew".to_string()));
    }

    #[test]
    fn test_http_1_0_accepted() {
        let head = RequestHead::try_from(b"GET / HTTP/1.0\r\n\r\n", 0).unwrap();
        assert_eq!(head.version(), HttpVersion::V1_0);
        assert!(!head.keep_alive());
    }

    /// 确保不支持的版本（如 HTTP/2.0）被正确拒绝
    #[test]
    fn test_unsupported_http_version() {
        let result = RequestHead::try_from(b"GET / HTTP/2.0\r\nHost: localhost\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::UnsupportedHttpVersion)));
    }

    #[test]
    fn test_malformed_request_line() {
        let result = RequestHead::try_from(b"GET /\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
        let result = RequestHead::try_from(b"GET / FOO\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    #[test]
    fn test_malformed_header() {
        let result = RequestHead::try_from(b"GET / HTTP/1.1\r\nNoColonHere\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    /// 验证 UTF-8 编码检查
    #[test]
    fn test_invalid_utf8() {
        let buffer = vec![0xFF, 0xFE, 0xFD];
        let result = RequestHead::try_from(&buffer, 0);
        assert!(matches!(result, Err(Exception::RequestIsNotUtf8)));
    }

    #[test]
    fn test_content_length_and_flags() {
        let raw = "POST /submit HTTP/1.1\r\nContent-Length: 10\r\nExpect: 100-continue\r\nConnection: close\r\n\r\n";
        let head = RequestHead::try_from(raw.as_bytes(), 0).unwrap();
        assert_eq!(head.content_length().unwrap(), Some(10));
        assert!(head.expects_continue());
        assert!(!head.keep_alive());
        assert!(!head.is_chunked());

        let bad = RequestHead::try_from(b"POST / HTTP/1.1\r\nContent-Length: ten\r\n\r\n", 0).unwrap();
        assert!(matches!(bad.content_length(), Err(Exception::MalformedRequest)));
    }

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(18));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n"), None);
    }

    #[test]
    fn test_normalize_path_strips_slashes() {
        assert_eq!(normalize_path("//a/b//"), "a/b");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path("/api/ping/"), "api/ping");
        assert_eq!(normalize_path("/a%20b/"), "a b");
    }

    #[test]
    fn test_normalize_path_keeps_reserved_escapes() {
        assert_eq!(normalize_path("/a%2Fb"), "a%2Fb");
        assert_eq!(normalize_path("/q%3fx%3D1/"), "q%3fx%3D1");
        assert_eq!(normalize_path("/%2e%2e/a%20b%40c"), "../a b%40c");
        assert_eq!(normalize_path("/%2F/"), "%2F");
    }

    #[test]
    fn test_normalize_path_bad_encoding_keeps_raw() {
        assert_eq!(normalize_path("/bad%FFpath/"), "bad%FFpath");
    }

    #[test]
    fn test_split_target() {
        assert_eq!(split_target("/a?b=1"), ("/a", Some("b=1")));
        assert_eq!(split_target("/a"), ("/a", None));
        assert_eq!(split_target("http://example.com/x/y?z"), ("/x/y", Some("z")));
        assert_eq!(split_target("http://example.com"), ("", None));
    }

    #[test]
    fn test_parse_query_edge_cases() {
        let query = parse_query("k1=v1&k2=v2");
        assert_eq!(query.len(), 2);
        assert_eq!(query["k1"], "v1");
        assert_eq!(query["k2"], "v2");

        let query = parse_query("flag&a=1&&a=2&eq=x=y");
        assert_eq!(query["flag"], "");
        assert_eq!(query["a"], "2");
        assert_eq!(query["eq"], "x=y");
        assert_eq!(query.len(), 3);

        let query = parse_query("name=a%20b");
        assert_eq!(query["name"], "a%20b");
    }

    #[test]
    fn test_parse_cookies() {
        let cookies = parse_cookies("a=1; b = 2;junk; a=3");
        assert_eq!(cookies["a"], "3");
        assert_eq!(cookies["b"], "2");
        assert!(!cookies.contains_key("junk"));
    }

    #[test]
    fn test_request_from_parts() {
        let raw = "POST /form/?x=1&y HTTP/1.1\r\nHost: localhost\r\nCookie: absession=token123\r\nX-Multi: a\r\nX-Multi: b\r\n\r\n";
        let request = build(raw, "hello");
        assert_eq!(request.method(), &HttpMethod::Post);
        assert_eq!(request.path(), "form");
        assert_eq!(request.url(), "/form/?x=1&y");
        assert_eq!(request.query_param("x"), Some("1"));
        assert_eq!(request.query_param("y"), Some(""));
        assert_eq!(request.header("x-multi"), Some("a, b"));
        assert_eq!(request.session(), "token123");
        assert_eq!(request.data(), "hello");
        assert_eq!(request.server_port(), 8080);
        assert_eq!(request.client_port(), 50000);
        assert_eq!(request.family(), "IPv4");
        assert_eq!(request.server_hostname(), "testhost");
        assert!(!request.is_secure());
        assert_eq!(request.version(), VERSION);
    }

    #[test]
    fn test_request_without_session_cookie() {
        let request = build("GET / HTTP/1.1\r\nCookie: other=1\r\n\r\n", "");
        assert_eq!(request.session(), "");
        assert_eq!(request.cookie("other"), Some("1"));
    }

    #[test]
    fn test_lossy_body_text() {
        let head = RequestHead::try_from(b"POST / HTTP/1.1\r\n\r\n", 0).unwrap();
        let request = Request::from_parts(0, head, Bytes::from_static(&[0x68, 0xFF, 0x69]), connection());
        assert_eq!(request.data(), "h\u{FFFD}i");
        assert_eq!(request.body().len(), 3);
    }
}
