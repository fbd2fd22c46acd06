// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了框架遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 文件后缀名到 MIME 类型的映射表。
//! - 依据 IANA HTTP Method Registry 枚举的请求方法，以及协议版本。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// 组件名称，用于 `Server` 响应头与错误信封中的 `component` 字段
pub const SERVER_NAME: &str = "ABHttpServer";

/// 框架版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 会话 Cookie 的名称（下发时的大小写）
pub const SESSION_COOKIE: &str = "ABSession";

/// 会话令牌的随机字节数，Base64 编码后为 44 个字符
pub const SESSION_TOKEN_BYTES: usize = 32;

/// 自动应答的存活探测路径（规范化后，不含首尾斜杠）
pub const PING_PATH: &str = "api/ping";

/// 调试日志开关的环境变量名
pub const DEBUG_ENV: &str = "AB_DEBUG";

/// 无法从扩展名推断类型时使用的 MIME 类型
pub const DEFAULT_MIME: &str = "text/plain";

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx: 信息响应 (Informational)
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(203, "Non-Authoritative Information");
        map.insert(204, "No Content");
        map.insert(205, "Reset Content");
        map.insert(206, "Partial Content");

        // 3xx: 重定向 (Redirection)
        map.insert(300, "Multiple Choices");
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(305, "Use Proxy");
        // 306 已弃用 (Reserved)
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(402, "Payment Required");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(406, "Not Acceptable");
        map.insert(407, "Proxy Authentication Required");
        map.insert(408, "Request Timeout");
        map.insert(409, "Conflict");
        map.insert(410, "Gone");
        map.insert(411, "Length Required");
        map.insert(412, "Precondition Failed");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(415, "Unsupported Media Type");
        map.insert(416, "Range Not Satisfiable");
        map.insert(417, "Expectation Failed");
        map.insert(418, "I'm a teapot");
        map.insert(421, "Misdirected Request");
        map.insert(422, "Unprocessable Content");
        map.insert(426, "Upgrade Required");
        map.insert(429, "Too Many Requests");
        map.insert(431, "Request Header Fields Too Large");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件后缀名（小写，不含点）到 MIME 类型的映射表。
    ///
    /// `send_file` 在调用者未显式指定类型时据此设置 `Content-Type`，
    /// 查不到的后缀回退为 [`DEFAULT_MIME`]。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("aac", "audio/aac");
        map.insert("abw", "application/x-abiword");
        map.insert("arc", "application/octet-stream");
        map.insert("avi", "video/x-msvideo");
        map.insert("azw", "application/vnd.amazon.ebook");
        map.insert("bin", "application/octet-stream");
        map.insert("bmp", "image/bmp");
        map.insert("bz", "application/x-bzip");
        map.insert("bz2", "application/x-bzip2");
        map.insert("csh", "application/x-csh");
        map.insert("css", "text/css");
        map.insert("csv", "text/csv");
        map.insert("doc", "application/msword");
        map.insert(
            "docx",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        );
        map.insert("eot", "application/vnd.ms-fontobject");
        map.insert("epub", "application/epub+zip");
        map.insert("es", "application/ecmascript");
        map.insert("gif", "image/gif");
        map.insert("htm", "text/html");
        map.insert("html", "text/html");
        map.insert("ico", "image/x-icon");
        map.insert("ics", "text/calendar");
        map.insert("jar", "application/java-archive");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "application/javascript");
        map.insert("json", "application/json");
        map.insert("mid", "audio/midi audio/x-midi");
        map.insert("midi", "audio/midi audio/x-midi");
        map.insert("mpeg", "video/mpeg");
        map.insert("mpkg", "application/vnd.apple.installer+xml");
        map.insert("odp", "application/vnd.oasis.opendocument.presentation");
        map.insert("ods", "application/vnd.oasis.opendocument.spreadsheet");
        map.insert("odt", "application/vnd.oasis.opendocument.text");
        map.insert("oga", "audio/ogg");
        map.insert("ogv", "video/ogg");
        map.insert("ogx", "application/ogg");
        map.insert("otf", "font/otf");
        map.insert("png", "image/png");
        map.insert("pdf", "application/pdf");
        map.insert("ppt", "application/vnd.ms-powerpoint");
        map.insert(
            "pptx",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        );
        map.insert("rar", "application/x-rar-compressed");
        map.insert("rtf", "application/rtf");
        map.insert("sh", "application/x-sh");
        map.insert("svg", "image/svg+xml");
        map.insert("swf", "application/x-shockwave-flash");
        map.insert("tar", "application/x-tar");
        map.insert("tif", "image/tiff");
        map.insert("tiff", "image/tiff");
        map.insert("ts", "application/typescript");
        map.insert("ttf", "font/ttf");
        map.insert("txt", "text/plain");
        map.insert("vsd", "application/vnd.visio");
        map.insert("wav", "audio/wav");
        map.insert("weba", "audio/webm");
        map.insert("webm", "video/webm");
        map.insert("webp", "image/webp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("xhtml", "application/xhtml+xml");
        map.insert("xls", "application/vnd.ms-excel");
        map.insert(
            "xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        );
        map.insert("xml", "application/xml");
        map.insert("xul", "application/vnd.mozilla.xul+xml");
        map.insert("zip", "application/zip");
        map.insert("3gp", "video/3gpp");
        map.insert("3g2", "video/3gpp2");
        map.insert("7z", "application/x-7z-compressed");
        map
    };
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

impl HttpVersion {
    /// 从请求行中的版本字段解析，例如 `HTTP/1.1`。
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "HTTP/1.0" => Some(HttpVersion::V1_0),
            "HTTP/1.1" => Some(HttpVersion::V1_1),
            _ => None,
        }
    }

    /// 状态行中使用的完整协议标识
    pub fn as_status_token(&self) -> &'static str {
        match self {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        }
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为不带前缀的版本字符串，例如 `1.1`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "1.0"),
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

/// IANA HTTP Method Registry 中登记的请求方法。
///
/// 参考：<http://www.iana.org/assignments/http-methods/http-methods.xhtml>。
/// 注册表之外的方法被保存在 [`HttpMethod::Unknown`] 中（小写）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Acl,
    BaselineControl,
    Bind,
    Checkin,
    Checkout,
    Connect,
    Copy,
    Delete,
    Get,
    Head,
    Label,
    Link,
    Lock,
    Merge,
    MkActivity,
    MkCalendar,
    MkCol,
    MkRedirectRef,
    MkWorkspace,
    Move,
    Options,
    OrderPatch,
    Patch,
    Post,
    Pri,
    PropFind,
    PropPatch,
    Put,
    Rebind,
    Report,
    Search,
    Trace,
    Unbind,
    Uncheckout,
    Unlink,
    Unlock,
    Update,
    UpdateRedirectRef,
    VersionControl,
    /// 注册表之外的方法名（已转为小写）
    Unknown(String),
}

impl HttpMethod {
    /// 从请求行中的方法字段解析，大小写不敏感。
    pub fn from_token(token: &str) -> Self {
        let lower = token.to_ascii_lowercase();
        match lower.as_str() {
            "acl" => HttpMethod::Acl,
            "baseline-control" => HttpMethod::BaselineControl,
            "bind" => HttpMethod::Bind,
            "checkin" => HttpMethod::Checkin,
            "checkout" => HttpMethod::Checkout,
            "connect" => HttpMethod::Connect,
            "copy" => HttpMethod::Copy,
            "delete" => HttpMethod::Delete,
            "get" => HttpMethod::Get,
            "head" => HttpMethod::Head,
            "label" => HttpMethod::Label,
            "link" => HttpMethod::Link,
            "lock" => HttpMethod::Lock,
            "merge" => HttpMethod::Merge,
            "mkactivity" => HttpMethod::MkActivity,
            "mkcalendar" => HttpMethod::MkCalendar,
            "mkcol" => HttpMethod::MkCol,
            "mkredirectref" => HttpMethod::MkRedirectRef,
            "mkworkspace" => HttpMethod::MkWorkspace,
            "move" => HttpMethod::Move,
            "options" => HttpMethod::Options,
            "orderpatch" => HttpMethod::OrderPatch,
            "patch" => HttpMethod::Patch,
            "post" => HttpMethod::Post,
            "pri" => HttpMethod::Pri,
            "propfind" => HttpMethod::PropFind,
            "proppatch" => HttpMethod::PropPatch,
            "put" => HttpMethod::Put,
            "rebind" => HttpMethod::Rebind,
            "report" => HttpMethod::Report,
            "search" => HttpMethod::Search,
            "trace" => HttpMethod::Trace,
            "unbind" => HttpMethod::Unbind,
            "uncheckout" => HttpMethod::Uncheckout,
            "unlink" => HttpMethod::Unlink,
            "unlock" => HttpMethod::Unlock,
            "update" => HttpMethod::Update,
            "updateredirectref" => HttpMethod::UpdateRedirectRef,
            "version-control" => HttpMethod::VersionControl,
            _ => HttpMethod::Unknown(lower),
        }
    }

    /// 小写的方法名，与注册表中的写法一致
    pub fn as_str(&self) -> &str {
        match self {
            HttpMethod::Acl => "acl",
            HttpMethod::BaselineControl => "baseline-control",
            HttpMethod::Bind => "bind",
            HttpMethod::Checkin => "checkin",
            HttpMethod::Checkout => "checkout",
            HttpMethod::Connect => "connect",
            HttpMethod::Copy => "copy",
            HttpMethod::Delete => "delete",
            HttpMethod::Get => "get",
            HttpMethod::Head => "head",
            HttpMethod::Label => "label",
            HttpMethod::Link => "link",
            HttpMethod::Lock => "lock",
            HttpMethod::Merge => "merge",
            HttpMethod::MkActivity => "mkactivity",
            HttpMethod::MkCalendar => "mkcalendar",
            HttpMethod::MkCol => "mkcol",
            HttpMethod::MkRedirectRef => "mkredirectref",
            HttpMethod::MkWorkspace => "mkworkspace",
            HttpMethod::Move => "move",
            HttpMethod::Options => "options",
            HttpMethod::OrderPatch => "orderpatch",
            HttpMethod::Patch => "patch",
            HttpMethod::Post => "post",
            HttpMethod::Pri => "pri",
            HttpMethod::PropFind => "propfind",
            HttpMethod::PropPatch => "proppatch",
            HttpMethod::Put => "put",
            HttpMethod::Rebind => "rebind",
            HttpMethod::Report => "report",
            HttpMethod::Search => "search",
            HttpMethod::Trace => "trace",
            HttpMethod::Unbind => "unbind",
            HttpMethod::Uncheckout => "uncheckout",
            HttpMethod::Unlink => "unlink",
            HttpMethod::Unlock => "unlock",
            HttpMethod::Update => "update",
            HttpMethod::UpdateRedirectRef => "updateredirectref",
            HttpMethod::VersionControl => "version-control",
            HttpMethod::Unknown(name) => name,
        }
    }

    /// 是否为注册表中登记的方法
    pub fn is_registered(&self) -> bool {
        !matches!(self, HttpMethod::Unknown(_))
    }
}

impl fmt::Display for HttpMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}
