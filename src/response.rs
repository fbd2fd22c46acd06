// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应模块
//!
//! - `Response`：一条待写出的 HTTP 响应，负责序列化状态行、标头与内容。
//! - `Responder`：交给处理器的响应接收端，提供文本、HTML、JSON、错误、
//!   重定向与文件等发送方法。每个请求最多发送一次响应，服务器终止后发送无效。

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use chrono::prelude::*;
use log::{debug, error, warn};
use serde::Serialize;
use serde_derive::Serialize as SerializeDerive;

use crate::param::*;
use crate::state::ServerState;
use crate::util::read_file;

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    date: DateTime<Utc>,
    content: Bytes,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            date: Utc::now(),
            content: Bytes::new(),
        }
    }

    fn set_version(&mut self, version: HttpVersion) -> &mut Self {
        self.version = version;
        self
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                warn!("未登记的状态码：{}", code);
                "Unknown".to_string()
            }
        };
        self
    }

    fn set_content(&mut self, content: Bytes) -> &mut Self {
        self.content = content;
        self
    }

    /// 设置标头，名称大小写不敏感地覆盖已有值；`Set-Cookie` 允许出现多次
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        merge_header(&mut self.headers, name, value);
        self
    }

    /// 序列化为线上字节。`include_body` 为假时（HEAD 请求）保留 `Content-Length` 但不写出内容。
    pub fn as_bytes(&self, include_body: bool) -> Vec<u8> {
        let mut header = [
            self.version.as_status_token(),
            " ",
            &self.status_code.to_string(),
            " ",
            &self.information,
            CRLF,
        ]
        .concat();
        for (name, value) in &self.headers {
            header.push_str(name);
            header.push_str(": ");
            header.push_str(value);
            header.push_str(CRLF);
        }
        header.push_str("Date: ");
        header.push_str(&format_date(&self.date));
        header.push_str(CRLF);
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        if include_body {
            bytes.extend_from_slice(&self.content);
        }
        bytes
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }
}

fn merge_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !name.eq_ignore_ascii_case("set-cookie") {
        if let Some(entry) = headers.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            entry.1 = value.to_string();
            return;
        }
    }
    headers.push((name.to_string(), value.to_string()));
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

/// `Server` 标头的值
pub fn server_header() -> String {
    format!("{}/{} (Rust; {})", SERVER_NAME, VERSION, std::env::consts::OS)
}

/// 根据扩展名推断 MIME 类型，查不到时返回 `text/plain`
pub fn get_mime(extension: Option<&OsStr>) -> &'static str {
    let extension = match extension.and_then(|e| e.to_str()) {
        Some(e) => e.to_ascii_lowercase(),
        None => return DEFAULT_MIME,
    };
    match MIME_TYPES.get(extension.as_str()) {
        Some(v) => v,
        None => DEFAULT_MIME,
    }
}

/// 错误信封：`{time, httpStatus, component, error}`
#[derive(SerializeDerive, Debug)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope<'a> {
    time: String,
    http_status: u16,
    component: &'a str,
    error: &'a str,
}

/// 处理器使用的响应接收端。
pub struct Responder {
    id: u128,
    state: Arc<ServerState>,
    version: HttpVersion,
    headers: Vec<(String, String)>,
    response: Option<Response>,
    sent: bool,
    head_only: bool,
}

impl Responder {
    pub(crate) fn new(id: u128, state: Arc<ServerState>, version: HttpVersion) -> Self {
        Self {
            id,
            state,
            version,
            headers: Vec::new(),
            response: None,
            sent: false,
            head_only: false,
        }
    }

    /// HEAD 请求：响应体不会写出，也不计入响应字节数
    pub(crate) fn omit_body(&mut self) {
        self.head_only = true;
    }

    /// 为本次响应附加一个标头，覆盖同名的默认标头
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        merge_header(&mut self.headers, name, value);
        self
    }

    /// 是否已经发送过响应
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// 所属服务器的共享状态（统计信息、默认标头等）
    pub fn server(&self) -> &ServerState {
        &self.state
    }

    pub fn send_text(&mut self, text: &str) {
        self.send_text_with_status(text, 200);
    }

    pub fn send_text_with_status(&mut self, text: &str, status: u16) {
        self.send(status, "text/plain; charset=utf-8", Bytes::from(text.to_string()));
    }

    pub fn send_html(&mut self, html: &str) {
        self.send_html_with_status(html, 200);
    }

    pub fn send_html_with_status(&mut self, html: &str, status: u16) {
        self.send(status, "text/html; charset=utf-8", Bytes::from(html.to_string()));
    }

    pub fn send_json<T: Serialize + ?Sized>(&mut self, data: &T) {
        self.send_json_with_status(data, 200);
    }

    pub fn send_json_with_status<T: Serialize + ?Sized>(&mut self, data: &T, status: u16) {
        match serde_json::to_vec(data) {
            Ok(body) => self.send(status, "application/json", Bytes::from(body)),
            Err(e) => {
                error!("[ID{}]JSON序列化失败：{}", self.id, e);
                self.send_error("Unable to serialize response", 500);
            }
        }
    }

    /// 以 JSON 错误信封发送错误
    pub fn send_error(&mut self, message: &str, status: u16) {
        let envelope = ErrorEnvelope {
            time: Utc::now().to_rfc3339(),
            http_status: status,
            component: SERVER_NAME,
            error: message,
        };
        match serde_json::to_vec(&envelope) {
            Ok(body) => self.send(status, "application/json", Bytes::from(body)),
            Err(e) => {
                error!("[ID{}]错误信封序列化失败：{}", self.id, e);
                self.send(status, "text/plain; charset=utf-8", Bytes::from(message.to_string()));
            }
        }
    }

    /// 301 永久重定向到 `location`
    pub fn redirect_url(&mut self, location: &str) {
        self.set_header("Location", location);
        self.send(301, "text/plain; charset=utf-8", Bytes::new());
    }

    /// 发送 `root`（缺省为配置的 `file_root`）之下的文件。
    ///
    /// 路径非法返回 400，文件不存在返回 404，目录返回 400，读取失败返回 500。
    /// 未指定 `mime` 时根据扩展名推断。
    pub async fn send_file(&mut self, file: &str, root: Option<&Path>, mime: Option<&str>) {
        let root = match root {
            Some(r) => r.to_path_buf(),
            None => self.state.file_root().to_path_buf(),
        };
        match read_file(file, &root).await {
            Ok((path, content)) => {
                let mime = match mime {
                    Some(m) => m.to_string(),
                    None => get_mime(path.extension()).to_string(),
                };
                self.send(200, &mime, content);
            }
            Err(e) => {
                warn!("[ID{}]无法发送文件{}：{}", self.id, file.escape_debug(), e);
                self.send_error(&e.to_string(), e.status_code());
            }
        }
    }

    /// 统一的写出入口。
    ///
    /// 合并顺序：默认标头，再到本次调用设置的标头，最后由
    /// `Content-Type`、`Content-Length`、`Server` 覆盖两者。
    pub fn send(&mut self, status: u16, content_type: &str, body: Bytes) {
        if !self.state.is_active() {
            debug!("[ID{}]服务器已终止，忽略响应", self.id);
            return;
        }
        if self.sent {
            warn!("[ID{}]重复发送响应，已忽略（状态码{}）", self.id, status);
            return;
        }

        let mut response = Response::new();
        response.set_version(self.version).set_code(status);
        for (name, value) in self.state.headers() {
            response.set_header(&name, &value);
        }
        for (name, value) in &self.headers {
            response.set_header(name, value);
        }
        response
            .set_header("Content-Type", content_type)
            .set_header("Content-Length", &body.len().to_string())
            .set_header("Server", &server_header());

        if self.state.debug() {
            debug!(
                "[ID{}]响应：{} {}，类型{}，长度{}",
                self.id,
                status,
                response.information(),
                content_type,
                body.len()
            );
        }

        let written = if self.head_only { 0 } else { body.len() as u64 };
        self.state.record_response(written);
        response.set_content(body);
        self.response = Some(response);
        self.sent = true;
    }

    /// 取出待写出的响应，连接循环调用
    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}
