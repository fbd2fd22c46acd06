// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 单个连接上的读取、解析、分发与写出循环，同时服务明文 TCP 与 TLS 流。

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatch::{Dispatcher, Handler};
use crate::exception::Exception;
use crate::param::{HttpMethod, HttpVersion, CRLF};
use crate::request::{find_head_end, ConnectionInfo, RequestHead};
use crate::response::Responder;

/// 错误响应写出后最多丢弃的字节数与等待时间
const LINGER_LIMIT: usize = 1 << 20;
const LINGER_TIMEOUT: Duration = Duration::from_millis(200);

/// 从流中再读一些数据到缓冲区，对端关闭视为 `ConnectionClosed`
async fn fill<S>(stream: &mut S, buffer: &mut BytesMut) -> Result<(), Exception>
where
    S: AsyncRead + Unpin,
{
    let n = stream.read_buf(buffer).await?;
    if n == 0 {
        return Err(Exception::ConnectionClosed);
    }
    Ok(())
}

/// 读取请求头，返回头部结束的位置。连接在读到任何数据前被关闭时返回 `Ok(None)`。
async fn read_head<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    max_header_size: usize,
) -> Result<Option<usize>, Exception>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_head_end(buffer) {
            if end > max_header_size {
                return Err(Exception::HeaderTooLarge);
            }
            return Ok(Some(end));
        }
        if buffer.len() > max_header_size {
            return Err(Exception::HeaderTooLarge);
        }
        match fill(stream, buffer).await {
            Ok(()) => {}
            Err(Exception::ConnectionClosed) if buffer.is_empty() => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

/// 读取按 `Content-Length` 定长的请求体
async fn read_sized_body<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    length: usize,
    limit: usize,
) -> Result<Bytes, Exception>
where
    S: AsyncRead + Unpin,
{
    if limit > 0 && length > limit {
        return Err(Exception::BodyTooLarge(limit));
    }
    while buffer.len() < length {
        fill(stream, buffer).await?;
    }
    Ok(buffer.split_to(length).freeze())
}

async fn read_line<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    max_line: usize,
) -> Result<String, Exception>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(index) = buffer.windows(2).position(|w| w == b"\r\n") {
            let line = buffer.split_to(index + 2);
            return std::str::from_utf8(&line[..index])
                .map(str::to_string)
                .map_err(|_| Exception::MalformedRequest);
        }
        if buffer.len() > max_line {
            return Err(Exception::MalformedRequest);
        }
        fill(stream, buffer).await?;
    }
}

/// 解析分块长度行中的十六进制长度，忽略分块扩展
fn parse_chunk_size(line: &str) -> Result<usize, Exception> {
    let size_str = line.split(';').next().unwrap_or_default().trim();
    if size_str.is_empty() || !size_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Exception::MalformedRequest);
    }
    usize::from_str_radix(size_str, 16).map_err(|_| Exception::MalformedRequest)
}

/// 解码 `Transfer-Encoding: chunked` 请求体，忽略分块扩展与尾部标头。
async fn read_chunked_body<S>(
    stream: &mut S,
    buffer: &mut BytesMut,
    limit: usize,
    max_line: usize,
) -> Result<Bytes, Exception>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();
    loop {
        let line = read_line(stream, buffer, max_line).await?;
        let size = parse_chunk_size(&line)?;
        if size == 0 {
            // 尾部标头直到空行
            loop {
                let trailer = read_line(stream, buffer, max_line).await?;
                if trailer.is_empty() {
                    break;
                }
            }
            return Ok(body.freeze());
        }
        let total = body.len().checked_add(size).ok_or(Exception::MalformedRequest)?;
        if limit > 0 && total > limit {
            return Err(Exception::BodyTooLarge(limit));
        }
        let framed = size.checked_add(2).ok_or(Exception::MalformedRequest)?;
        while buffer.len() < framed {
            fill(stream, buffer).await?;
        }
        body.extend_from_slice(&buffer.split_to(size));
        if &buffer[..2] != CRLF.as_bytes() {
            return Err(Exception::MalformedRequest);
        }
        let _ = buffer.split_to(2);
    }
}

/// 在关闭连接前写出协议错误对应的响应。
///
/// 写出后短暂读取并丢弃客户端未发送完的数据，避免接收缓冲区非空时关闭触发 RST 冲掉响应。
async fn write_error<S, H>(stream: &mut S, id: u128, error: &Exception, dispatcher: &Dispatcher<H>)
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    let mut responder = Responder::new(id, dispatcher.state().clone(), HttpVersion::V1_1);
    responder.send_error(&error.to_string(), error.status_code());
    if let Some(mut response) = responder.take_response() {
        response.set_header("Connection", "close");
        if let Err(e) = stream.write_all(&response.as_bytes(true)).await {
            debug!("[ID{}]写出错误响应失败：{}", id, e);
        }
    }
    let _ = stream.shutdown().await;

    let mut sink = [0u8; 4096];
    let mut drained = 0;
    let linger = async {
        while drained < LINGER_LIMIT {
            match stream.read(&mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(n) => drained += n,
            }
        }
    };
    let _ = tokio::time::timeout(LINGER_TIMEOUT, linger).await;
}

/// 服务一个已建立的连接，直到对端关闭、出错、或服务器终止。
pub async fn serve_connection<S, H>(mut stream: S, info: ConnectionInfo, dispatcher: Arc<Dispatcher<H>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    H: Handler,
{
    let state = dispatcher.state().clone();
    let peer = info.peer_addr;
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        if !state.is_active() {
            break;
        }
        let id = state.next_id();

        let head_end = match read_head(&mut stream, &mut buffer, state.max_header_size()).await {
            Ok(Some(end)) => end,
            Ok(None) => {
                debug!("[ID{}]连接已被对端关闭：{}", id, peer);
                return;
            }
            Err(Exception::HeaderTooLarge) => {
                warn!("[ID{}]请求头部过大，来自{}", id, peer);
                dispatcher.handler().client_error(&Exception::HeaderTooLarge, Some(peer));
                write_error(&mut stream, id, &Exception::HeaderTooLarge, &*dispatcher).await;
                return;
            }
            Err(e) => {
                debug!("[ID{}]读取请求失败：{}", id, e);
                dispatcher.handler().client_error(&e, Some(peer));
                return;
            }
        };

        let head_bytes = buffer.split_to(head_end);
        let head = match RequestHead::try_from(&head_bytes, id) {
            Ok(head) => head,
            Err(e) => {
                dispatcher.handler().client_error(&e, Some(peer));
                write_error(&mut stream, id, &e, &*dispatcher).await;
                return;
            }
        };

        if head.expects_continue() {
            let interim = format!("{} 100 Continue{}{}", head.version().as_status_token(), CRLF, CRLF);
            if let Err(e) = stream.write_all(interim.as_bytes()).await {
                dispatcher.handler().client_error(&e.into(), Some(peer));
                return;
            }
        }

        let body_result = if head.is_chunked() {
            read_chunked_body(&mut stream, &mut buffer, state.max_body_size(), state.max_header_size()).await
        } else {
            match head.content_length() {
                Ok(Some(length)) => read_sized_body(&mut stream, &mut buffer, length, state.max_body_size()).await,
                Ok(None) => Ok(Bytes::new()),
                Err(e) => Err(e),
            }
        };
        let body = match body_result {
            Ok(body) => body,
            Err(Exception::ConnectionClosed) => {
                debug!("[ID{}]请求体未读完，连接已关闭", id);
                dispatcher.handler().client_error(&Exception::ConnectionClosed, Some(peer));
                return;
            }
            Err(e) => {
                warn!("[ID{}]请求体错误：{}", id, e);
                dispatcher.handler().client_error(&e, Some(peer));
                write_error(&mut stream, id, &e, &*dispatcher).await;
                return;
            }
        };

        let keep_alive = head.keep_alive();
        let head_only = *head.method() == HttpMethod::Head;

        let mut responder = dispatcher.dispatch(id, head, body, info.clone()).await;
        let mut response = match responder.take_response() {
            Some(response) => response,
            None => {
                debug!("[ID{}]服务器已终止，关闭连接", id);
                break;
            }
        };

        let close = !keep_alive || !state.is_active();
        if close {
            response.set_header("Connection", "close");
        }
        if let Err(e) = stream.write_all(&response.as_bytes(!head_only)).await {
            error!("[ID{}]写出响应失败：{}", id, e);
            dispatcher.handler().client_error(&e.into(), Some(peer));
            return;
        }
        if let Err(e) = stream.flush().await {
            dispatcher.handler().client_error(&e.into(), Some(peer));
            return;
        }
        if close {
            break;
        }
    }
    let _ = stream.shutdown().await;
}
