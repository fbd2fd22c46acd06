// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发模块
//!
//! 每个完整的 HTTP 事务（请求体已全部读取）都会经过 `Dispatcher::dispatch`：
//! 1. 组装规范化请求（路径、查询参数、Cookie、连接信息）。
//! 2. 确定会话标识，缺失时签发新的 `ABSession` Cookie。
//! 3. 更新请求计数器。
//! 4. 自动应答 `GET /api/ping`（可关闭）。
//! 5. 按请求方法调用 `Handler` 的同名方法，未处理时交给 `all_methods`，
//!    仍未处理则返回 501。

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, warn};
use serde_json::json;

use crate::exception::Exception;
use crate::param::*;
use crate::request::{ConnectionInfo, Request, RequestHead};
use crate::response::Responder;
use crate::state::ServerState;
use crate::util::generate_session_id;

/// 处理器的返回结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 已经写出响应，分发结束
    Handled,
    /// 未处理，交给下一级
    NotHandled,
}

macro_rules! verb_handlers {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            fn $name(
                &self,
                _request: &Request,
                _response: &mut Responder,
            ) -> impl Future<Output = Outcome> + Send {
                async { Outcome::NotHandled }
            }
        )*
    };
}

/// 用户实现的请求处理器。
///
/// 每个 IANA 注册的 HTTP 方法对应一个同名方法（`-` 换成 `_`），默认返回
/// `Outcome::NotHandled`。只需要覆盖关心的方法，实现时可以直接写 `async fn`：
///
/// ```no_run
/// use abhttp::{Handler, Outcome, Request, Responder};
///
/// struct Hello;
///
/// impl Handler for Hello {
///     async fn get(&self, request: &Request, response: &mut Responder) -> Outcome {
///         response.send_text(&format!("hello {}", request.path()));
///         Outcome::Handled
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    verb_handlers! {
        acl,
        baseline_control,
        bind,
        checkin,
        checkout,
        connect,
        copy,
        delete,
        get,
        /// HEAD 请求：响应的 `Content-Length` 保留，但内容不会写出
        head,
        label,
        link,
        lock,
        merge,
        mkactivity,
        mkcalendar,
        mkcol,
        mkredirectref,
        mkworkspace,
        r#move,
        options,
        orderpatch,
        patch,
        post,
        pri,
        propfind,
        proppatch,
        put,
        rebind,
        report,
        search,
        trace,
        unbind,
        uncheckout,
        unlink,
        unlock,
        update,
        updateredirectref,
        version_control,
        /// 兜底处理器：方法处理器未处理，或方法不在注册表中时调用
        all_methods,
    }

    /// Socket、TLS 握手或请求解析失败时调用，默认忽略
    fn client_error(&self, _error: &Exception, _peer: Option<SocketAddr>) {}

    /// 服务器第一次 `terminate()` 时调用
    fn shutdown(&self) {}
}

pub struct Dispatcher<H: Handler> {
    handler: Arc<H>,
    state: Arc<ServerState>,
}

impl<H: Handler> Dispatcher<H> {
    pub fn new(handler: Arc<H>, state: Arc<ServerState>) -> Self {
        Self { handler, state }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// 分发一个完整的请求，返回持有响应的 `Responder`。
    pub async fn dispatch(
        &self,
        id: u128,
        head: RequestHead,
        body: Bytes,
        connection: ConnectionInfo,
    ) -> Responder {
        let secure = connection.secure;
        let mut request = Request::from_parts(id, head, body, connection);
        let mut responder = Responder::new(id, self.state.clone(), request.http_version());
        if *request.method() == HttpMethod::Head {
            responder.omit_body();
        }

        if request.session().is_empty() {
            let token = generate_session_id();
            responder.set_header("Set-Cookie", &format!("{}={}", SESSION_COOKIE, token));
            request.assign_session(token);
        }

        self.state.record_request(secure, request.body().len() as u64);

        if self.state.debug() {
            debug!(
                "[ID{}]{} {}，HTTPS：{}，来自{}:{}，请求体{}字节",
                id,
                request.method(),
                request.url(),
                secure,
                request.client_address(),
                request.client_port(),
                request.body().len()
            );
        }

        if *request.method() == HttpMethod::Get
            && self.state.ping_enabled()
            && request.path().eq_ignore_ascii_case(PING_PATH)
        {
            responder.send_json(&json!({ "response": "ok" }));
            return responder;
        }

        let mut outcome = self.call_verb(&request, &mut responder).await;
        if outcome == Outcome::NotHandled && !responder.is_sent() {
            outcome = self.handler.all_methods(&request, &mut responder).await;
        }

        match outcome {
            Outcome::Handled if !responder.is_sent() => {
                warn!("[ID{}]处理器返回Handled但没有发送响应", id);
                responder.send_error("The handler did not send a response", 500);
            }
            Outcome::NotHandled if !responder.is_sent() => {
                let message = if request.method().is_registered() {
                    format!("No handler implementation for HTTP method {}", request.method())
                } else {
                    format!("The server does not support the HTTP method {}", request.method())
                };
                responder.send_error(&message, 501);
            }
            _ => {}
        }
        responder
    }

    async fn call_verb(&self, request: &Request, response: &mut Responder) -> Outcome {
        let h = &*self.handler;
        match request.method() {
            HttpMethod::Acl => h.acl(request, response).await,
            HttpMethod::BaselineControl => h.baseline_control(request, response).await,
            HttpMethod::Bind => h.bind(request, response).await,
            HttpMethod::Checkin => h.checkin(request, response).await,
            HttpMethod::Checkout => h.checkout(request, response).await,
            HttpMethod::Connect => h.connect(request, response).await,
            HttpMethod::Copy => h.copy(request, response).await,
            HttpMethod::Delete => h.delete(request, response).await,
            HttpMethod::Get => h.get(request, response).await,
            HttpMethod::Head => h.head(request, response).await,
            HttpMethod::Label => h.label(request, response).await,
            HttpMethod::Link => h.link(request, response).await,
            HttpMethod::Lock => h.lock(request, response).await,
            HttpMethod::Merge => h.merge(request, response).await,
            HttpMethod::MkActivity => h.mkactivity(request, response).await,
            HttpMethod::MkCalendar => h.mkcalendar(request, response).await,
            HttpMethod::MkCol => h.mkcol(request, response).await,
            HttpMethod::MkRedirectRef => h.mkredirectref(request, response).await,
            HttpMethod::MkWorkspace => h.mkworkspace(request, response).await,
            HttpMethod::Move => h.r#move(request, response).await,
            HttpMethod::Options => h.options(request, response).await,
            HttpMethod::OrderPatch => h.orderpatch(request, response).await,
            HttpMethod::Patch => h.patch(request, response).await,
            HttpMethod::Post => h.post(request, response).await,
            HttpMethod::Pri => h.pri(request, response).await,
            HttpMethod::PropFind => h.propfind(request, response).await,
            HttpMethod::PropPatch => h.proppatch(request, response).await,
            HttpMethod::Put => h.put(request, response).await,
            HttpMethod::Rebind => h.rebind(request, response).await,
            HttpMethod::Report => h.report(request, response).await,
            HttpMethod::Search => h.search(request, response).await,
            HttpMethod::Trace => h.trace(request, response).await,
            HttpMethod::Unbind => h.unbind(request, response).await,
            HttpMethod::Uncheckout => h.uncheckout(request, response).await,
            HttpMethod::Unlink => h.unlink(request, response).await,
            HttpMethod::Unlock => h.unlock(request, response).await,
            HttpMethod::Update => h.update(request, response).await,
            HttpMethod::UpdateRedirectRef => h.updateredirectref(request, response).await,
            HttpMethod::VersionControl => h.version_control(request, response).await,
            HttpMethod::Unknown(name) => {
                warn!("[ID{}]未知的HTTP方法：{}", request.id(), name);
                Outcome::NotHandled
            }
        }
    }
}
