// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 服务器启动模块
//!
//! `HttpServer` 校验端口组合，按需启动明文监听器和 TLS 监听器，并把每个
//! 连接交给分发器。`terminate()` 是幂等的：第一次调用关闭所有监听器、
//! 标记实例为非活动并调用处理器的 `shutdown` 钩子，之后的调用不做任何事。

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::dispatch::{Dispatcher, Handler};
use crate::exception::Exception;
use crate::param::SERVER_NAME;
use crate::request::ConnectionInfo;
use crate::state::ServerState;
use crate::stats::ServerStatistics;
use crate::tls;

pub struct HttpServer<H: Handler> {
    state: Arc<ServerState>,
    dispatcher: Arc<Dispatcher<H>>,
    http_addr: Option<SocketAddr>,
    https_addr: Option<SocketAddr>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

async fn bind(config: &ServerConfig, port: u16) -> Result<TcpListener, Exception> {
    let address = SocketAddr::new(config.bind_ip(), port);
    match TcpListener::bind(address).await {
        Ok(listener) => {
            info!("端口{}绑定完成，监听地址{}", port, address);
            Ok(listener)
        }
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            Err(Exception::BindFailed {
                port,
                reason: e.to_string(),
            })
        }
    }
}

fn connection_info(stream: &TcpStream, peer: SocketAddr, state: &ServerState, secure: bool) -> Option<ConnectionInfo> {
    match stream.local_addr() {
        Ok(local_addr) => Some(ConnectionInfo {
            local_addr,
            peer_addr: peer,
            hostname: state.hostname().to_string(),
            secure,
            tls_version: None,
            tls_cipher: None,
        }),
        Err(e) => {
            warn!("无法获取连接的本地地址：{}", e);
            None
        }
    }
}

async fn accept_plain<H: Handler>(listener: TcpListener, dispatcher: Arc<Dispatcher<H>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("新的连接：{}", peer);
                if let Some(info) = connection_info(&stream, peer, dispatcher.state(), false) {
                    tokio::spawn(serve_connection(stream, info, dispatcher.clone()));
                }
            }
            Err(e) => {
                error!("接受连接失败：{}", e);
                dispatcher.handler().client_error(&e.into(), None);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn accept_tls<H: Handler>(listener: TcpListener, acceptor: TlsAcceptor, dispatcher: Arc<Dispatcher<H>>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("新的TLS连接：{}", peer);
                let Some(mut info) = connection_info(&stream, peer, dispatcher.state(), true) else {
                    continue;
                };
                let acceptor = acceptor.clone();
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            let (version, cipher) = tls::negotiated(tls_stream.get_ref().1);
                            info.tls_version = version;
                            info.tls_cipher = cipher;
                            serve_connection(tls_stream, info, dispatcher).await;
                        }
                        Err(e) => {
                            debug!("TLS握手失败：{}，来自{}", e, peer);
                            let error = Exception::Io(format!("TLS handshake failed: {}", e));
                            dispatcher.handler().client_error(&error, Some(peer));
                        }
                    }
                });
            }
            Err(e) => {
                error!("接受TLS连接失败：{}", e);
                dispatcher.handler().client_error(&e.into(), None);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

impl<H: Handler> HttpServer<H> {
    /// 以一对端口和默认配置启动服务器。
    ///
    /// 端口为 0 表示不启用对应的监听器，HTTPS 使用当前目录下的 `key.pem` 与 `cert.pem`。
    pub async fn new(handler: H, http_port: i64, https_port: i64) -> Result<Self, Exception> {
        let config = ServerConfig::from_ports(http_port, https_port)?;
        Self::start(handler, config).await
    }

    /// 按配置启动服务器。
    ///
    /// 任何监听器启动之前先加载 TLS 材料并绑定全部端口，失败时不会留下监听中的端口。
    pub async fn start(handler: H, config: ServerConfig) -> Result<Self, Exception> {
        config.validate()?;
        let state = Arc::new(ServerState::new(&config));
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(handler), state.clone()));

        let acceptor = if config.https_port() != 0 {
            Some(tls::load_acceptor(
                Path::new(config.cert_file()),
                Path::new(config.key_file()),
            )?)
        } else {
            None
        };

        let http_listener = match config.http_port() {
            0 => None,
            port => Some(bind(&config, port).await?),
        };
        let https_listener = match config.https_port() {
            0 => None,
            port => Some(bind(&config, port).await?),
        };

        let http_addr = http_listener.as_ref().and_then(|l| l.local_addr().ok());
        let https_addr = https_listener.as_ref().and_then(|l| l.local_addr().ok());

        let mut listeners = Vec::new();
        if let Some(listener) = http_listener {
            listeners.push(tokio::spawn(accept_plain(listener, dispatcher.clone())));
        }
        if let (Some(listener), Some(acceptor)) = (https_listener, acceptor) {
            listeners.push(tokio::spawn(accept_tls(listener, acceptor, dispatcher.clone())));
        }

        let server = Self {
            state,
            dispatcher,
            http_addr,
            https_addr,
            listeners: Mutex::new(listeners),
        };
        info!("{}已启动：{}", SERVER_NAME, server);
        Ok(server)
    }

    /// 停止服务器。重复调用无效果。
    pub fn terminate(&self) {
        if !self.state.deactivate() {
            debug!("服务器已经终止");
            return;
        }
        let listeners: Vec<JoinHandle<()>> = match self.listeners.lock() {
            Ok(mut guard) => guard.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for listener in listeners {
            listener.abort();
        }
        self.dispatcher.handler().shutdown();
        info!("{}已终止", SERVER_NAME);
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn statistics(&self) -> ServerStatistics {
        self.state.statistics()
    }

    /// 替换附加到每个响应上的默认标头
    pub fn set_headers<I, K, V>(&self, headers: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.state.set_headers(headers);
    }

    /// 关闭自动应答的 `GET /api/ping`
    pub fn disable_ping(&self) {
        self.state.disable_ping();
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn handler(&self) -> &H {
        self.dispatcher.handler()
    }

    /// 监听地址，`secure` 为真时返回 HTTPS 监听器的地址
    pub fn local_addr(&self, secure: bool) -> Option<SocketAddr> {
        if secure {
            self.https_addr
        } else {
            self.http_addr
        }
    }
}

impl<H: Handler> Drop for HttpServer<H> {
    fn drop(&mut self) {
        let listeners = match self.listeners.get_mut() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.drain(..) {
            listener.abort();
        }
    }
}

impl<H: Handler> fmt::Display for HttpServer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[HTTP: {}, HTTPS: {}, Active: {}, AB_DEBUG: {}]",
            SERVER_NAME,
            self.http_addr.is_some(),
            self.https_addr.is_some(),
            self.is_active(),
            self.state.debug()
        )
    }
}
