// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # abhttp
//!
//! 基于 Tokio 的极简 HTTP/HTTPS 服务器框架：每个请求按 HTTP 方法分发到
//! `Handler` 的同名方法，未处理的请求交给 `all_methods`，仍未处理则返回 501。

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod exception;
pub mod param;
pub mod request;
pub mod response;
pub mod server;
pub mod state;
pub mod stats;
pub mod tls;
pub mod util;

pub use config::ServerConfig;
pub use dispatch::{Dispatcher, Handler, Outcome};
pub use exception::Exception;
pub use param::{HttpMethod, HttpVersion};
pub use request::{ConnectionInfo, Request, RequestHead};
pub use response::{Responder, Response};
pub use server::HttpServer;
pub use state::ServerState;
pub use stats::ServerStatistics;
pub use util::{generate_session_id, read_file};
