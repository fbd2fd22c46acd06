// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 演示服务器
//!
//! 使用 `abhttp` 框架的一个最小示例：
//! - `GET /stats` 返回统计信息 JSON
//! - `GET /files/<path>` 从 `file_root` 发送文件
//! - 其他 `GET` 回显路径文本
//! - `POST` 以 JSON 回显请求
//! - 后台管理控制台（stop / status / help），Ctrl-C 同样会停机

use std::process;

use abhttp::{Exception, Handler, HttpServer, Outcome, Request, Responder, ServerConfig};
use log::{error, info, warn};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Builder;

struct Demo;

impl Handler for Demo {
    async fn get(&self, request: &Request, response: &mut Responder) -> Outcome {
        if request.path() == "stats" {
            let statistics = response.server().statistics();
            response.send_json(&statistics);
        } else if let Some(file) = request.path().strip_prefix("files/") {
            response.send_file(file, None, None).await;
        } else {
            response.send_text(&format!(
                "ABHttpServer {}: /{}",
                request.version(),
                request.path()
            ));
        }
        Outcome::Handled
    }

    async fn post(&self, request: &Request, response: &mut Responder) -> Outcome {
        response.send_json(&json!({
            "path": request.path(),
            "query": request.query(),
            "session": request.session(),
            "secure": request.is_secure(),
            "body": request.data(),
        }));
        Outcome::Handled
    }

    fn client_error(&self, error: &Exception, peer: Option<std::net::SocketAddr>) {
        match peer {
            Some(peer) => warn!("客户端{}出错：{}", peer, error),
            None => warn!("监听器出错：{}", error),
        }
    }

    fn shutdown(&self) {
        info!("演示处理器收到停机通知");
    }
}

fn load_config() -> ServerConfig {
    match ServerConfig::from_toml("config/development.toml") {
        Ok(config) => {
            info!("配置文件已载入");
            config
        }
        Err(Exception::ConfigUnreadable(reason)) => {
            warn!("无法载入配置文件（{}），使用默认配置", reason);
            ServerConfig::default()
        }
        Err(e) => {
            error!("配置错误：{}", e);
            process::exit(1);
        }
    }
}

async fn console(server: &HttpServer<Demo>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) | Err(_) => {
                // stdin 关闭后只等待 Ctrl-C
                std::future::pending::<()>().await;
            }
            Ok(_) => {}
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活");
                return;
            }
            "help" => {
                println!("== ABHttpServer Help ==");
                println!("stop   - 停止服务器");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("=======================");
            }
            "status" => {
                println!("== {} ==", server);
                match serde_json::to_string_pretty(&server.statistics()) {
                    Ok(text) => println!("{}", text),
                    Err(e) => println!("无法序列化统计信息：{}", e),
                }
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}

async fn run(config: ServerConfig) {
    let server = match HttpServer::start(Demo, config).await {
        Ok(server) => server,
        Err(e) => {
            error!("服务器启动失败：{}", e);
            process::exit(1);
        }
    };

    tokio::select! {
        _ = console(&server) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("无法监听Ctrl-C信号：{}", e);
            }
            info!("收到Ctrl-C");
        }
    }

    server.terminate();
}

fn main() {
    let started = abhttp::stats::process_start();
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    let config = load_config();
    info!("进程启动于{}，file root: {}", started.to_rfc3339(), config.file_root());

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            process::exit(1);
        }
    };
    runtime.block_on(run(config));
}
