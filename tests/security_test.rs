// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

#[cfg(test)]
mod security_tests {
    //! # 安全回归测试套件
    //!
    //! 通过模拟常见的攻击向量验证服务器的防御能力：
    //! - 路径遍历（包括编码后的 `..` 与绝对路径）
    //! - NUL 字节注入
    //! - 超大请求头与请求体
    //! - 协议健壮性（畸形请求行、不支持的版本）

    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    use abhttp::{Handler, HttpServer, Outcome, Request, Responder, ServerConfig};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// 按路径或 `file` 查询参数发送 `root` 下的文件
    struct Files {
        root: PathBuf,
    }

    impl Handler for Files {
        async fn get(&self, request: &Request, response: &mut Responder) -> Outcome {
            let file = match request.query_param("file") {
                Some(file) => file.to_string(),
                None => request.path().to_string(),
            };
            response.send_file(&file, Some(&self.root), None).await;
            Outcome::Handled
        }

        async fn post(&self, request: &Request, response: &mut Responder) -> Outcome {
            response.send_text(&request.body().len().to_string());
            Outcome::Handled
        }
    }

    /// 目录结构：`<tmp>/secret.txt` 与 `<tmp>/www/index.html`，`www` 为文件根目录
    struct Fixture {
        _dir: TempDir,
        server: HttpServer<Files>,
        port: u16,
        secret: PathBuf,
    }

    async fn fixture(config: impl FnOnce(ServerConfig) -> ServerConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("index.html"), "<h1>index</h1>").unwrap();
        let secret = dir.path().join("secret.txt");
        fs::write(&secret, "top secret").unwrap();

        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let base = ServerConfig::from_ports(port as i64, 0)
            .unwrap()
            .with_local(true);
        let server = HttpServer::start(Files { root }, config(base)).await.unwrap();
        Fixture {
            _dir: dir,
            server,
            port,
            secret,
        }
    }

    /// # 异步请求发送器
    ///
    /// 设置硬超时限制，防止测试用例因服务器挂起而永久阻塞。
    async fn send_request(port: u16, request: &[u8]) -> Result<String, String> {
        let mut stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(|e| e.to_string())?;
        stream.write_all(request).await.map_err(|e| e.to_string())?;
        let mut buffer = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn extract_status_code(response: &str) -> u16 {
        response
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0)
    }

    async fn get(port: u16, target: &str) -> String {
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", target);
        send_request(port, request.as_bytes()).await.unwrap()
    }

    #[tokio::test]
    async fn test_serves_file_inside_root() {
        let f = fixture(|c| c).await;
        let response = get(f.port, "/index.html").await;
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.contains("Content-Type: text/html\r\n"));
        assert!(response.ends_with("<h1>index</h1>"));
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_path_traversal_simple() {
        let f = fixture(|c| c).await;
        assert!(f.secret.exists());
        let response = get(f.port, "/../secret.txt").await;
        assert_eq!(extract_status_code(&response), 400);
        assert!(!response.contains("top secret"));
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_path_traversal_encoded() {
        let f = fixture(|c| c).await;
        for target in ["/%2e%2e/secret.txt", "/css/%2E%2E/%2e%2e/secret.txt"] {
            let response = get(f.port, target).await;
            assert_eq!(extract_status_code(&response), 400, "target {}", target);
            assert!(!response.contains("top secret"));
        }
        // 编码的 `/` 不会被解码，整段只是根目录下一个不存在的文件名
        for target in ["/%2E%2E%2Fsecret.txt", "/css/..%2F..%2Fsecret.txt"] {
            let response = get(f.port, target).await;
            assert_eq!(extract_status_code(&response), 404, "target {}", target);
            assert!(!response.contains("top secret"));
        }
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_absolute_path_outside_root() {
        let f = fixture(|c| c).await;
        let target = format!("/?file={}", f.secret.display());
        let response = get(f.port, &target).await;
        assert_eq!(extract_status_code(&response), 400);

        // 根目录之外不存在的文件同样是 400，而不是 404
        let response = get(f.port, "/?file=/definitely/not/here.txt").await;
        assert_eq!(extract_status_code(&response), 400);
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_null_byte_injection() {
        let f = fixture(|c| c).await;
        let response = get(f.port, "/index.html%00.jpg").await;
        assert_eq!(extract_status_code(&response), 400);
        assert!(response.contains("invalid characters"));
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_missing_file_and_directory() {
        let f = fixture(|c| c).await;
        assert_eq!(extract_status_code(&get(f.port, "/missing.html").await), 404);
        assert_eq!(extract_status_code(&get(f.port, "/?file=.").await), 400);
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_oversized_header() {
        let f = fixture(|c| c.with_max_header_size(1024)).await;
        let request = format!(
            "GET / HTTP/1.1\r\nHost: localhost\r\nX-Large: {}\r\n\r\n",
            "A".repeat(4096)
        );
        let response = send_request(f.port, request.as_bytes()).await.unwrap();
        assert_eq!(extract_status_code(&response), 431);
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let f = fixture(|c| c.with_max_body_size(16)).await;
        let request = "POST / HTTP/1.1\r\nContent-Length: 1000\r\n\r\n";
        let response = send_request(f.port, request.as_bytes()).await.unwrap();
        assert_eq!(extract_status_code(&response), 413);

        let request = "POST / HTTP/1.1\r\nContent-Length: 4\r\nConnection: close\r\n\r\nabcd";
        let response = send_request(f.port, request.as_bytes()).await.unwrap();
        assert_eq!(extract_status_code(&response), 200);
        assert!(response.ends_with('4'));
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_malformed_http_version() {
        let f = fixture(|c| c).await;
        let response = send_request(f.port, b"GET / HTTP/9.9\r\n\r\n").await.unwrap();
        assert_eq!(extract_status_code(&response), 505);
        let response = send_request(f.port, b"GARBAGE\r\n\r\n").await.unwrap();
        assert_eq!(extract_status_code(&response), 400);
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_non_utf8_request_head() {
        let f = fixture(|c| c).await;
        let response = send_request(f.port, b"GET /\xff\xfe HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(extract_status_code(&response), 400);
        f.server.terminate();
    }

    #[tokio::test]
    async fn test_invalid_content_length() {
        let f = fixture(|c| c).await;
        let request = "POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
        let response = send_request(f.port, request.as_bytes()).await.unwrap();
        assert_eq!(extract_status_code(&response), 400);
        f.server.terminate();
    }
}
