// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! TLS 证书与私钥加载。
//!
//! 证书和私钥均为 PEM 格式，在服务器启动时同步读取一次；任何一个缺失或
//! 无法解析都是致命的启动错误。

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error};
use tokio_rustls::rustls::crypto::ring::default_provider;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{ServerConfig, ServerConnection};
use tokio_rustls::TlsAcceptor;

use crate::exception::Exception;

fn open(path: &Path, what: &str) -> Result<BufReader<File>, Exception> {
    if !path.exists() {
        error!("{}文件不存在：{}", what, path.display());
        return Err(Exception::TlsMaterial(format!(
            "{} file not found: {}",
            what,
            path.display()
        )));
    }
    File::open(path).map(BufReader::new).map_err(|e| {
        error!("无法打开{}文件{}：{}", what, path.display(), e);
        Exception::TlsMaterial(format!("{}: {}", path.display(), e))
    })
}

pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Exception> {
    let mut reader = open(path, "Certificate")?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Exception::TlsMaterial(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(Exception::TlsMaterial(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, Exception> {
    let mut reader = open(path, "Private key")?;
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(Exception::TlsMaterial(format!(
            "no private key found in {}",
            path.display()
        ))),
        Err(e) => Err(Exception::TlsMaterial(format!("{}: {}", path.display(), e))),
    }
}

/// 由证书链和私钥构建 TLS 接收器，ALPN 只提供 `http/1.1`。
pub fn load_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, Exception> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Exception::TlsMaterial(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Exception::TlsMaterial(e.to_string()))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    debug!(
        "已加载TLS证书{}与私钥{}",
        cert_file.display(),
        key_file.display()
    );
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// 握手完成后协商得到的协议版本与密码套件
pub fn negotiated(connection: &ServerConnection) -> (Option<String>, Option<String>) {
    let version = connection.protocol_version().map(|v| format!("{:?}", v));
    let cipher = connection
        .negotiated_cipher_suite()
        .map(|s| format!("{:?}", s.suite()));
    (version, cipher)
}
