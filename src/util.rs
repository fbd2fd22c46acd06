// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 工具函数：会话令牌、文件路径解析与读取、主机名、文件大小格式化。

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use log::{debug, warn};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::exception::Exception;
use crate::param::SESSION_TOKEN_BYTES;

/// 生成新的会话令牌：32 字节系统随机数的标准 Base64 编码（44 个字符）。
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// 纯词法的路径规范化：去掉 `.`，用 `..` 弹出上一级，不访问文件系统。
///
/// 根目录之上的 `..` 会被丢弃，和 `realpath` 对 `/..` 的处理一致。
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() && !result.has_root() {
                    result.push("..");
                }
            }
            Component::Normal(name) => result.push(name),
        }
    }
    result
}

/// 把相对路径补全为绝对路径后再做规范化
fn absolute(path: &Path) -> Result<PathBuf, Exception> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        let cwd = env::current_dir()?;
        Ok(normalize(&cwd.join(path)))
    }
}

/// 校验并解析 `file` 在 `root` 之下的实际路径。
///
/// 校验顺序：NUL 字节、空文件名、规范化后是否位于 `root` 之下（按路径分量比较）。
pub fn resolve_file_path(file: &str, root: &Path) -> Result<PathBuf, Exception> {
    if file.contains('\0') {
        return Err(Exception::InvalidFileName(file.to_string()));
    }
    if file.trim().is_empty() {
        return Err(Exception::EmptyFileName);
    }
    let root = absolute(root)?;
    let candidate = Path::new(file);
    let resolved = if candidate.is_absolute() {
        normalize(candidate)
    } else {
        normalize(&root.join(candidate))
    };
    if !resolved.starts_with(&root) {
        warn!("拒绝访问根目录之外的文件：{}", file);
        return Err(Exception::OutsideFileRoot(file.to_string()));
    }
    Ok(resolved)
}

/// 异步读取 `root` 之下的文件，返回其完整内容。
///
/// 不存在返回 `FileNotFound`，目录返回 `IsDirectory`，其余读取失败返回 `FileReadFailed`。
pub async fn read_file(file: &str, root: &Path) -> Result<(PathBuf, Bytes), Exception> {
    let path = resolve_file_path(file, root)?;
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Exception::FileNotFound(file.to_string()));
        }
        Err(e) => {
            warn!("无法获取{}的元数据：{}", path.display(), e);
            return Err(Exception::FileReadFailed(file.to_string()));
        }
    };
    if metadata.is_dir() {
        return Err(Exception::IsDirectory(file.to_string()));
    }
    match tokio::fs::read(&path).await {
        Ok(content) => {
            debug!(
                "读取文件{}，大小{}",
                path.display(),
                format_file_size(content.len() as u64)
            );
            Ok((path, Bytes::from(content)))
        }
        Err(e) => {
            warn!("读取文件{}失败：{}", path.display(), e);
            Err(Exception::FileReadFailed(file.to_string()))
        }
    }
}

pub fn format_file_size(size: u64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < units.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}

/// 本机主机名：依次尝试 `HOSTNAME` 环境变量、`/etc/hostname`，最后回退为 `localhost`。
pub fn hostname() -> String {
    if let Ok(name) = env::var("HOSTNAME") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    match fs::read_to_string("/etc/hostname") {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => "localhost".to_string(),
    }
}
