// 上传暂存区
//
// 浏览器先把文件上传到本机暂存目录，拿到 handle 后再请求传输到远端。
// 目录内文件以 handle 命名；同一 handle 同时只能被一个传输占用，成功后删除。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::LOCAL_FILE_NOT_FOUND;
use crate::models::StagedFile;
use crate::ssh::SshError;

/// 暂存区
pub struct StagingArea {
    root: PathBuf,
    /// 正在传输中的 handle
    claimed: Mutex<HashSet<String>>,
}

impl StagingArea {
    /// 打开暂存目录（不存在则创建）
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create upload directory {:?}", root))?;
        Ok(Self {
            root,
            claimed: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 开始写入一个新的暂存文件
    pub async fn writer(&self) -> Result<StagingWriter> {
        let handle = Uuid::new_v4().to_string();
        let path = self.root.join(&handle);
        let file = fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create staged file {:?}", path))?;
        Ok(StagingWriter {
            handle,
            path,
            file,
            written: 0,
        })
    }

    /// 一次性暂存整段字节
    #[cfg(test)]
    pub async fn stage(&self, data: &[u8]) -> Result<StagedFile> {
        let mut writer = self.writer().await?;
        writer.write_chunk(data).await?;
        writer.finish().await
    }

    /// 占用 handle 用于一次传输
    pub async fn claim(&self, handle: &str) -> Result<StagedFile, SshError> {
        let path = self
            .path_for(handle)
            .ok_or_else(|| SshError::LocalFile(LOCAL_FILE_NOT_FOUND.to_string()))?;

        let mut claimed = self.claimed.lock().await;
        if claimed.contains(handle) {
            return Err(SshError::LocalFile(
                "File is already being transferred".to_string(),
            ));
        }

        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(SshError::LocalFile(LOCAL_FILE_NOT_FOUND.to_string())),
        };

        claimed.insert(handle.to_string());
        debug!("[Staging] Claimed {}", handle);
        Ok(StagedFile {
            handle: handle.to_string(),
            byte_size: metadata.len(),
            local_path: path,
        })
    }

    /// 传输成功：删除本地文件并释放 handle
    pub async fn consume(&self, handle: &str) {
        let mut claimed = self.claimed.lock().await;
        if !claimed.remove(handle) {
            warn!("[Staging] Consume of unclaimed handle {}", handle);
            return;
        }
        if let Some(path) = self.path_for(handle) {
            if let Err(e) = fs::remove_file(&path).await {
                warn!("[Staging] Failed to remove {:?}: {}", path, e);
            } else {
                debug!("[Staging] Consumed {}", handle);
            }
        }
    }

    /// 传输失败：保留本地文件，允许再次请求
    pub async fn release(&self, handle: &str) {
        if self.claimed.lock().await.remove(handle) {
            debug!("[Staging] Released {}", handle);
        }
    }

    /// 回收超过 max_age 且未被占用的暂存文件，返回删除数量
    pub async fn sweep(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root)
            .await
            .with_context(|| format!("Failed to read upload directory {:?}", self.root))?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // 检查与删除期间持有锁，claim 无法插入其间
            let claimed = self.claimed.lock().await;
            if claimed.contains(&name) {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age >= max_age {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("[Staging] Failed to remove {:?}: {}", entry.path(), e),
                }
            }
            drop(claimed);
        }

        if removed > 0 {
            info!("[Staging] Swept {} abandoned file(s)", removed);
        }
        Ok(removed)
    }

    /// 只接受 UUID 形式的 handle，避免路径穿越
    fn path_for(&self, handle: &str) -> Option<PathBuf> {
        let id = Uuid::parse_str(handle).ok()?;
        Some(self.root.join(id.to_string()))
    }
}

/// 启动后台回收任务
pub fn spawn_sweeper(area: Arc<StagingArea>, every: Duration, max_age: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = area.sweep(max_age).await {
                warn!("[Staging] Sweep failed: {:#}", e);
            }
        }
    })
}

/// 暂存文件写入器
pub struct StagingWriter {
    handle: String,
    path: PathBuf,
    file: fs::File,
    written: u64,
}

impl StagingWriter {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .with_context(|| format!("Failed to write staged file {:?}", self.path))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<StagedFile> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        info!("[Staging] Staged {} ({} bytes)", self.handle, self.written);
        Ok(StagedFile {
            handle: self.handle,
            byte_size: self.written,
            local_path: self.path,
        })
    }

    /// 写入失败时丢弃半成品
    pub async fn abort(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.path).await;
    }
}
