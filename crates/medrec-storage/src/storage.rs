//! 报告文件存储管理

use medrec_core::{utils::generate_storage_name, MedrecError, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// 内容存储：上传目录下的扁平文件集合
///
/// 物理文件名由存储自行生成，原始文件名只作为元数据保存在记录中。
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 确保上传目录存在
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// 写入文件，返回记录中保存的 `filePath`
    pub async fn store_file(&self, data: &[u8]) -> Result<String> {
        let full_path = self.root.join(generate_storage_name());

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!("Stored {} bytes at {}", data.len(), full_path.display());
        Ok(full_path.to_string_lossy().to_string())
    }

    /// 读取文件
    pub async fn get_file(&self, file_path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve(file_path)?;
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    /// 删除文件
    pub async fn remove_file(&self, file_path: &str) -> Result<()> {
        let full_path = self.resolve(file_path)?;
        tokio::fs::remove_file(&full_path).await?;
        debug!("Removed {}", full_path.display());
        Ok(())
    }

    /// 只接受直接位于上传目录下的路径
    fn resolve(&self, file_path: &str) -> Result<PathBuf> {
        let path = PathBuf::from(file_path);
        let inside_root = path.parent() == Some(self.root.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name != "..");

        if !inside_root {
            return Err(MedrecError::Storage(format!(
                "Path {} is outside the content store",
                file_path
            )));
        }
        Ok(path)
    }
}
