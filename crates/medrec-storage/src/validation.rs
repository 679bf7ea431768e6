//! 上传文件校验

use medrec_core::{MedrecError, Result};
use std::path::Path;

/// 默认文件大小上限：10 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// 允许的扩展名
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png"];

/// 允许的声明MIME类型
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/jpg", "image/png"];

/// 上传策略
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl UploadPolicy {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    /// 校验文件名、声明类型与大小，扩展名和MIME必须同时在允许列表中
    pub fn validate(&self, file_name: &str, mime_type: &str, size: u64) -> Result<()> {
        if !is_allowed_extension(file_name) || !is_allowed_mime(mime_type) {
            return Err(MedrecError::Validation(
                "Invalid file type. Only PDF and image files are allowed.".to_string(),
            ));
        }

        if size > self.max_file_size {
            return Err(MedrecError::Validation(format!(
                "File too large. Maximum size is {} bytes",
                self.max_file_size
            )));
        }

        Ok(())
    }
}

fn is_allowed_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// 去掉 "; charset=..." 之类的参数并转为小写，记录中保存的就是这个值
pub fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_essence(mime_type).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_allowed_files() {
        let policy = UploadPolicy::default();

        assert!(policy.validate("x.pdf", "application/pdf", 1024).is_ok());
        assert!(policy.validate("scan.JPG", "image/jpeg", 1024).is_ok());
        assert!(policy.validate("scan.jpeg", "image/jpeg", 1024).is_ok());
        assert!(policy.validate("xray.png", "image/png", 1024).is_ok());
    }

    #[test]
    fn test_rejects_executable_regardless_of_mime() {
        let policy = UploadPolicy::default();

        for mime in ALLOWED_MIME_TYPES {
            assert!(matches!(
                policy.validate("payload.exe", mime, 10),
                Err(MedrecError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_rejects_mismatched_mime() {
        let policy = UploadPolicy::default();

        assert!(policy.validate("x.pdf", "application/x-msdownload", 10).is_err());
        assert!(policy.validate("x.pdf", "text/plain", 10).is_err());
        assert!(policy.validate("pdf", "application/pdf", 10).is_err()); // 没有扩展名
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        let policy = UploadPolicy::default();
        assert!(policy.validate("x.pdf", "Application/PDF; name=x.pdf", 10).is_ok());
    }

    #[test]
    fn test_mime_essence() {
        assert_eq!(mime_essence("Application/PDF; name=x.pdf"), "application/pdf");
        assert_eq!(mime_essence(" image/png "), "image/png");
        assert_eq!(mime_essence(""), "");
    }

    #[test]
    fn test_size_ceiling() {
        let policy = UploadPolicy::default();

        assert!(policy.validate("x.pdf", "application/pdf", DEFAULT_MAX_FILE_SIZE).is_ok());
        assert!(matches!(
            policy.validate("x.pdf", "application/pdf", DEFAULT_MAX_FILE_SIZE + 1),
            Err(MedrecError::Validation(_))
        ));
    }
}
