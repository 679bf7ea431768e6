//! 通用工具函数

use uuid::Uuid;

/// UID 最大长度
pub const MAX_UID_LEN: usize = 64;

/// 生成内容存储中的物理文件名（32位十六进制，避免冲突）
pub fn generate_storage_name() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 验证患者UID格式
pub fn is_valid_uid(uid: &str) -> bool {
    let uid = uid.trim();
    !uid.is_empty() && uid.len() <= MAX_UID_LEN && !uid.chars().any(|c| c.is_control() || c == '/')
}

/// 解析内部标识，无法解析时视为查无此记录
pub fn parse_record_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id.trim()).ok()
}
