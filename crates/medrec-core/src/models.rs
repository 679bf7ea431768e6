//! 核心数据模型定义
//!
//! 记录对外序列化为 camelCase，内部标识序列化为 `_id`，与前端约定一致。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MedrecError, Result};
use crate::utils::is_valid_uid;

/// 新建患者的默认角色
pub const DEFAULT_PATIENT_ROLE: &str = "patient";

/// 患者档案
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub uid: String, // 患者自选的唯一标识
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    #[serde(default)]
    pub other_fields: Map<String, Value>, // 地址、邮箱、电话等
    pub role: String, // 令牌中声明的角色
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建患者请求
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_age")]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub other_fields: Map<String, Value>,
    #[serde(default)]
    pub role: Option<String>,
}

impl NewPatient {
    /// 校验必填字段
    pub fn validate(&self) -> Result<()> {
        if !is_valid_uid(&self.uid) {
            return Err(MedrecError::Validation("A valid uid is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(MedrecError::Validation("Patient name is required".to_string()));
        }
        Ok(())
    }

    pub fn into_patient(self) -> Patient {
        let now = Utc::now();
        Patient {
            id: Uuid::new_v4(),
            uid: self.uid.trim().to_string(),
            name: self.name,
            age: self.age,
            gender: self.gender,
            other_fields: self.other_fields,
            role: self
                .role
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_PATIENT_ROLE.to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// 患者部分更新
///
/// 只有调用方实际提供的字段才会被写入，缺省字段保持原值。
/// `uid` 不可通过更新修改。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_age")]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub other_fields: Option<Map<String, Value>>,
    #[serde(default)]
    pub role: Option<String>,
}

impl PatientPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.other_fields.is_none()
            && self.role.is_none()
    }

    /// 将补丁合并到患者档案上
    pub fn apply(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.clone();
        }
        if let Some(age) = self.age {
            patient.age = Some(age);
        }
        if let Some(gender) = &self.gender {
            patient.gender = Some(gender.clone());
        }
        if let Some(other_fields) = &self.other_fields {
            patient.other_fields = other_fields.clone();
        }
        if let Some(role) = &self.role {
            patient.role = role.clone();
        }
        if !self.is_empty() {
            patient.updated_at = Utc::now();
        }
    }
}

/// 检查报告文件记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_id: Uuid,  // 所属患者的内部ID
    pub file_path: String, // 内容存储中的位置
    pub file_name: String, // 客户端提供的原始文件名
    pub file_type: String, // 声明的MIME类型
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新报告
#[derive(Debug, Clone)]
pub struct NewReport {
    pub patient_id: Uuid,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
}

impl NewReport {
    pub fn into_report(self) -> Report {
        let now = Utc::now();
        Report {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            file_path: self.file_path,
            file_name: self.file_name,
            file_type: self.file_type,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 报告元数据的部分更新
#[derive(Debug, Clone, Default)]
pub struct ReportPatch {
    pub file_path: Option<String>,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
}

impl ReportPatch {
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none() && self.file_name.is_none() && self.file_type.is_none()
    }

    pub fn apply(&self, report: &mut Report) {
        if let Some(file_path) = &self.file_path {
            report.file_path = file_path.clone();
        }
        if let Some(file_name) = &self.file_name {
            report.file_name = file_name.clone();
        }
        if let Some(file_type) = &self.file_type {
            report.file_type = file_type.clone();
        }
        if !self.is_empty() {
            report.updated_at = Utc::now();
        }
    }
}

/// 处方
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_id: Uuid,
    pub uid: String,
    pub medication: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新处方
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub patient_id: Uuid,
    pub uid: String,
    pub medication: String,
    pub date: NaiveDate,
}

impl NewPrescription {
    pub fn into_prescription(self) -> Prescription {
        let now = Utc::now();
        Prescription {
            id: Uuid::new_v4(),
            patient_id: self.patient_id,
            uid: self.uid,
            medication: self.medication,
            date: self.date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 处方部分更新
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionPatch {
    #[serde(default)]
    pub medication: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl PrescriptionPatch {
    pub fn is_empty(&self) -> bool {
        self.medication.is_none() && self.date.is_none()
    }

    pub fn apply(&self, prescription: &mut Prescription) {
        if let Some(medication) = &self.medication {
            prescription.medication = medication.clone();
        }
        if let Some(date) = self.date {
            prescription.date = date;
        }
        if !self.is_empty() {
            prescription.updated_at = Utc::now();
        }
    }
}

/// 年龄既可能是数字，也可能是表单提交的数字字符串
#[derive(Deserialize)]
#[serde(untagged)]
enum AgeRepr {
    Number(u32),
    Text(String),
}

fn deserialize_age<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<AgeRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(AgeRepr::Number(age)) => Ok(Some(age)),
        Some(AgeRepr::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(AgeRepr::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
