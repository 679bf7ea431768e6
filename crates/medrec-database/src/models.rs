//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use medrec_core::models::*;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: Uuid,
    pub uid: String,
    pub name: String,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub other_fields: Json<Map<String, Value>>, // JSONB列
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            uid: db_patient.uid,
            name: db_patient.name,
            age: db_patient.age.and_then(|age| u32::try_from(age).ok()),
            gender: db_patient.gender,
            other_fields: db_patient.other_fields.0,
            role: db_patient.role,
            created_at: db_patient.created_at,
            updated_at: db_patient.updated_at,
        }
    }
}

/// 数据库报告表
#[derive(Debug, FromRow)]
pub struct DbReport {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbReport> for Report {
    fn from(db_report: DbReport) -> Self {
        Report {
            id: db_report.id,
            patient_id: db_report.patient_id,
            file_path: db_report.file_path,
            file_name: db_report.file_name,
            file_type: db_report.file_type,
            created_at: db_report.created_at,
            updated_at: db_report.updated_at,
        }
    }
}

/// 数据库处方表
#[derive(Debug, FromRow)]
pub struct DbPrescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub uid: String,
    pub medication: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbPrescription> for Prescription {
    fn from(db_prescription: DbPrescription) -> Self {
        Prescription {
            id: db_prescription.id,
            patient_id: db_prescription.patient_id,
            uid: db_prescription.uid,
            medication: db_prescription.medication,
            date: db_prescription.date,
            created_at: db_prescription.created_at,
            updated_at: db_prescription.updated_at,
        }
    }
}
