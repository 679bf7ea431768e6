//! PostgreSQL 文档存储

use async_trait::async_trait;
use medrec_core::{
    MedrecError, Patient, PatientPatch, Prescription, PrescriptionPatch, Report, ReportPatch,
    Result,
};
use sqlx::types::Json;
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;
use crate::store::DocumentStore;

/// PostgreSQL 唯一约束冲突错误码
const UNIQUE_VIOLATION: &str = "23505";

/// 基于PostgreSQL的文档存储
///
/// `reports` 与 `prescriptions` 不声明外键：删除患者不级联，也不被阻止。
#[derive(Clone)]
pub struct PostgresStore {
    pool: DatabasePool,
}

impl PostgresStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                uid VARCHAR(64) UNIQUE NOT NULL,
                name TEXT NOT NULL,
                age INTEGER,
                gender TEXT,
                other_fields JSONB NOT NULL DEFAULT '{}'::jsonb,
                role VARCHAR(32) NOT NULL DEFAULT 'patient',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedrecError::Database(e.to_string()))?;

        // 创建报告表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS reports (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_type VARCHAR(128) NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedrecError::Database(e.to_string()))?;

        // 创建处方表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS prescriptions (
                id UUID PRIMARY KEY,
                patient_id UUID NOT NULL,
                uid VARCHAR(64) NOT NULL,
                medication TEXT NOT NULL,
                date DATE NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| MedrecError::Database(e.to_string()))?;

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_reports_patient_id ON reports(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_prescriptions_patient_id ON prescriptions(patient_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| MedrecError::Database(e.to_string()))?;
        }

        tracing::info!("Database tables created successfully");
        Ok(())
    }
}

fn age_column(age: Option<u32>) -> Result<Option<i32>> {
    age.map(|age| {
        i32::try_from(age).map_err(|_| MedrecError::Validation("Age is out of range".to_string()))
    })
    .transpose()
}

#[async_trait]
impl DocumentStore for PostgresStore {
    // ========== 患者相关操作 ==========

    async fn insert_patient(&self, patient: Patient) -> Result<Patient> {
        let pool = self.pool.pool();

        sqlx::query_as::<_, DbPatient>(r#"
            INSERT INTO patients (id, uid, name, age, gender, other_fields, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
        "#)
        .bind(patient.id)
        .bind(&patient.uid)
        .bind(&patient.name)
        .bind(age_column(patient.age)?)
        .bind(&patient.gender)
        .bind(Json(&patient.other_fields))
        .bind(&patient.role)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .fetch_one(pool)
        .await
        .map(Patient::from)
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if duplicate {
                MedrecError::Conflict(format!("Patient with uid {} already exists", patient.uid))
            } else {
                MedrecError::Database(e.to_string())
            }
        })
    }

    async fn find_patient_by_uid(&self, uid: &str) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE uid = $1")
            .bind(uid)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    async fn update_patient_by_uid(
        &self,
        uid: &str,
        patch: &PatientPatch,
    ) -> Result<Option<Patient>> {
        if patch.is_empty() {
            return self.find_patient_by_uid(uid).await;
        }

        // NULL参数表示调用方未提供该字段，保留原值
        let result = sqlx::query_as::<_, DbPatient>(r#"
            UPDATE patients SET
                name = COALESCE($2, name),
                age = COALESCE($3, age),
                gender = COALESCE($4, gender),
                other_fields = COALESCE($5, other_fields),
                role = COALESCE($6, role),
                updated_at = NOW()
            WHERE uid = $1
            RETURNING *
        "#)
        .bind(uid)
        .bind(&patch.name)
        .bind(age_column(patch.age)?)
        .bind(&patch.gender)
        .bind(patch.other_fields.as_ref().map(Json))
        .bind(&patch.role)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    async fn delete_patient_by_id(&self, id: &Uuid) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>("DELETE FROM patients WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Patient::from))
    }

    // ========== 报告相关操作 ==========

    async fn insert_report(&self, report: Report) -> Result<Report> {
        sqlx::query_as::<_, DbReport>(r#"
            INSERT INTO reports (id, patient_id, file_path, file_name, file_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        "#)
        .bind(report.id)
        .bind(report.patient_id)
        .bind(&report.file_path)
        .bind(&report.file_name)
        .bind(&report.file_type)
        .bind(report.created_at)
        .bind(report.updated_at)
        .fetch_one(self.pool.pool())
        .await
        .map(Report::from)
        .map_err(|e| MedrecError::Database(e.to_string()))
    }

    async fn find_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>> {
        let result = sqlx::query_as::<_, DbReport>(
            "SELECT * FROM reports WHERE id = $1 AND patient_id = $2",
        )
        .bind(id)
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Report::from))
    }

    async fn find_reports_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Report>> {
        let results = sqlx::query_as::<_, DbReport>(
            "SELECT * FROM reports WHERE patient_id = $1 ORDER BY created_at",
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Report::from).collect())
    }

    async fn update_report(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<Report>> {
        if patch.is_empty() {
            return self.find_report(id, patient_id).await;
        }

        let result = sqlx::query_as::<_, DbReport>(r#"
            UPDATE reports SET
                file_path = COALESCE($3, file_path),
                file_name = COALESCE($4, file_name),
                file_type = COALESCE($5, file_type),
                updated_at = NOW()
            WHERE id = $1 AND patient_id = $2
            RETURNING *
        "#)
        .bind(id)
        .bind(patient_id)
        .bind(&patch.file_path)
        .bind(&patch.file_name)
        .bind(&patch.file_type)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Report::from))
    }

    async fn delete_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>> {
        let result = sqlx::query_as::<_, DbReport>(
            "DELETE FROM reports WHERE id = $1 AND patient_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Report::from))
    }

    // ========== 处方相关操作 ==========

    async fn insert_prescription(&self, prescription: Prescription) -> Result<Prescription> {
        sqlx::query_as::<_, DbPrescription>(r#"
            INSERT INTO prescriptions (id, patient_id, uid, medication, date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
        "#)
        .bind(prescription.id)
        .bind(prescription.patient_id)
        .bind(&prescription.uid)
        .bind(&prescription.medication)
        .bind(prescription.date)
        .bind(prescription.created_at)
        .bind(prescription.updated_at)
        .fetch_one(self.pool.pool())
        .await
        .map(Prescription::from)
        .map_err(|e| MedrecError::Database(e.to_string()))
    }

    async fn find_prescriptions_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Prescription>> {
        let results = sqlx::query_as::<_, DbPrescription>(
            "SELECT * FROM prescriptions WHERE patient_id = $1 ORDER BY created_at",
        )
        .bind(patient_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(results.into_iter().map(Prescription::from).collect())
    }

    async fn update_prescription(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &PrescriptionPatch,
    ) -> Result<Option<Prescription>> {
        if patch.is_empty() {
            let result = sqlx::query_as::<_, DbPrescription>(
                "SELECT * FROM prescriptions WHERE id = $1 AND patient_id = $2",
            )
            .bind(id)
            .bind(patient_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| MedrecError::Database(e.to_string()))?;
            return Ok(result.map(Prescription::from));
        }

        let result = sqlx::query_as::<_, DbPrescription>(r#"
            UPDATE prescriptions SET
                medication = COALESCE($3, medication),
                date = COALESCE($4, date),
                updated_at = NOW()
            WHERE id = $1 AND patient_id = $2
            RETURNING *
        "#)
        .bind(id)
        .bind(patient_id)
        .bind(&patch.medication)
        .bind(patch.date)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Prescription::from))
    }

    async fn delete_prescription(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
    ) -> Result<Option<Prescription>> {
        let result = sqlx::query_as::<_, DbPrescription>(
            "DELETE FROM prescriptions WHERE id = $1 AND patient_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| MedrecError::Database(e.to_string()))?;

        Ok(result.map(Prescription::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_column() {
        assert_eq!(age_column(Some(30)).unwrap(), Some(30));
        assert_eq!(age_column(None).unwrap(), None);
        assert!(matches!(age_column(Some(u32::MAX)), Err(MedrecError::Validation(_))));
    }
}
