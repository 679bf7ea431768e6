//! 文档存储接口

use async_trait::async_trait;
use medrec_core::{
    Patient, PatientPatch, Prescription, PrescriptionPatch, Report, ReportPatch, Result,
};
use uuid::Uuid;

/// 文档存储
///
/// 所有按记录ID的操作都同时匹配所属患者的内部ID，防止跨患者篡改。
/// 存储本身不维护引用完整性，由调用方在插入前确认患者存在。
#[async_trait]
pub trait DocumentStore: Send + Sync {
    // ========== 患者 ==========

    /// 插入新患者，`uid` 重复时返回 `Conflict`
    async fn insert_patient(&self, patient: Patient) -> Result<Patient>;

    async fn find_patient_by_uid(&self, uid: &str) -> Result<Option<Patient>>;

    /// 按UID合并更新，返回更新后的记录
    async fn update_patient_by_uid(&self, uid: &str, patch: &PatientPatch)
        -> Result<Option<Patient>>;

    /// 按内部ID删除，返回被删除的记录
    async fn delete_patient_by_id(&self, id: &Uuid) -> Result<Option<Patient>>;

    // ========== 报告 ==========

    async fn insert_report(&self, report: Report) -> Result<Report>;

    async fn find_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>>;

    /// 按创建时间升序返回
    async fn find_reports_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Report>>;

    async fn update_report(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<Report>>;

    async fn delete_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>>;

    // ========== 处方 ==========

    async fn insert_prescription(&self, prescription: Prescription) -> Result<Prescription>;

    async fn find_prescriptions_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Prescription>>;

    async fn update_prescription(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &PrescriptionPatch,
    ) -> Result<Option<Prescription>>;

    async fn delete_prescription(&self, id: &Uuid, patient_id: &Uuid)
        -> Result<Option<Prescription>>;
}
