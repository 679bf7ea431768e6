//! 内存文档存储

use async_trait::async_trait;
use medrec_core::{
    MedrecError, Patient, PatientPatch, Prescription, PrescriptionPatch, Report, ReportPatch,
    Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::store::DocumentStore;

/// 基于 `RwLock<HashMap>` 的内存存储，进程退出即丢失
#[derive(Clone, Default)]
pub struct MemoryStore {
    patients: Arc<RwLock<HashMap<Uuid, Patient>>>,
    reports: Arc<RwLock<HashMap<Uuid, Report>>>,
    prescriptions: Arc<RwLock<HashMap<Uuid, Prescription>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_patient(&self, patient: Patient) -> Result<Patient> {
        let mut patients = self.patients.write().await;
        if patients.values().any(|p| p.uid == patient.uid) {
            return Err(MedrecError::Conflict(format!(
                "Patient with uid {} already exists",
                patient.uid
            )));
        }
        patients.insert(patient.id, patient.clone());
        debug!("Inserted patient {} into memory store", patient.id);
        Ok(patient)
    }

    async fn find_patient_by_uid(&self, uid: &str) -> Result<Option<Patient>> {
        let patients = self.patients.read().await;
        Ok(patients.values().find(|p| p.uid == uid).cloned())
    }

    async fn update_patient_by_uid(
        &self,
        uid: &str,
        patch: &PatientPatch,
    ) -> Result<Option<Patient>> {
        let mut patients = self.patients.write().await;
        Ok(patients.values_mut().find(|p| p.uid == uid).map(|patient| {
            patch.apply(patient);
            patient.clone()
        }))
    }

    async fn delete_patient_by_id(&self, id: &Uuid) -> Result<Option<Patient>> {
        Ok(self.patients.write().await.remove(id))
    }

    async fn insert_report(&self, report: Report) -> Result<Report> {
        self.reports.write().await.insert(report.id, report.clone());
        Ok(report)
    }

    async fn find_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>> {
        let reports = self.reports.read().await;
        Ok(reports
            .get(id)
            .filter(|r| &r.patient_id == patient_id)
            .cloned())
    }

    async fn find_reports_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Report>> {
        let reports = self.reports.read().await;
        let mut found: Vec<Report> = reports
            .values()
            .filter(|r| &r.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn update_report(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &ReportPatch,
    ) -> Result<Option<Report>> {
        let mut reports = self.reports.write().await;
        Ok(reports
            .get_mut(id)
            .filter(|r| &r.patient_id == patient_id)
            .map(|report| {
                patch.apply(report);
                report.clone()
            }))
    }

    async fn delete_report(&self, id: &Uuid, patient_id: &Uuid) -> Result<Option<Report>> {
        let mut reports = self.reports.write().await;
        let owned = reports.get(id).is_some_and(|r| &r.patient_id == patient_id);
        Ok(if owned { reports.remove(id) } else { None })
    }

    async fn insert_prescription(&self, prescription: Prescription) -> Result<Prescription> {
        self.prescriptions
            .write()
            .await
            .insert(prescription.id, prescription.clone());
        Ok(prescription)
    }

    async fn find_prescriptions_by_patient(&self, patient_id: &Uuid) -> Result<Vec<Prescription>> {
        let prescriptions = self.prescriptions.read().await;
        let mut found: Vec<Prescription> = prescriptions
            .values()
            .filter(|p| &p.patient_id == patient_id)
            .cloned()
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update_prescription(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
        patch: &PrescriptionPatch,
    ) -> Result<Option<Prescription>> {
        let mut prescriptions = self.prescriptions.write().await;
        Ok(prescriptions
            .get_mut(id)
            .filter(|p| &p.patient_id == patient_id)
            .map(|prescription| {
                patch.apply(prescription);
                prescription.clone()
            }))
    }

    async fn delete_prescription(
        &self,
        id: &Uuid,
        patient_id: &Uuid,
    ) -> Result<Option<Prescription>> {
        let mut prescriptions = self.prescriptions.write().await;
        let owned = prescriptions
            .get(id)
            .is_some_and(|p| &p.patient_id == patient_id);
        Ok(if owned { prescriptions.remove(id) } else { None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrec_core::{NewPatient, NewReport};

    fn new_patient(uid: &str) -> Patient {
        NewPatient {
            uid: uid.to_string(),
            name: "Alice".to_string(),
            ..Default::default()
        }
        .into_patient()
    }

    fn new_report(patient_id: Uuid) -> Report {
        NewReport {
            patient_id,
            file_path: "uploads/0123".to_string(),
            file_name: "x.pdf".to_string(),
            file_type: "application/pdf".to_string(),
        }
        .into_report()
    }

    #[tokio::test]
    async fn test_duplicate_uid_conflicts() {
        let store = MemoryStore::new();
        store.insert_patient(new_patient("P1")).await.unwrap();

        let result = store.insert_patient(new_patient("P1")).await;
        assert!(matches!(result, Err(MedrecError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_patient_merges_fields() {
        let store = MemoryStore::new();
        store.insert_patient(new_patient("P1")).await.unwrap();

        let patch = PatientPatch {
            gender: Some("Female".to_string()),
            ..Default::default()
        };
        let updated = store.update_patient_by_uid("P1", &patch).await.unwrap().unwrap();
        assert_eq!(updated.gender.as_deref(), Some("Female"));
        assert_eq!(updated.name, "Alice");

        let missing = store.update_patient_by_uid("nobody", &patch).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_report_access_requires_owning_patient() {
        let store = MemoryStore::new();
        let owner = store.insert_patient(new_patient("P1")).await.unwrap();
        let other = store.insert_patient(new_patient("P2")).await.unwrap();
        let report = store.insert_report(new_report(owner.id)).await.unwrap();

        assert!(store.find_report(&report.id, &other.id).await.unwrap().is_none());
        assert!(store.delete_report(&report.id, &other.id).await.unwrap().is_none());
        assert!(store
            .update_report(&report.id, &other.id, &ReportPatch::default())
            .await
            .unwrap()
            .is_none());

        let deleted = store.delete_report(&report.id, &owner.id).await.unwrap();
        assert_eq!(deleted.map(|r| r.id), Some(report.id));
        assert!(store.find_reports_by_patient(&owner.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patient_delete_does_not_cascade() {
        let store = MemoryStore::new();
        let patient = store.insert_patient(new_patient("P1")).await.unwrap();
        store.insert_report(new_report(patient.id)).await.unwrap();

        assert!(store.delete_patient_by_id(&patient.id).await.unwrap().is_some());
        assert_eq!(store.find_reports_by_patient(&patient.id).await.unwrap().len(), 1);
    }
}
