//! 处方处理器

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use medrec_core::{
    utils::parse_record_id, MedrecError, NewPrescription, Patient, Prescription,
    PrescriptionPatch, Result,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::patients::json_body;
use crate::state::AppState;

/// 新建处方请求
#[derive(Debug, Deserialize)]
pub struct NewPrescriptionRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub medication: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

async fn resolve_patient(state: &AppState, uid: &str) -> Result<Patient> {
    state.store.find_patient_by_uid(uid).await?.ok_or_else(|| {
        warn!("Patient not found for UID: {}", uid);
        MedrecError::NotFound("Patient not found".to_string())
    })
}

fn prescription_id(uid: &str, id: &str) -> Result<Uuid> {
    parse_record_id(id).ok_or_else(|| prescription_not_found(uid))
}

fn prescription_not_found(uid: &str) -> MedrecError {
    warn!("Prescription not found for UID: {}", uid);
    MedrecError::NotFound("Prescription not found".to_string())
}

/// POST /api/prescriptions/by-uid
pub async fn create_prescription(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewPrescriptionRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Prescription>)> {
    let request = json_body(payload)?;
    let patient = resolve_patient(&state, request.uid.trim()).await?;

    let medication = request.medication.trim();
    if medication.is_empty() {
        return Err(MedrecError::Validation("Medication is required".to_string()).into());
    }
    let date = request
        .date
        .ok_or_else(|| MedrecError::Validation("Prescription date is required".to_string()))?;

    let prescription = state
        .store
        .insert_prescription(
            NewPrescription {
                patient_id: patient.id,
                uid: patient.uid.clone(),
                medication: medication.to_string(),
                date,
            }
            .into_prescription(),
        )
        .await?;

    info!("New prescription added for patient UID: {}", patient.uid);
    Ok((StatusCode::CREATED, Json(prescription)))
}

/// GET /api/prescriptions/by-uid/:uid
///
/// 与报告列表一致：没有处方时返回 404。
pub async fn list_prescriptions(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Vec<Prescription>>> {
    let patient = resolve_patient(&state, &uid).await?;
    let prescriptions = state.store.find_prescriptions_by_patient(&patient.id).await?;

    if prescriptions.is_empty() {
        warn!("No prescriptions found for UID: {}", uid);
        return Err(MedrecError::NotFound("No prescriptions found".to_string()).into());
    }

    info!("Fetched {} prescriptions for UID: {}", prescriptions.len(), uid);
    Ok(Json(prescriptions))
}

/// PUT /api/prescriptions/by-uid/:uid/:id
pub async fn update_prescription(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
    payload: std::result::Result<Json<PrescriptionPatch>, JsonRejection>,
) -> ApiResult<Json<Prescription>> {
    let mut patch = json_body(payload)?;
    if let Some(medication) = patch.medication.take() {
        let medication = medication.trim().to_string();
        if medication.is_empty() {
            return Err(MedrecError::Validation("Medication is required".to_string()).into());
        }
        patch.medication = Some(medication);
    }

    let patient = resolve_patient(&state, &uid).await?;
    let prescription_id = prescription_id(&uid, &id)?;

    let prescription = state
        .store
        .update_prescription(&prescription_id, &patient.id, &patch)
        .await?
        .ok_or_else(|| prescription_not_found(&uid))?;

    info!("Prescription updated successfully for UID: {}", uid);
    Ok(Json(prescription))
}

/// DELETE /api/prescriptions/by-uid/:uid/:id
pub async fn delete_prescription(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    let patient = resolve_patient(&state, &uid).await?;
    let prescription_id = prescription_id(&uid, &id)?;

    state
        .store
        .delete_prescription(&prescription_id, &patient.id)
        .await?
        .ok_or_else(|| prescription_not_found(&uid))?;

    info!("Prescription deleted successfully for UID: {}", uid);
    Ok(Json(json!({ "message": "Prescription deleted successfully" })))
}
