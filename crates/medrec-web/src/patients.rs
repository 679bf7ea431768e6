//! 患者档案处理器

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use medrec_core::{utils::parse_record_id, MedrecError, NewPatient, Patient, PatientPatch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// UID验证请求
#[derive(Debug, Deserialize)]
pub struct VerifyUidRequest {
    #[serde(default)]
    pub uid: String,
}

/// UID验证响应
#[derive(Debug, Serialize)]
pub struct VerifyUidResponse {
    pub token: String,
    pub role: String,
    pub uid: String,
}

/// 将JSON解析失败统一为 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError(MedrecError::Validation(rejection.body_text())))
}

fn patient_not_found() -> MedrecError {
    MedrecError::NotFound("Patient not found".to_string())
}

/// POST /api/patients
pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<NewPatient>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Patient>)> {
    let new_patient = json_body(payload)?;
    new_patient.validate()?;

    let patient = state
        .store
        .insert_patient(new_patient.into_patient())
        .await
        .inspect_err(|e| warn!("Error adding patient: {}", e))?;

    info!("New patient added: {}", patient.uid);
    Ok((StatusCode::CREATED, Json(patient)))
}

/// GET /api/patients/:uid
pub async fn get_patient(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Patient>> {
    let patient = state
        .store
        .find_patient_by_uid(&uid)
        .await?
        .ok_or_else(patient_not_found)?;

    Ok(Json(patient))
}

/// PUT /api/patients/:uid
///
/// 只更新请求中出现的字段。
pub async fn update_patient(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    payload: Result<Json<PatientPatch>, JsonRejection>,
) -> ApiResult<Json<Patient>> {
    let patch = json_body(payload)?;

    let patient = state
        .store
        .update_patient_by_uid(&uid, &patch)
        .await?
        .ok_or_else(|| {
            warn!("Patient not found for update by UID: {}", uid);
            patient_not_found()
        })?;

    info!("Patient updated: {}", uid);
    Ok(Json(patient))
}

/// DELETE /api/patients/:id
///
/// 按内部ID删除；关联的报告与处方不会被级联删除。
pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let Some(patient_id) = parse_record_id(&id) else {
        warn!("Patient delete with malformed id: {}", id);
        return Err(patient_not_found().into());
    };

    let patient = state
        .store
        .delete_patient_by_id(&patient_id)
        .await?
        .ok_or_else(patient_not_found)?;

    info!("Patient deleted: {} ({})", patient.uid, patient.id);
    Ok(Json(json!({ "message": "Patient deleted successfully" })))
}

/// POST /api/patients/verify-uid
///
/// 公开接口：UID存在时签发短期令牌。
pub async fn verify_uid(
    State(state): State<AppState>,
    payload: Result<Json<VerifyUidRequest>, JsonRejection>,
) -> ApiResult<Json<VerifyUidResponse>> {
    let request = json_body(payload)?;

    let patient = state
        .store
        .find_patient_by_uid(request.uid.trim())
        .await?
        .ok_or_else(|| {
            warn!("UID verification failed: UID {} not found", request.uid);
            MedrecError::NotFound("UID not found".to_string())
        })?;

    let issued = state.tokens.issue(&Identity {
        id: patient.id.to_string(),
        role: patient.role.clone(),
    })?;

    info!("UID verified: {} (token expires at {})", patient.uid, issued.expires_at);
    Ok(Json(VerifyUidResponse {
        token: issued.token,
        role: patient.role,
        uid: patient.uid,
    }))
}
