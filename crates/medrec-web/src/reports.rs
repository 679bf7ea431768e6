//! 报告上传与管理
//!
//! 文件写入与记录写入不在同一事务中：记录写入失败时删除刚写入的文件，
//! 记录删除后文件删除失败则只记录告警，留待人工清理。

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use medrec_core::{
    utils::parse_record_id, MedrecError, NewReport, Patient, Report, ReportPatch, Result,
};
use medrec_database::DocumentStore;
use medrec_storage::{mime_essence, ContentStore, UploadPolicy};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// 文件字段名
pub const REPORT_FIELD: &str = "report";
/// UID字段名
pub const UID_FIELD: &str = "uid";

/// 已通过校验的上传文件
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// 解析后的表单
#[derive(Debug, Default)]
pub struct UploadForm {
    pub uid: Option<String>,
    pub file: Option<UploadedFile>,
}

fn malformed(err: MultipartError) -> MedrecError {
    MedrecError::Validation(format!("Malformed upload: {}", err.body_text()))
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| mime_essence(value) == "multipart/form-data")
}

/// 读取表单并在任何持久化之前校验文件
///
/// 非 multipart 请求视为空表单；声明为 multipart 但无法解析时返回 400。
pub async fn read_upload_form(
    headers: &HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
    policy: &UploadPolicy,
) -> Result<UploadForm> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(_) if !is_multipart(headers) => return Ok(UploadForm::default()),
        Err(rejection) => return Err(MedrecError::Validation(rejection.body_text())),
    };
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(REPORT_FIELD) => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type =
                    mime_essence(field.content_type().unwrap_or("application/octet-stream"));
                let data = field.bytes().await.map_err(malformed)?;

                // 浏览器在未选择文件时也会提交空的文件字段
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }

                policy
                    .validate(&file_name, &content_type, data.len() as u64)
                    .inspect_err(|e| warn!("Rejected upload {}: {}", file_name, e))?;

                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            Some(UID_FIELD) => {
                form.uid = Some(field.text().await.map_err(malformed)?.trim().to_string());
            }
            _ => {}
        }
    }

    Ok(form)
}

/// 报告服务：患者解析、文件写入与记录维护
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn DocumentStore>,
    content: Arc<ContentStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn DocumentStore>, content: Arc<ContentStore>) -> Self {
        Self { store, content }
    }

    async fn resolve_patient(&self, uid: &str) -> Result<Patient> {
        self.store.find_patient_by_uid(uid).await?.ok_or_else(|| {
            warn!("Patient not found for UID: {}", uid);
            MedrecError::NotFound("Patient not found".to_string())
        })
    }

    fn report_id(&self, uid: &str, id: &str) -> Result<Uuid> {
        parse_record_id(id).ok_or_else(|| report_not_found(uid))
    }

    /// 删除已不被任何记录引用的文件，失败只记录
    async fn discard(&self, file_path: &str) {
        if let Err(e) = self.content.remove_file(file_path).await {
            warn!("Failed to remove orphaned file {}: {}", file_path, e);
        }
    }

    /// 上传新报告
    pub async fn create(&self, uid: Option<&str>, file: Option<UploadedFile>) -> Result<Report> {
        let file = file.ok_or_else(|| {
            warn!("No file uploaded");
            MedrecError::Validation("No file uploaded".to_string())
        })?;
        let uid = uid.unwrap_or_default();
        let patient = self.resolve_patient(uid).await?;

        let file_path = self.content.store_file(&file.data).await?;
        let new_report = NewReport {
            patient_id: patient.id,
            file_path: file_path.clone(),
            file_name: file.file_name,
            file_type: file.content_type,
        };

        match self.store.insert_report(new_report.into_report()).await {
            Ok(report) => {
                info!("New report uploaded for patient UID: {}", uid);
                Ok(report)
            }
            Err(e) => {
                error!("Error saving report for UID {}: {}", uid, e);
                self.discard(&file_path).await;
                Err(e)
            }
        }
    }

    /// 更新报告；未提供新文件时不修改任何字段
    pub async fn update(&self, uid: &str, id: &str, file: Option<UploadedFile>) -> Result<Report> {
        let patient = self.resolve_patient(uid).await?;
        let report_id = self.report_id(uid, id)?;

        let existing = self
            .store
            .find_report(&report_id, &patient.id)
            .await?
            .ok_or_else(|| report_not_found(uid))?;

        let Some(file) = file else {
            info!("Report {} for UID {} left unchanged (no file supplied)", report_id, uid);
            return Ok(existing);
        };

        let new_path = self.content.store_file(&file.data).await?;
        let patch = ReportPatch {
            file_path: Some(new_path.clone()),
            file_name: Some(file.file_name),
            file_type: Some(file.content_type),
        };

        match self.store.update_report(&report_id, &patient.id, &patch).await {
            Ok(Some(report)) => {
                self.discard(&existing.file_path).await;
                info!("Report updated successfully for UID: {}", uid);
                Ok(report)
            }
            Ok(None) => {
                self.discard(&new_path).await;
                Err(report_not_found(uid))
            }
            Err(e) => {
                error!("Error updating report for UID {}: {}", uid, e);
                self.discard(&new_path).await;
                Err(e)
            }
        }
    }

    /// 删除报告记录及其文件
    pub async fn delete(&self, uid: &str, id: &str) -> Result<Report> {
        let patient = self.resolve_patient(uid).await?;
        let report_id = self.report_id(uid, id)?;

        let report = self
            .store
            .delete_report(&report_id, &patient.id)
            .await?
            .ok_or_else(|| report_not_found(uid))?;

        if let Err(e) = self.content.remove_file(&report.file_path).await {
            warn!(
                "Report {} deleted but file {} could not be removed, needs manual cleanup: {}",
                report.id, report.file_path, e
            );
        }

        info!("Report deleted successfully for UID: {}", uid);
        Ok(report)
    }

    /// 列出患者的全部报告，没有报告时返回未找到
    pub async fn list(&self, uid: &str) -> Result<Vec<Report>> {
        let patient = self.resolve_patient(uid).await?;
        let reports = self.store.find_reports_by_patient(&patient.id).await?;

        if reports.is_empty() {
            warn!("No reports found for UID: {}", uid);
            return Err(MedrecError::NotFound("No reports found".to_string()));
        }

        info!("Fetched {} reports for UID: {}", reports.len(), uid);
        Ok(reports)
    }

    /// 读取报告文件内容
    pub async fn download(&self, uid: &str, id: &str) -> Result<(Report, Vec<u8>)> {
        let patient = self.resolve_patient(uid).await?;
        let report_id = self.report_id(uid, id)?;

        let report = self
            .store
            .find_report(&report_id, &patient.id)
            .await?
            .ok_or_else(|| report_not_found(uid))?;

        let data = self.content.get_file(&report.file_path).await.map_err(|e| match e {
            MedrecError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                warn!("File for report {} is missing: {}", report.id, report.file_path);
                MedrecError::NotFound("Report file not found".to_string())
            }
            other => other,
        })?;

        Ok((report, data))
    }
}

fn report_not_found(uid: &str) -> MedrecError {
    warn!("Report not found for UID: {}", uid);
    MedrecError::NotFound("Report not found".to_string())
}

/// `Content-Disposition` 中使用的安全文件名
fn disposition_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn service(state: &AppState) -> ReportService {
    ReportService::new(state.store.clone(), state.content.clone())
}

/// POST /api/reports/by-uid
pub async fn upload_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    let form = read_upload_form(&headers, multipart, &state.upload_policy).await?;
    let report = service(&state).create(form.uid.as_deref(), form.file).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// PUT /api/reports/by-uid/:uid/:id
pub async fn update_report(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Report>> {
    let form = read_upload_form(&headers, multipart, &state.upload_policy).await?;
    let report = service(&state).update(&uid, &id, form.file).await?;
    Ok(Json(report))
}

/// DELETE /api/reports/by-uid/:uid/:id
pub async fn delete_report(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<Json<Value>> {
    service(&state).delete(&uid, &id).await?;
    Ok(Json(json!({ "message": "Report deleted successfully" })))
}

/// GET /api/reports/by-uid/:uid
pub async fn list_reports(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(service(&state).list(&uid).await?))
}

/// GET /api/reports/by-uid/:uid/:id/file
pub async fn download_report(
    State(state): State<AppState>,
    Path((uid, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let (report, data) = service(&state).download(&uid, &id).await?;

    let headers = [
        (header::CONTENT_TYPE, report.file_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", disposition_name(&report.file_name)),
        ),
    ];
    Ok((headers, data))
}
