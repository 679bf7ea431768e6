//! 应用共享状态

use medrec_database::DocumentStore;
use medrec_storage::{ContentStore, UploadPolicy};
use std::sync::Arc;

use crate::auth::TokenService;
use crate::policy::AccessPolicy;

/// 所有处理器共享的状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub content: Arc<ContentStore>,
    pub tokens: Arc<TokenService>,
    pub access_policy: Arc<AccessPolicy>,
    pub upload_policy: UploadPolicy,
    /// 患者路由是否同样要求令牌
    pub protect_patient_routes: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        content: ContentStore,
        tokens: TokenService,
        upload_policy: UploadPolicy,
    ) -> Self {
        Self {
            store,
            content: Arc::new(content),
            tokens: Arc::new(tokens),
            access_policy: Arc::new(AccessPolicy::any_authenticated()),
            upload_policy,
            protect_patient_routes: false,
        }
    }

    pub fn with_access_policy(mut self, policy: AccessPolicy) -> Self {
        self.access_policy = Arc::new(policy);
        self
    }

    pub fn with_protected_patient_routes(mut self, protect: bool) -> Self {
        self.protect_patient_routes = protect;
        self
    }
}
