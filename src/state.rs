use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    analysis::{HttpImageAnalyzer, ImageAnalyzer},
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    mailer::{HttpMailer, Mailer},
    sms::{HttpSmsSender, SmsSender},
    storage::ObjectStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared handles for every handler invocation. Provider clients are absent
/// when their credentials are not configured; handlers skip those steps
/// with a warning instead of failing.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub sms: Option<Arc<dyn SmsSender>>,
    pub analyzer: Option<Arc<dyn ImageAnalyzer>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer: None,
            sms: None,
            analyzer: None,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_sms(mut self, sms: Arc<dyn SmsSender>) -> Self {
        self.sms = Some(sms);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn ImageAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Attaches the HTTP provider clients for every credential present in
    /// the configuration.
    pub fn with_configured_providers(mut self) -> Self {
        let config = self.config.clone();
        if let Some(api_key) = &config.email_api_key {
            self.mailer = Some(Arc::new(HttpMailer::new(
                &config.email_endpoint,
                api_key,
                &config.email_from_address,
            )));
        }
        if let Some(api_key) = &config.sms_api_key {
            self.sms = Some(Arc::new(HttpSmsSender::new(&config.sms_endpoint, api_key)));
        }
        if let (Some(api_user), Some(api_secret)) =
            (&config.analysis_api_user, &config.analysis_api_secret)
        {
            self.analyzer = Some(Arc::new(HttpImageAnalyzer::new(
                &config.analysis_endpoint,
                api_user,
                api_secret,
            )));
        }
        self
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
