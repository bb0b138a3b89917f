use std::sync::Arc;

use tracing::warn;

use crate::{
    auth::AuthService,
    config::Config,
    db::{RecordStore, memory::MemoryStore, postgres::PgStore, seed_tags},
    images::{ImageHost, ImgbbClient},
    mail::{Mailer, SmtpMailer},
};

/// Shared handles to the external collaborators, plus the auth service.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub auth: AuthService,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageHost>,
}

impl AppState {
    pub async fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn RecordStore> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                warn!("DATABASE_URL not set, records will not survive a restart");
                Arc::new(MemoryStore::new())
            }
        };

        seed_tags(store.as_ref(), &config.seed_codes)
            .await
            .map_err(|e| anyhow::anyhow!("failed to seed tags: {e}"))?;

        let mailer = Arc::new(SmtpMailer::new(&config.smtp)?);
        let images = Arc::new(ImgbbClient::new(
            config.imgbb_endpoint.clone(),
            config.imgbb_key.clone(),
        ));

        Ok(Self::assemble(store, mailer, images, &config.jwt_secret))
    }

    /// Wires a state from pre-built collaborators. The test suite uses this
    /// with the memory store and recording doubles.
    pub fn assemble(
        store: Arc<dyn RecordStore>,
        mailer: Arc<dyn Mailer>,
        images: Arc<dyn ImageHost>,
        jwt_secret: &str,
    ) -> Arc<Self> {
        Arc::new(Self {
            auth: AuthService::new(store.clone(), jwt_secret),
            store,
            mailer,
            images,
        })
    }
}
