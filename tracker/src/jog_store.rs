use async_trait::async_trait;
use justrun_data_management::DataManager;
use justrun_lib::jog::{Jog, NewJog};

/// Where finished runs go.
#[async_trait]
pub trait JogStore: Send + Sync {
    async fn save_jog(&self, jog: NewJog) -> anyhow::Result<Jog>;
}

/// Saves jogs for one user into the local database.
#[derive(Clone)]
pub struct LocalJogStore {
    data_manager: DataManager,
    user_id: String,
}

impl LocalJogStore {
    pub fn new(data_manager: DataManager, user_id: impl Into<String>) -> Self {
        Self {
            data_manager,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

#[async_trait]
impl JogStore for LocalJogStore {
    async fn save_jog(&self, jog: NewJog) -> anyhow::Result<Jog> {
        Ok(self.data_manager.save_jog(&self.user_id, jog).await?)
    }
}
