//! In-process state backend.
//!
//! Used when no state file is configured: the busy lock and high-water
//! marks hold for the lifetime of the process only.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::backend::StateBackend;
use super::RunState;
use crate::error::Result;

/// State backend that keeps the last saved state in memory.
#[derive(Default)]
pub struct MemoryStateBackend {
    state: Mutex<Option<RunState>>,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn load(&self, config_hash: &str) -> Result<Option<RunState>> {
        let guard = self.state.lock().await;
        match guard.as_ref() {
            Some(state) => {
                state.validate_config(config_hash)?;
                Ok(Some(state.clone()))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &RunState) -> Result<()> {
        debug!("Saving run state {} in memory", state.run_id);
        *self.state.lock().await = Some(state.clone());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::Value;

    #[tokio::test]
    async fn test_keeps_last_saved_state() {
        let backend = MemoryStateBackend::new();
        assert!(backend.load("hash").await.unwrap().is_none());

        let mut state = RunState::new("run".into(), "hash".into());
        state.set_high_water("d6_url_alias", Value::Int(3));
        backend.save(&state).await.unwrap();

        let loaded = backend.load("hash").await.unwrap().unwrap();
        assert_eq!(loaded.high_water("d6_url_alias"), Some(&Value::Int(3)));
        assert!(backend.load("other").await.is_err());
    }
}
