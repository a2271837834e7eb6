use super::ConductorConfig;
use crate::Result;
use anyhow::bail;
use conductor_backend::BackendKind;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &ConductorConfig) -> Result<()> {
        if config.engine.worker_pool_size == 0 {
            bail!("engine.worker_pool_size must be >= 1");
        }
        if config.engine.default_task_timeout_secs == 0 {
            bail!("engine.default_task_timeout_secs must be >= 1");
        }

        let retry = &config.retry;
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            bail!("retry.multiplier must be a finite number >= 1.0");
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            bail!("retry.max_delay_ms must be >= retry.base_delay_ms");
        }

        let persistence = &config.persistence;
        if persistence.kind == BackendKind::Sqlite {
            if !persistence.url.starts_with("sqlite:") {
                bail!("persistence.url must start with 'sqlite:' for the sqlite backend");
            }
            if persistence.max_connections == 0 {
                bail!("persistence.max_connections must be >= 1");
            }
        }

        Ok(())
    }
}
