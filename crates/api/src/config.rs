//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;
use chrono::Duration;
use tracing::warn;

use clinicflow_infra::{PostgresConfig, WorkflowConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub workflow: WorkflowConfig,
    /// Durable store; `None` keeps all state in process memory.
    pub database: Option<PostgresConfig>,
}

impl ApiConfig {
    /// Default workflow settings with the given secret, bound to an ephemeral local port.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            workflow: WorkflowConfig::default(),
            database: None,
        }
    }

    /// Reads `CLINICFLOW_BIND_ADDR`, `JWT_SECRET`, `CLINICFLOW_INVOICE_GUARD_SECS`,
    /// `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_addr = lookup("CLINICFLOW_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("CLINICFLOW_BIND_ADDR must be a socket address")?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let mut workflow = WorkflowConfig::default();
        if let Some(secs) = lookup("CLINICFLOW_INVOICE_GUARD_SECS") {
            let secs: i64 = secs
                .trim()
                .parse()
                .context("CLINICFLOW_INVOICE_GUARD_SECS must be a whole number of seconds")?;
            workflow = workflow.with_invoice_guard_window(Duration::seconds(secs));
        }

        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => {
                let mut postgres = PostgresConfig::new(url.trim());
                if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
                    postgres.max_connections = max
                        .trim()
                        .parse()
                        .context("DATABASE_MAX_CONNECTIONS must be a positive whole number")?;
                }
                Some(postgres)
            }
            None => None,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            workflow,
            database,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.jwt_secret, "dev-secret");
        assert_eq!(config.workflow.invoice_guard_window, Duration::seconds(120));
        assert!(config.database.is_none());
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://clinic@localhost/clinic"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        let postgres = config.database.unwrap();
        assert_eq!(postgres.database_url, "postgres://clinic@localhost/clinic");
        assert_eq!(postgres.max_connections, 4);

        let blank = ApiConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap();
        assert!(blank.database.is_none());
    }

    #[test]
    fn overrides_are_read() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("CLINICFLOW_BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("CLINICFLOW_INVOICE_GUARD_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.workflow.invoice_guard_window, Duration::seconds(5));
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(ApiConfig::from_lookup(lookup(&[("CLINICFLOW_BIND_ADDR", "nowhere")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[("CLINICFLOW_INVOICE_GUARD_SECS", "soon")])).is_err());
        assert!(ApiConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/clinic"),
            ("DATABASE_MAX_CONNECTIONS", "many"),
        ]))
        .is_err());
    }
}
