//! Environment orchestration: one discovery task per environment and resource
//! kind, merged into a single inventory once every task has finished.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::resource::{FinderError, ResourceQuery};
use crate::session::{Connector, Session};
use crate::types::{Inventory, Resource, ResourceKind};

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not assume role `{role}`")]
    Credentials {
        role: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Finder(#[from] FinderError),
    #[error("discovery did not finish within {0:?}")]
    TimedOut(Duration),
}

/// A discovery task that did not produce resources.
#[derive(Debug)]
pub struct DiscoveryFailure {
    pub environment: String,
    /// `None` when the environment failed before any kind was queried.
    pub kind: Option<ResourceKind>,
    pub error: DiscoveryError,
}

impl Display for DiscoveryFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{}/{}: {}", self.environment, kind.as_slug(), self.error)?,
            None => write!(f, "{}: {}", self.environment, self.error)?,
        }
        let mut source = std::error::Error::source(&self.error);
        while let Some(cause) = source {
            write!(f, ": {cause}")?;
            source = cause.source();
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("discovery task panicked or was cancelled")]
    Task(#[from] JoinError),
}

#[derive(Debug)]
pub struct ScanOutcome {
    pub inventory: Inventory,
    pub failures: Vec<DiscoveryFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct TaskOutcome {
    environment: String,
    kind: ResourceKind,
    result: Result<Vec<Resource>, DiscoveryError>,
}

pub struct Scanner {
    connector: Arc<dyn Connector>,
    task_timeout: Duration,
}

impl Scanner {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Discovers every configured resource kind in every environment.
    ///
    /// Roles are assumed one environment at a time; discovery tasks run
    /// concurrently across all environments. Task errors are collected rather
    /// than aborting the scan.
    pub async fn scan(&self, config: &Config) -> Result<ScanOutcome, ScanError> {
        let started_at = Utc::now();
        let mut failures = Vec::new();
        let mut tasks = JoinSet::new();

        for env in &config.envs {
            let session = match self.connector.assume(env).await {
                Ok(session) => session,
                Err(source) => {
                    warn!("skipping {}: could not assume {}", env.name, env.role);
                    failures.push(DiscoveryFailure {
                        environment: env.name.clone(),
                        kind: None,
                        error: DiscoveryError::Credentials {
                            role: env.role.clone(),
                            source,
                        },
                    });
                    continue;
                }
            };

            for (kind, query) in config.queries() {
                info!("fetching {} {} resources", env.name, kind.as_slug());
                tasks.spawn(discover(
                    env.name.clone(),
                    kind,
                    query.clone(),
                    Arc::clone(&session),
                    self.task_timeout,
                ));
            }
        }

        let mut inventory = Inventory::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined?;
            match outcome.result {
                Ok(resources) => {
                    debug!(
                        "{} {}: {} resources",
                        outcome.environment,
                        outcome.kind.as_slug(),
                        resources.len()
                    );
                    inventory.extend(&outcome.environment, resources);
                }
                Err(error) => {
                    warn!(
                        "{} {} discovery failed: {error}",
                        outcome.environment,
                        outcome.kind.as_slug()
                    );
                    failures.push(DiscoveryFailure {
                        environment: outcome.environment,
                        kind: Some(outcome.kind),
                        error,
                    });
                }
            }
        }

        Ok(ScanOutcome {
            inventory,
            failures,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

async fn discover(
    environment: String,
    kind: ResourceKind,
    query: ResourceQuery,
    session: Arc<dyn Session>,
    timeout: Duration,
) -> TaskOutcome {
    let work = async {
        let finder = session.finder(kind).await?;
        Ok::<_, FinderError>(finder.find_resources(&query).await?)
    };
    let result = match tokio::time::timeout(timeout, work).await {
        Ok(found) => found.map_err(DiscoveryError::from),
        Err(_) => Err(DiscoveryError::TimedOut(timeout)),
    };
    TaskOutcome {
        environment,
        kind,
        result,
    }
}
