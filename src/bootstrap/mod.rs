// file: src/bootstrap/mod.rs
// version: 1.0.0
// guid: 7a3f0c58-92de-41b6-8a07-5e4d2b19c6f0

//! Ordered stage machine for the host bootstrap
//!
//! Each stage declares how its failures are handled: most are fatal and stop
//! the run, a few retry with a delay, and cleanup-style stages log and
//! continue. The driver owns the ordering; stages own the work.

pub mod stages;

use crate::secrets::{SecretSet, Vault};
use crate::session::InstallSession;
use crate::{BootstrapError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// How the driver reacts when a stage returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Stop the run and surface the error
    Fatal,
    /// Retry up to `attempts` times, sleeping `delay` between tries
    Retry { attempts: u32, delay: Duration },
    /// Log the error and keep going
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Skipped,
}

/// State threaded through the stages
pub struct BootstrapContext {
    pub session: InstallSession,
    pub vault: Option<Vault>,
    pub secrets: Option<SecretSet>,
}

impl BootstrapContext {
    pub fn new(session: InstallSession) -> Self {
        Self {
            session,
            vault: None,
            secrets: None,
        }
    }

    pub fn require_vault(&self) -> Result<&Vault> {
        self.vault
            .as_ref()
            .ok_or_else(|| BootstrapError::config("vault has not been initialized"))
    }

    pub fn require_secrets(&self) -> Result<&SecretSet> {
        self.secrets
            .as_ref()
            .ok_or_else(|| BootstrapError::config("secrets have not been generated"))
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::Fatal
    }

    async fn run(&self, context: &mut BootstrapContext) -> Result<StageOutcome>;
}

/// A fatal stage error, annotated with the stage that raised it
#[derive(Debug)]
pub struct StageFailure {
    pub stage: &'static str,
    pub error: BootstrapError,
}

/// Runs the stages in order, applying each stage's retry policy
pub struct BootstrapDriver {
    stages: Vec<Box<dyn Stage>>,
}

impl BootstrapDriver {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// The standard host-bootstrap sequence
    pub fn standard() -> Self {
        Self::new(stages::standard_stages())
    }

    pub async fn run(&self, context: &mut BootstrapContext) -> std::result::Result<(), StageFailure> {
        let total = self.stages.len();
        for (index, stage) in self.stages.iter().enumerate() {
            info!(
                "[{}/{}] {}: {}",
                index + 1,
                total,
                stage.name(),
                stage.description()
            );
            match self.run_stage(stage.as_ref(), context).await {
                Ok(StageOutcome::Completed) => {}
                Ok(StageOutcome::Skipped) => {
                    info!("{}: skipped", stage.name());
                }
                Err(error) => match stage.retry_policy() {
                    RetryPolicy::BestEffort => {
                        warn!("{} failed ({}); continuing", stage.name(), error);
                    }
                    _ => {
                        return Err(StageFailure {
                            stage: stage.name(),
                            error,
                        });
                    }
                },
            }
        }
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        context: &mut BootstrapContext,
    ) -> Result<StageOutcome> {
        let attempts = match stage.retry_policy() {
            RetryPolicy::Retry { attempts, .. } => attempts.max(1),
            _ => 1,
        };
        let delay = match stage.retry_policy() {
            RetryPolicy::Retry { delay, .. } => delay,
            _ => Duration::ZERO,
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match stage.run(context).await {
                Ok(outcome) => return Ok(outcome),
                Err(error) => {
                    if attempt < attempts {
                        warn!(
                            "{} failed (attempt {}/{}): {}; retrying in {:?}",
                            stage.name(),
                            attempt,
                            attempts,
                            error,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(error);
                }
            }
        }
        // attempts >= 1, so an error is always recorded on this path
        Err(last_error
            .unwrap_or_else(|| BootstrapError::config("stage produced no result")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn context() -> BootstrapContext {
        let cli = Cli::parse_from(["medulla-bootstrap"]);
        BootstrapContext::new(InstallSession::from_cli(&cli))
    }

    struct StubStage {
        name: &'static str,
        policy: RetryPolicy,
        fail_times: u32,
        calls: Arc<AtomicU32>,
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Stage for StubStage {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "stub"
        }

        fn retry_policy(&self) -> RetryPolicy {
            self.policy
        }

        async fn run(&self, _context: &mut BootstrapContext) -> Result<StageOutcome> {
            self.log.lock().unwrap().push(self.name);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                Err(BootstrapError::config("stub failure"))
            } else {
                Ok(StageOutcome::Completed)
            }
        }
    }

    fn stub(
        name: &'static str,
        policy: RetryPolicy,
        fail_times: u32,
        log: &Arc<std::sync::Mutex<Vec<&'static str>>>,
    ) -> Box<dyn Stage> {
        Box::new(StubStage {
            name,
            policy,
            fail_times,
            calls: Arc::new(AtomicU32::new(0)),
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver = BootstrapDriver::new(vec![
            stub("first", RetryPolicy::Fatal, 0, &log),
            stub("second", RetryPolicy::Fatal, 0, &log),
            stub("third", RetryPolicy::Fatal, 0, &log),
        ]);
        driver.run(&mut context()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_fatal_stage_stops_the_run() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver = BootstrapDriver::new(vec![
            stub("first", RetryPolicy::Fatal, 0, &log),
            stub("breaks", RetryPolicy::Fatal, 10, &log),
            stub("unreached", RetryPolicy::Fatal, 0, &log),
        ]);
        let failure = driver.run(&mut context()).await.unwrap_err();
        assert_eq!(failure.stage, "breaks");
        assert_eq!(*log.lock().unwrap(), vec!["first", "breaks"]);
    }

    #[tokio::test]
    async fn test_retry_stage_recovers() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::Retry {
            attempts: 3,
            delay: Duration::from_millis(1),
        };
        let driver = BootstrapDriver::new(vec![stub("flaky", policy, 2, &log)]);
        driver.run(&mut context()).await.unwrap();
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_stage_exhausts_and_fails() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::Retry {
            attempts: 2,
            delay: Duration::from_millis(1),
        };
        let driver = BootstrapDriver::new(vec![stub("flaky", policy, 10, &log)]);
        let failure = driver.run(&mut context()).await.unwrap_err();
        assert_eq!(failure.stage, "flaky");
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_best_effort_stage_does_not_stop_the_run() {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let driver = BootstrapDriver::new(vec![
            stub("optional", RetryPolicy::BestEffort, 10, &log),
            stub("after", RetryPolicy::Fatal, 0, &log),
        ]);
        driver.run(&mut context()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["optional", "after"]);
    }
}
