//! Per-request context threaded through every port call.
//!
//! A [`RequestContext`] carries the tenant (project) the request is scoped
//! to, a cancellation token, and an optional deadline. Adapters wrap their
//! I/O in [`RequestContext::run`] so a cancelled or expired request stops
//! waiting on the database, the serving runtime, or the gateway.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Result, WeirError};

#[derive(Debug, Clone)]
pub struct RequestContext {
    project_id: Uuid,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Create a context for `project_id`. The nil UUID is rejected.
    pub fn new(project_id: Uuid) -> Result<Self> {
        if project_id.is_nil() {
            return Err(WeirError::MissingProjectId);
        }
        Ok(Self {
            project_id,
            cancel: CancellationToken::new(),
            deadline: None,
        })
    }

    /// Parse the raw `Project-ID` header value.
    pub fn from_header(value: Option<&str>) -> Result<Self> {
        let raw = value.map(str::trim).filter(|v| !v.is_empty());
        let project_id = raw
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or(WeirError::MissingProjectId)?;
        Self::new(project_id)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail fast if the request is already cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(WeirError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless the request is cancelled or its
    /// deadline passes first.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WeirError::Cancelled),
            _ = expire(self.deadline) => Err(WeirError::Cancelled),
            res = fut => res,
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_project_rejected() {
        assert_eq!(
            RequestContext::new(Uuid::nil()).unwrap_err(),
            WeirError::MissingProjectId
        );
    }

    #[test]
    fn test_from_header() {
        let id = Uuid::new_v4();
        let ctx = RequestContext::from_header(Some(&id.to_string())).unwrap();
        assert_eq!(ctx.project_id(), id);

        assert!(RequestContext::from_header(None).is_err());
        assert!(RequestContext::from_header(Some("  ")).is_err());
        assert!(RequestContext::from_header(Some("not-a-uuid")).is_err());
    }

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_run_cancelled() {
        let ctx = RequestContext::new(Uuid::new_v4()).unwrap();
        ctx.cancellation_token().cancel();
        let res: Result<()> = ctx.run(std::future::pending()).await;
        assert_eq!(res.unwrap_err(), WeirError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_deadline() {
        let ctx = RequestContext::new(Uuid::new_v4())
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let res: Result<()> = ctx.run(std::future::pending()).await;
        assert_eq!(res.unwrap_err(), WeirError::Cancelled);
        assert!(ctx.is_cancelled());
    }
}
