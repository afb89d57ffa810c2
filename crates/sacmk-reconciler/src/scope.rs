use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CancelReason;

/// The lifecycle operation a remote call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Read,
    Delete,
    Import,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Read => "read",
            Operation::Delete => "delete",
            Operation::Import => "import",
        };
        write!(f, "{}", s)
    }
}

/// Upper bound on how long each operation may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

impl Timeouts {
    /// Import is a read.
    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::Read | Operation::Import => self.read,
            Operation::Delete => self.delete,
        }
    }
}

/// Trips every [`OperationScope`] created alongside it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal plus optional deadline handed to every controller
/// operation.
///
/// Remote calls go through [`OperationScope::run`]; once the scope is
/// cancelled or past its deadline, `run` refuses to start new work.
#[derive(Debug, Clone)]
pub struct OperationScope {
    cancel: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl OperationScope {
    pub fn new() -> (CancelHandle, OperationScope) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            OperationScope {
                cancel: rx,
                deadline: None,
            },
        )
    }

    /// A scope nobody can cancel. Deadlines still apply once added.
    pub fn detached() -> OperationScope {
        let (_handle, scope) = Self::new();
        scope
    }

    /// Narrow the deadline to at most `timeout` from now. An earlier
    /// existing deadline wins.
    pub fn with_timeout(&self, timeout: Duration) -> OperationScope {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        OperationScope {
            cancel: self.cancel.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn check(&self) -> Result<(), CancelReason> {
        if self.is_cancelled() {
            return Err(CancelReason::Requested);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(CancelReason::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` unless the scope is already done, dropping it as soon as
    /// cancellation or the deadline fires.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, CancelReason>
    where
        F: Future<Output = T>,
    {
        self.check()?;

        let mut rx = self.cancel.clone();
        let deadline = self.deadline;

        tokio::select! {
            biased;
            _ = cancelled(&mut rx) => Err(CancelReason::Requested),
            _ = expired(deadline) => Err(CancelReason::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let tripped = rx.wait_for(|c| *c).await.is_ok();
    if !tripped {
        // Handle dropped without cancelling: this scope can no longer be cancelled.
        std::future::pending::<()>().await;
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}
