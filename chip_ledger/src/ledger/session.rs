//! Units of work.
//!
//! A [`Session`] wraps one store transaction and the row locks it holds.
//! Ledger operations take `Option<&mut Session>`: with a session they join the
//! caller's unit of work and leave commit/discard to the caller; without one
//! they open an implicit session that commits on success and discards on
//! error. [`WorkingSet`] is the one code path for both.
//!
//! An operation that fails inside a caller's session may already have staged
//! part of its writes, so the session is poisoned: further operations and
//! `commit` are refused, and the only way out is `discard`.

use super::errors::{LedgerError, LedgerResult};
use crate::store::LedgerStore;
use std::sync::Arc;
use uuid::Uuid;

/// Open unit of work
pub struct Session<S: LedgerStore> {
    id: Uuid,
    tx: Option<S::Tx>,
    /// Error of the operation that left the session unusable
    poisoned: Option<String>,
}

impl<S: LedgerStore> Session<S> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session can still be used
    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    /// Whether a failed operation left partial writes in the session
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    fn poison(&mut self, err: &LedgerError) {
        if self.poisoned.is_none() {
            log::debug!("Session {} poisoned: {}", self.id, err);
            self.poisoned = Some(err.to_string());
        }
    }

    fn usable(&self) -> LedgerResult<()> {
        match &self.poisoned {
            Some(cause) => Err(LedgerError::SessionFailure(format!(
                "session {} aborted by failed operation: {cause}",
                self.id
            ))),
            None if !self.is_open() => Err(LedgerError::SessionFailure(format!(
                "session {} already finished",
                self.id
            ))),
            None => Ok(()),
        }
    }

    /// Store transaction of an open session
    pub(crate) fn tx(&mut self) -> LedgerResult<&mut S::Tx> {
        let id = self.id;
        self.tx
            .as_mut()
            .ok_or_else(|| LedgerError::SessionFailure(format!("session {id} already finished")))
    }
}

impl<S: LedgerStore> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

/// Creates, commits and discards sessions
pub struct SessionManager<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> SessionManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Begin a new session
    ///
    /// # Errors
    ///
    /// * `LedgerError::SessionFailure` - No store transaction could be started
    pub async fn start(&self) -> LedgerResult<Session<S>> {
        let tx = self.store.begin().await?;
        let session = Session {
            id: Uuid::new_v4(),
            tx: Some(tx),
            poisoned: None,
        };
        log::trace!("Session {} started", session.id);
        Ok(session)
    }

    /// Commit a session, publishing its writes and releasing its locks
    ///
    /// # Errors
    ///
    /// * `LedgerError::SessionFailure` - Session already finished, or poisoned
    ///   by a failed operation; a poisoned session is rolled back instead
    pub async fn commit(&self, mut session: Session<S>) -> LedgerResult<()> {
        if let Err(err) = session.usable() {
            self.discard(&mut session).await?;
            return Err(err);
        }
        let tx = session.tx.take().ok_or_else(|| {
            LedgerError::SessionFailure(format!("session {} already finished", session.id))
        })?;
        self.store.commit(tx).await?;
        log::trace!("Session {} committed", session.id);
        Ok(())
    }

    /// Discard a session. Safe to call any number of times.
    pub async fn discard(&self, session: &mut Session<S>) -> LedgerResult<()> {
        if let Some(tx) = session.tx.take() {
            self.store.rollback(tx).await?;
            log::debug!("Session {} discarded", session.id);
        }
        Ok(())
    }

    /// Working scope for one operation: the caller's session, or a new implicit one
    pub async fn get<'a>(
        &self,
        session: Option<&'a mut Session<S>>,
    ) -> LedgerResult<WorkingSet<'a, S>> {
        match session {
            Some(session) => {
                session.usable()?;
                Ok(WorkingSet::Attached(session))
            }
            None => Ok(WorkingSet::Implicit(self.start().await?)),
        }
    }
}

/// Scope an operation runs in
pub enum WorkingSet<'a, S: LedgerStore> {
    /// Caller-owned session; commit and discard stay with the caller
    Attached(&'a mut Session<S>),
    /// Session owned by this one operation
    Implicit(Session<S>),
}

impl<S: LedgerStore> WorkingSet<'_, S> {
    pub fn session(&mut self) -> &mut Session<S> {
        match self {
            WorkingSet::Attached(session) => session,
            WorkingSet::Implicit(session) => session,
        }
    }

    /// Close the scope with the operation's result.
    ///
    /// An implicit scope commits on `Ok` and is discarded on `Err`. An attached
    /// scope passes the result through and is poisoned on `Err`.
    pub async fn finish<T>(
        self,
        manager: &SessionManager<S>,
        result: LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut session = match self {
            WorkingSet::Attached(session) => {
                if let Err(err) = &result {
                    session.poison(err);
                }
                return result;
            }
            WorkingSet::Implicit(session) => session,
        };

        match result {
            Ok(value) => {
                manager.commit(session).await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(discard_err) = manager.discard(&mut session).await {
                    log::warn!("Failed to discard session {}: {}", session.id, discard_err);
                }
                Err(err)
            }
        }
    }
}
