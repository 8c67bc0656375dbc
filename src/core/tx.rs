//! Transaction support: raw `begin`/`commit`/`rollback`, and a scoped guard
//! that rolls back on drop unless explicitly committed — the idiomatic
//! rendering of "guaranteed rollback on every exit path" in a language
//! without exceptions/`finally`.

use crate::error::Result;

use super::Core;

impl Core<'_> {
    pub(crate) fn begin_transaction(&self) -> Result<()> {
        self.inner
            .conn
            .lock()
            .execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<()> {
        self.inner.conn.lock().execute_batch("COMMIT")?;
        Ok(())
    }

    pub(crate) fn rollback(&self) -> Result<()> {
        self.inner.conn.lock().execute_batch("ROLLBACK")?;
        Ok(())
    }
}

/// A scoped transaction: `BEGIN IMMEDIATE` on construction, `ROLLBACK` on
/// drop unless [`TransactionGuard::commit`] was called.
///
/// Borrows the handle for its whole lifetime, so the transaction and the
/// handle it runs against cannot be used concurrently from another thread.
pub struct TransactionGuard<'a> {
    core: Core<'a>,
    committed: bool,
}

impl<'a> TransactionGuard<'a> {
    pub(crate) fn begin(core: Core<'a>) -> Result<Self> {
        core.begin_transaction()?;
        Ok(TransactionGuard {
            core,
            committed: false,
        })
    }

    /// Commits the transaction. Consumes `self` so a second `commit`/drop
    /// cannot double-commit.
    pub fn commit(mut self) -> Result<()> {
        self.core.commit()?;
        self.committed = true;
        Ok(())
    }

    /// Rolls back explicitly; equivalent to dropping the guard without
    /// committing, spelled out for callers who want it to read at the call
    /// site.
    pub fn rollback(mut self) -> Result<()> {
        self.core.rollback()?;
        self.committed = true; // prevent the Drop impl from rolling back again
        Ok(())
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.core.rollback();
        }
    }
}
