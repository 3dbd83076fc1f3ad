//! Per-ticket mutual exclusion around fetch-and-reconcile.
//!
//! Two layers: a keyed in-process mutex, and with Postgres a session
//! advisory lock so several server processes sharing a database also
//! serialize. Advisory locks are held on connections from a pool of their
//! own, so a full store pool can never starve a lock holder.
//!
//! A held connection only goes back to the pool after a successful
//! unlock. If the caller is cancelled, or unlocking fails, the connection is
//! detached and closed instead, which ends the session and with it the lock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use diesel::sql_types::BigInt;
use diesel_async::pooled_connection::deadpool::Object;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::store::pg::DbPool;

#[derive(Default)]
pub struct TicketLocks {
    slots: Mutex<HashMap<i64, Weak<Mutex<()>>>>,
    advisory: Option<AdvisoryLocks>,
}

struct AdvisoryLocks {
    pool: DbPool,
    timeout: Duration,
}

impl TicketLocks {
    /// In-process exclusion only.
    pub fn local() -> Self {
        Self::default()
    }

    /// In-process exclusion plus Postgres advisory locks held on `pool`.
    ///
    /// Acquiring a ticket's lock fails after `timeout`.
    pub fn with_advisory(pool: DbPool, timeout: Duration) -> Self {
        Self {
            slots: Mutex::default(),
            advisory: Some(AdvisoryLocks { pool, timeout }),
        }
    }

    /// Run `body` while holding the lock for `ticket_id`.
    ///
    /// The lock is released on every exit path, including when `body`
    /// fails or the returned future is dropped; a failure from `body` is
    /// returned unchanged.
    pub async fn with_lock<T, F, Fut>(&self, ticket_id: i64, body: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let slot = self.slot(ticket_id).await;
        let _guard = slot.lock().await;

        let Some(advisory) = &self.advisory else {
            return body().await;
        };

        let held = advisory.acquire(ticket_id).await?;
        let result = body().await;
        held.release().await;
        result
    }

    async fn slot(&self, ticket_id: i64) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, slot| slot.strong_count() > 0);
        if let Some(slot) = slots.get(&ticket_id).and_then(Weak::upgrade) {
            return slot;
        }
        let slot = Arc::new(Mutex::new(()));
        slots.insert(ticket_id, Arc::downgrade(&slot));
        slot
    }
}

impl AdvisoryLocks {
    async fn acquire(&self, ticket_id: i64) -> anyhow::Result<HeldLock> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("lock pool: {e}"))?;
        let mut held = HeldLock {
            conn: Some(conn),
            ticket_id,
            key: advisory_key(ticket_id),
        };
        // on timeout or error `held` drops with the query possibly in flight,
        // which discards the session
        tokio::time::timeout(self.timeout, held.lock())
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "timed out after {:?} waiting for advisory lock on ticket {ticket_id}",
                    self.timeout
                )
            })??;
        tracing::debug!(ticket_id, key = held.key, "Advisory lock acquired");
        Ok(held)
    }
}

/// A pooled connection whose session may hold a ticket's advisory lock.
struct HeldLock {
    conn: Option<Object<AsyncPgConnection>>,
    ticket_id: i64,
    key: i64,
}

impl HeldLock {
    async fn lock(&mut self) -> anyhow::Result<()> {
        let Some(conn) = self.conn.as_mut() else {
            anyhow::bail!("advisory lock connection already released");
        };
        diesel::sql_query("SELECT pg_advisory_lock($1)")
            .bind::<BigInt, _>(self.key)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn release(mut self) {
        let Some(conn) = self.conn.as_mut() else {
            return;
        };
        let unlocked = diesel::sql_query("SELECT pg_advisory_unlock($1)")
            .bind::<BigInt, _>(self.key)
            .execute(conn)
            .await;
        match unlocked {
            // back to the pool
            Ok(_) => drop(self.conn.take()),
            Err(e) => tracing::error!(
                ticket_id = self.ticket_id,
                key = self.key,
                "Advisory unlock failed: {e}"
            ),
        }
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                ticket_id = self.ticket_id,
                key = self.key,
                "Advisory lock not released cleanly, discarding connection"
            );
            drop(Object::take(conn));
        }
    }
}

/// Stable 64-bit key for the ticket's advisory lock.
pub fn advisory_key(ticket_id: i64) -> i64 {
    let digest = Sha256::digest(format!("zendesk-ticket-{ticket_id}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}


/// Advisory lock behaviour against a live database; skipped when
/// `DATABASE_URL` is unset.
#[cfg(test)]
mod pg_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use diesel::sql_types::{BigInt, Bool};
    use diesel::QueryableByName;
    use diesel_async::{AsyncPgConnection, RunQueryDsl};

    use super::{advisory_key, TicketLocks};
    use crate::store::pg::DbPool;
    use crate::testing::{test_pool, unique_id};

    #[derive(QueryableByName)]
    struct Locked {
        #[diesel(sql_type = Bool)]
        locked: bool,
    }

    /// Try to take `key` from an unrelated session, releasing it on success.
    async fn free_elsewhere(conn: &mut AsyncPgConnection, key: i64) -> bool {
        let row: Locked = diesel::sql_query("SELECT pg_try_advisory_lock($1) AS locked")
            .bind::<BigInt, _>(key)
            .get_result(conn)
            .await
            .unwrap();
        if row.locked {
            diesel::sql_query("SELECT pg_advisory_unlock($1)")
                .bind::<BigInt, _>(key)
                .execute(conn)
                .await
                .unwrap();
        }
        row.locked
    }

    /// Session closes are asynchronous on the server side.
    async fn eventually_free(pool: &DbPool, key: i64) -> bool {
        let mut conn = pool.get().await.unwrap();
        for _ in 0..50 {
            if free_elsewhere(&mut conn, key).await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        false
    }

    #[tokio::test]
    async fn advisory_lock_released_after_body() {
        let Some(lock_pool) = test_pool(1).await else { return };
        let Some(other) = test_pool(1).await else { return };
        let locks = TicketLocks::with_advisory(lock_pool.clone(), Duration::from_secs(5));
        let ticket_id = unique_id();

        let held_inside = locks
            .with_lock(ticket_id, || async {
                let mut conn = other.get().await.unwrap();
                Ok(free_elsewhere(&mut conn, advisory_key(ticket_id)).await)
            })
            .await
            .unwrap();
        assert!(!held_inside, "advisory lock not held during body");

        let mut conn = other.get().await.unwrap();
        assert!(free_elsewhere(&mut conn, advisory_key(ticket_id)).await);
        // the single lock connection went back to the pool
        assert_eq!(lock_pool.status().available, 1);
    }

    #[tokio::test]
    async fn cancelled_holder_releases_advisory_lock() {
        let Some(lock_pool) = test_pool(1).await else { return };
        let Some(other) = test_pool(1).await else { return };
        let locks = Arc::new(TicketLocks::with_advisory(lock_pool, Duration::from_secs(5)));
        let ticket_id = unique_id();
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();

        let holder = tokio::spawn({
            let locks = locks.clone();
            async move {
                locks
                    .with_lock(ticket_id, || async {
                        let _ = entered_tx.send(());
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    })
                    .await
            }
        });
        entered_rx.await.unwrap();
        holder.abort();
        let _ = holder.await;

        assert!(eventually_free(&other, advisory_key(ticket_id)).await);
        // the discarded connection is replaced on demand
        let value = locks.with_lock(ticket_id, || async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn lock_wait_times_out() {
        let Some(lock_pool) = test_pool(1).await else { return };
        let Some(other) = test_pool(1).await else { return };
        let ticket_id = unique_id();
        let key = advisory_key(ticket_id);

        let mut blocker = other.get().await.unwrap();
        diesel::sql_query("SELECT pg_advisory_lock($1)")
            .bind::<BigInt, _>(key)
            .execute(&mut blocker)
            .await
            .unwrap();

        let locks = TicketLocks::with_advisory(lock_pool, Duration::from_millis(200));
        let err = locks
            .with_lock(ticket_id, || async { Ok(()) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");

        diesel::sql_query("SELECT pg_advisory_unlock($1)")
            .bind::<BigInt, _>(key)
            .execute(&mut blocker)
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn busy_store_pool_does_not_starve_lock_holders() {
        let Some(lock_pool) = test_pool(2).await else { return };
        let Some(store_pool) = test_pool(2).await else { return };
        let locks = Arc::new(TicketLocks::with_advisory(lock_pool, Duration::from_secs(5)));
        let done = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..12)
            .map(|_| {
                let (locks, store_pool, done) = (locks.clone(), store_pool.clone(), done.clone());
                let ticket_id = unique_id();
                tokio::spawn(async move {
                    locks
                        .with_lock(ticket_id, || async {
                            let mut conn = store_pool
                                .get()
                                .await
                                .map_err(|e| anyhow::anyhow!("store pool: {e}"))?;
                            diesel::sql_query("SELECT 1").execute(&mut conn).await?;
                            done.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(20), async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        })
        .await
        .expect("lock holders deadlocked on the pool");
        assert_eq!(AtomicUsize::load(&done, Ordering::SeqCst), 12);
    }
}
