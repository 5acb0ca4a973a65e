//! Key-value store collaborators.
//!
//! The counter can mirror its value into an external store. Stores answer a
//! read of an absent key with code 20 ("key does not exist"); for a counter
//! that simply means zero, so [`read_int_or_zero`] folds it away.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::crdt::NodeId;
use crate::error::{ErrorCode, ReplicaError};
use crate::node::message::Payload;
use crate::node::transport::Outbox;
use crate::Result;

/// Integer key-value operations.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Reads `key`; an absent key is `Err` with [`ErrorCode::KeyDoesNotExist`].
    async fn read_int(&self, key: &str) -> Result<i64>;

    /// Unconditionally stores `value` under `key`.
    async fn write(&self, key: &str, value: i64) -> Result<()>;

    /// Sets `key` to `to` only if it currently holds `from`.
    ///
    /// With `create_if_missing`, an absent key is created holding `to`.
    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<()>;
}

/// Reads `key` within `timeout`, treating an absent key as `0`.
///
/// Any other store error, and the timeout itself, is returned to the caller.
pub async fn read_int_or_zero(
    store: &dyn KvStore,
    key: &str,
    timeout: Duration,
) -> Result<i64> {
    match tokio::time::timeout(timeout, store.read_int(key)).await {
        Err(_) => Err(ReplicaError::timeout(format!("read {key}"), timeout)),
        Ok(Err(e)) if e.is_key_not_found() => Ok(0),
        Ok(result) => result,
    }
}

/// A key-value service reached over the message substrate (`seq-kv`, `lin-kv`).
pub struct ServiceKv {
    outbox: Arc<Outbox>,
    service: NodeId,
    timeout: Duration,
}

impl ServiceKv {
    pub fn new(outbox: Arc<Outbox>, service: NodeId, timeout: Duration) -> Self {
        ServiceKv {
            outbox,
            service,
            timeout,
        }
    }

    async fn call(&self, payload: Payload) -> Result<Payload> {
        self.outbox.rpc(&self.service, payload, self.timeout).await
    }
}

#[async_trait]
impl KvStore for ServiceKv {
    async fn read_int(&self, key: &str) -> Result<i64> {
        let reply = self
            .call(Payload::Read {
                key: Some(key.to_string()),
            })
            .await?;
        match reply {
            Payload::ReadOk {
                value: Some(value), ..
            } => Ok(value),
            other => Err(ReplicaError::malformed(format!(
                "expected read_ok with value from {}, got {}",
                self.service,
                other.kind()
            ))),
        }
    }

    async fn write(&self, key: &str, value: i64) -> Result<()> {
        let reply = self
            .call(Payload::Write {
                key: key.to_string(),
                value,
            })
            .await?;
        match reply {
            Payload::WriteOk => Ok(()),
            other => Err(ReplicaError::malformed(format!(
                "expected write_ok from {}, got {}",
                self.service,
                other.kind()
            ))),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<()> {
        let reply = self
            .call(Payload::Cas {
                key: key.to_string(),
                from,
                to,
                create_if_not_exists: create_if_missing,
            })
            .await?;
        match reply {
            Payload::CasOk => Ok(()),
            other => Err(ReplicaError::malformed(format!(
                "expected cas_ok from {}, got {}",
                self.service,
                other.kind()
            ))),
        }
    }
}

/// In-process store with the same error codes as the real services.
#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn read_int(&self, key: &str) -> Result<i64> {
        self.values
            .lock()
            .get(key)
            .copied()
            .ok_or_else(|| ReplicaError::service(ErrorCode::KeyDoesNotExist, "key does not exist"))
    }

    async fn write(&self, key: &str, value: i64) -> Result<()> {
        self.values.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        from: i64,
        to: i64,
        create_if_missing: bool,
    ) -> Result<()> {
        let mut values = self.values.lock();
        match values.get(key).copied() {
            None if create_if_missing => {
                values.insert(key.to_string(), to);
                Ok(())
            }
            None => Err(ReplicaError::service(
                ErrorCode::KeyDoesNotExist,
                "key does not exist",
            )),
            Some(current) if current == from => {
                values.insert(key.to_string(), to);
                Ok(())
            }
            Some(current) => Err(ReplicaError::service(
                ErrorCode::PreconditionFailed,
                format!("expected {from}, found {current}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::message::{Body, Message};

    /// A store that never answers.
    struct StalledKv;

    #[async_trait]
    impl KvStore for StalledKv {
        async fn read_int(&self, _key: &str) -> Result<i64> {
            std::future::pending().await
        }
        async fn write(&self, _key: &str, _value: i64) -> Result<()> {
            std::future::pending().await
        }
        async fn compare_and_swap(&self, _: &str, _: i64, _: i64, _: bool) -> Result<()> {
            std::future::pending().await
        }
    }

    /// A store that fails every call with `code`.
    struct FailingKv(ErrorCode);

    #[async_trait]
    impl KvStore for FailingKv {
        async fn read_int(&self, _key: &str) -> Result<i64> {
            Err(ReplicaError::service(self.0, "injected"))
        }
        async fn write(&self, _key: &str, _value: i64) -> Result<()> {
            Err(ReplicaError::service(self.0, "injected"))
        }
        async fn compare_and_swap(&self, _: &str, _: i64, _: i64, _: bool) -> Result<()> {
            Err(ReplicaError::service(self.0, "injected"))
        }
    }

    #[tokio::test]
    async fn test_missing_key_reads_as_zero() {
        let kv = MemoryKv::new();
        assert!(kv.read_int("counter/n1").await.unwrap_err().is_key_not_found());

        let value = read_int_or_zero(&kv, "counter/n1", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 0);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let kv = MemoryKv::new();
        kv.write("k", 12).await.unwrap();
        let value = read_int_or_zero(&kv, "k", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value, 12);
    }

    #[tokio::test]
    async fn test_other_store_errors_propagate() {
        let kv = FailingKv(ErrorCode::TemporarilyUnavailable);
        let err = read_int_or_zero(&kv, "k", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TemporarilyUnavailable);
    }

    #[tokio::test]
    async fn test_stalled_read_times_out() {
        let err = read_int_or_zero(&StalledKv, "k", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, ReplicaError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_compare_and_swap_semantics() {
        let kv = MemoryKv::new();

        let err = kv.compare_and_swap("k", 0, 1, false).await.unwrap_err();
        assert!(err.is_key_not_found());

        kv.compare_and_swap("k", 0, 1, true).await.unwrap();
        assert_eq!(kv.read_int("k").await.unwrap(), 1);

        let err = kv.compare_and_swap("k", 0, 2, false).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PreconditionFailed);

        kv.compare_and_swap("k", 1, 2, false).await.unwrap();
        assert_eq!(kv.read_int("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_service_kv_maps_error_replies() {
        let (outbox, mut rx) = Outbox::new(NodeId::from("n1"), vec![NodeId::from("n1")]);
        let outbox = Arc::new(outbox);
        let kv = ServiceKv::new(
            outbox.clone(),
            NodeId::from("seq-kv"),
            Duration::from_secs(5),
        );

        let service = tokio::spawn(async move {
            let request = rx.recv().await.unwrap();
            assert_eq!(request.dest, NodeId::from("seq-kv"));
            assert_eq!(
                request.body.payload,
                Payload::Read {
                    key: Some("counter/n1".into())
                }
            );
            outbox.complete(Message {
                src: NodeId::from("seq-kv"),
                dest: NodeId::from("n1"),
                body: Body {
                    msg_id: Some(1),
                    in_reply_to: request.body.msg_id,
                    payload: Payload::Error {
                        code: 20,
                        text: "key does not exist".into(),
                    },
                },
            });
        });

        let value = read_int_or_zero(&kv, "counter/n1", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, 0);
        service.await.unwrap();
    }
}
