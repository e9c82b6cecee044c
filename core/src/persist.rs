use async_trait::async_trait;
use optisync_proto::{PersistRequest, PersistResponse, Txid};
use std::future::Future;
use tracing::debug;

use crate::{error::PersistError, transaction::Transaction};

/// Sends a transaction to the authority.
///
/// Called exactly once per transaction and never retried: a blind retry of a create that
/// already reached the authority would duplicate the row. Callers that want a retry submit a
/// new transaction.
#[async_trait]
pub trait Persister: Send + Sync + 'static {
    /// Returns the txid under which the transaction's effects will appear in the change stream
    async fn persist(&self, transaction: &Transaction) -> Result<Txid, PersistError>;
}

/// Adapts an authority that takes one request per mutation.
///
/// Mutations are sent in order and the first failure aborts the rest. The transaction's txid
/// is the largest one returned, so confirmation waits for every request's effects.
pub struct PerMutationPersister<F> {
    send: F,
}

impl<F, Fut> PerMutationPersister<F>
where
    F: Fn(PersistRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PersistResponse, PersistError>> + Send + 'static,
{
    pub fn new(send: F) -> Self { Self { send } }
}

#[async_trait]
impl<F, Fut> Persister for PerMutationPersister<F>
where
    F: Fn(PersistRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PersistResponse, PersistError>> + Send + 'static,
{
    async fn persist(&self, transaction: &Transaction) -> Result<Txid, PersistError> {
        let mut txid: Option<Txid> = None;
        for mutation in &transaction.mutations {
            let response = (self.send)(mutation.to_request(&transaction.table)).await?;
            debug!("{} {} {} -> txid {}", transaction.id, mutation.kind, mutation.key, response.txid);
            txid = txid.max(Some(response.txid));
        }
        txid.ok_or_else(|| PersistError::Transport(format!("transaction {} has no mutations", transaction.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{transaction::Mutation, value::Row};
    use optisync_proto::TransactionId;
    use std::sync::{Arc, Mutex};

    fn transaction(mutations: Vec<Mutation>) -> Transaction { Transaction { id: TransactionId::new(), table: "todos".into(), mutations } }

    #[tokio::test]
    async fn returns_largest_txid() {
        let next = Arc::new(Mutex::new(10u64));
        let persister = PerMutationPersister::new(move |_request: PersistRequest| {
            let next = next.clone();
            async move {
                let mut n = next.lock().unwrap();
                *n += 1;
                Ok(PersistResponse { txid: Txid::new(*n), row: None, success: Some(true) })
            }
        });
        let tx = transaction(vec![Mutation::delete("a"), Mutation::delete("b")]);
        assert_eq!(persister.persist(&tx).await, Ok(Txid::new(12)));
    }

    #[tokio::test]
    async fn first_failure_stops_the_transaction() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let persister = {
            let sent = sent.clone();
            PerMutationPersister::new(move |request: PersistRequest| {
                sent.lock().unwrap().push(request.clone());
                async move {
                    match request {
                        PersistRequest::Create { .. } => Err(PersistError::from_status(429, None)),
                        _ => Ok(PersistResponse { txid: Txid::new(1), row: None, success: None }),
                    }
                }
            })
        };
        let tx = transaction(vec![Mutation::insert("a", Row::new().with("id", "a")), Mutation::delete("b")]);
        assert!(matches!(persister.persist(&tx).await, Err(PersistError::RateLimited { .. })));
        assert_eq!(sent.lock().unwrap().len(), 1);
    }
}
