//! Secret upsert/read. Propagation into application containers is out of
//! scope for this crate.

use anyhow::Result;

use crate::store::Store;

pub async fn upsert(store: &Store, name: &str, value: &str) -> Result<()> {
    store.upsert_secret(name, value).await
}

pub async fn get(store: &Store, name: &str) -> Result<Option<String>> {
    store.get_secret(name).await
}
