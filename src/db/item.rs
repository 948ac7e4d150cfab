use tracing::info;

use super::types::{Item, ItemPatch, NewItem};
use super::{fetch_list, fetch_single, first_row, to_row, Db};
use crate::backend::{DbResult, Filter, Select, CREATED_AT};
use crate::cache::{QueryFilter, QueryKey};
use crate::query::Query;

const TABLE: &str = "items";

impl Db {
  pub fn use_item(&self, id: Option<&str>) -> Query<Item> {
    let key = QueryKey::new("item").param("id", id.unwrap_or_default());
    self.use_query(key, id, |backend, id| {
      fetch_single(backend, Select::from(TABLE).eq("id", id))
    })
  }

  /// Fetch all items of an owner, newest first.
  pub fn use_items_by_owner(&self, owner: Option<&str>) -> Query<Vec<Item>> {
    let key = QueryKey::new("items").param("owner", owner.unwrap_or_default());
    self.use_query(key, owner, |backend, owner| {
      fetch_list(
        backend,
        Select::from(TABLE).eq("owner", owner).order_desc(CREATED_AT),
      )
    })
  }

  pub async fn create_item(&self, data: NewItem) -> DbResult<Item> {
    info!(owner = %data.owner, "Creating item");
    let rows = self.backend.insert(TABLE, vec![to_row(&data)?]).await?;
    let item = first_row(rows, TABLE)?;
    self.queries.invalidate(QueryFilter::all("items"))?;
    Ok(item)
  }

  pub async fn update_item(&self, id: &str, data: ItemPatch) -> DbResult<Item> {
    info!(%id, "Updating item");
    let rows = self
      .backend
      .update(TABLE, &Filter::new().eq("id", id), to_row(&data)?)
      .await?;
    let item = first_row(rows, TABLE)?;
    self.invalidate_item(id)?;
    Ok(item)
  }

  pub async fn delete_item(&self, id: &str) -> DbResult<Item> {
    info!(%id, "Deleting item");
    let rows = self
      .backend
      .delete(TABLE, &Filter::new().eq("id", id))
      .await?;
    let item = first_row(rows, TABLE)?;
    self.invalidate_item(id)?;
    Ok(item)
  }

  fn invalidate_item(&self, id: &str) -> DbResult<()> {
    self.queries.invalidate(QueryKey::new("item").param("id", id))?;
    self.queries.invalidate(QueryFilter::all("items"))?;
    Ok(())
  }
}
