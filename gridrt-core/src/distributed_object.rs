//! Collective object lifecycle (§4.4 "Distributed object base").
//!
//! `create`, `destroy`, and `get_ptr` are the only three operations every
//! distributed container in this workspace is built from: `create`
//! broadcasts construction of one local instance per locality and returns a
//! handle on the caller's locality; `get_ptr` resolves an [`ObjectId`] to
//! the local instance living on the calling locality, or `None` if absent;
//! `destroy` broadcasts teardown and releases the id's slot for reuse.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::{FatalKind, GridError, Result};
use crate::objectid::ObjectId;
use crate::runtime::Grid;

/// A container type with one independently-constructed instance per
/// locality, minted and torn down collectively through [`create`] and
/// [`destroy`].
pub trait DistributedObject: Send + Sync + Sized + 'static {
    /// Construction arguments, broadcast verbatim to every locality.
    type Args: Clone + Send + Sync + 'static;

    /// Build the local instance that will live on whichever locality this
    /// runs on — read `Grid::this_locality()` inside if the instance needs
    /// to know where it is.
    fn construct(id: ObjectId<Self>, args: &Self::Args) -> Self;
}

/// Mint a fresh id on the caller's locality, broadcast construction to
/// every locality, and return the instance living on the caller's locality.
pub async fn create<T: DistributedObject>(grid: &Arc<Grid>, args: T::Args) -> Result<Arc<T>> {
    let catalog: Arc<Catalog<T>> = grid.catalog_for::<T>();
    let caller = Grid::this_locality();
    let id = catalog.next_id(caller)?;

    let catalog_for_broadcast = catalog.clone();
    grid.execute_on_all(
        move |args: T::Args| {
            let at = Grid::this_locality();
            let instance = Arc::new(T::construct(id, &args));
            catalog_for_broadcast.insert(at, id, instance);
        },
        args,
    )
    .await;

    catalog
        .get(caller, id)
        .ok_or_else(|| GridError::Fatal(FatalKind::CollectiveDispatchFailed(caller)))
}

/// Resolve `id` to the local instance living on the calling locality.
/// `None` means either the object was never constructed here (it belongs to
/// a container whose `create` hasn't broadcast to this locality yet) or it
/// has already been destroyed — both are ordinary, non-fatal outcomes.
pub fn get_ptr<T: DistributedObject>(grid: &Arc<Grid>, id: ObjectId<T>) -> Option<Arc<T>> {
    grid.catalog_for::<T>().get(Grid::this_locality(), id)
}

/// Broadcast teardown of `id` to every locality and recycle its slot.
/// Destroying an id a second time is a fatal programming error (§7).
pub async fn destroy<T: DistributedObject>(grid: &Arc<Grid>, id: ObjectId<T>) -> Result<()> {
    let catalog: Arc<Catalog<T>> = grid.catalog_for::<T>();
    let caller = Grid::this_locality();

    // Detect double-destroy against the caller's own slot before fanning
    // out, so a repeat call fails fast instead of silently no-op'ing on
    // every other locality too.
    catalog.get(caller, id).ok_or(GridError::Fatal(FatalKind::DoubleDestroy(id.raw())))?;

    let catalog_for_broadcast = catalog.clone();
    grid.execute_on_all(
        move |id: ObjectId<T>| {
            let at = Grid::this_locality();
            // Already-absent on a given locality is fine here: not every
            // locality necessarily finished construction at the same pace,
            // but destroy is only ever issued after a successful create.
            let _ = catalog_for_broadcast.erase(at, id);
        },
        id,
    )
    .await;

    catalog.recycle(id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        id: ObjectId<Counter>,
        seed: u32,
    }

    impl DistributedObject for Counter {
        type Args = u32;
        fn construct(id: ObjectId<Self>, args: &u32) -> Self {
            Counter { id, seed: *args }
        }
    }

    #[tokio::test]
    async fn create_broadcasts_to_every_locality() {
        let grid = Grid::new(3);
        let handle = create::<Counter>(&grid, 42).await.unwrap();
        assert_eq!(handle.seed, 42);

        let id = handle.id;
        for loc in grid.all_localities() {
            let found = grid
                .execute_at(loc, {
                    let grid = grid.clone();
                    move || get_ptr::<Counter>(&grid, id).map(|c| c.seed)
                })
                .await;
            assert_eq!(found, Some(42));
        }
    }

    #[tokio::test]
    async fn destroy_then_get_ptr_is_none() {
        let grid = Grid::new(2);
        let handle = create::<Counter>(&grid, 7).await.unwrap();
        let id = handle.id;
        drop(handle);
        destroy::<Counter>(&grid, id).await.unwrap();
        assert!(get_ptr::<Counter>(&grid, id).is_none());
    }

    #[tokio::test]
    async fn double_destroy_is_fatal() {
        let grid = Grid::new(1);
        let handle = create::<Counter>(&grid, 1).await.unwrap();
        let id = handle.id;
        drop(handle);
        destroy::<Counter>(&grid, id).await.unwrap();
        let err = destroy::<Counter>(&grid, id).await.unwrap_err();
        assert!(matches!(err, GridError::Fatal(FatalKind::DoubleDestroy(_))));
    }

    #[tokio::test]
    async fn recycled_id_is_reused_after_destroy() {
        let grid = Grid::new(1);
        let first = create::<Counter>(&grid, 1).await.unwrap();
        let first_id = first.id;
        drop(first);
        destroy::<Counter>(&grid, first_id).await.unwrap();
        let second = create::<Counter>(&grid, 2).await.unwrap();
        assert_eq!(second.id.local_slot(), first_id.local_slot());
    }
}
