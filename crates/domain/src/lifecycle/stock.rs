//! Stock reservation protocol shared by the state families.
//!
//! Every function works item by item, with one repository call per variant
//! adjustment, and records what it changed as [`StockMovement`]s so the
//! calling state can publish them after its own transition event.

use std::collections::HashMap;

use common::{ItemId, VariantId};

use super::{LifecycleError, Result, StateDeps};
use crate::error::DomainError;
use crate::events::{EventKind, OrderEvent};
use crate::order::{Order, OrderItem};
use crate::ports::{RepositoryError, VariantRepository};

/// One adjustment of one variant on behalf of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StockMovement {
    pub item_id: ItemId,
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Publishes one stock event per movement.
pub(crate) fn announce(deps: &StateDeps, kind: EventKind, order: &Order, moves: &[StockMovement]) {
    for m in moves {
        deps.publisher
            .publish(OrderEvent::stock(kind, order, m.variant_id, m.quantity));
    }
}

/// Reserve-on-approve: reserves whatever available stock covers each item's
/// shortfall and leaves the rest to be manufactured.
///
/// Items without a variant are skipped. A reservation lost to a concurrent
/// order leaves that item short rather than failing the transition.
pub(crate) async fn reserve_available(
    order: &mut Order,
    deps: &StateDeps,
) -> Result<Vec<StockMovement>> {
    let Some(variants) = deps.variants.as_deref() else {
        tracing::warn!(order_id = %order.id(), "no variant repository, skipping reservation");
        return Ok(Vec::new());
    };

    let mut moves = Vec::new();
    for index in 0..order.items().len() {
        let item = &order.items()[index];
        let (Some(variant_id), shortfall) = (item.variant_id, item.shortfall()) else {
            continue;
        };
        if shortfall == 0 {
            continue;
        }

        let Some(variant) = variants.get_variant(variant_id).await? else {
            tracing::warn!(item_id = %item.id, %variant_id, "variant not found, skipping reservation");
            continue;
        };
        let quantity = variant.reservable(shortfall);
        if quantity == 0 {
            continue;
        }

        match variants.reserve_stock(variant_id, quantity).await {
            Ok(_) => {
                let item_id = item.id;
                order.items_mut()[index].add_reserved(quantity);
                moves.push(StockMovement {
                    item_id,
                    variant_id,
                    quantity,
                });
            }
            Err(RepositoryError::Stock(DomainError::InsufficientStock { .. })) => {
                tracing::debug!(%variant_id, quantity, "stock taken concurrently, leaving item short");
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(%variant_id, "variant disappeared during reservation");
            }
            Err(e) => {
                rollback(variants, &moves).await;
                return Err(e.into());
            }
        }
    }

    persist_items(order, deps, &moves).await?;
    Ok(moves)
}

/// Reserve-or-fail: every item must draw from an existing variant with
/// enough available stock, or nothing is reserved at all.
pub(crate) async fn reserve_all(order: &mut Order, deps: &StateDeps) -> Result<Vec<StockMovement>> {
    let variants = deps
        .variants
        .as_deref()
        .ok_or(LifecycleError::MissingDependency("variant repository"))?;

    // Check everything before touching anything.
    for item in order.items() {
        let variant_id = item
            .variant_id
            .ok_or(LifecycleError::MissingVariant { item_id: item.id })?;
        let variant = variants
            .get_variant(variant_id)
            .await?
            .ok_or(LifecycleError::MissingVariant { item_id: item.id })?;
        if !variant.can_reserve(item.shortfall()) {
            return Err(LifecycleError::InsufficientStock {
                item_id: item.id,
                variant_id,
                requested: item.shortfall(),
                available: variant.available(),
            });
        }
    }

    let mut moves = Vec::new();
    for index in 0..order.items().len() {
        let item = &order.items()[index];
        let (item_id, quantity) = (item.id, item.shortfall());
        let Some(variant_id) = item.variant_id else {
            continue;
        };
        if quantity == 0 {
            continue;
        }

        if let Err(e) = variants.reserve_stock(variant_id, quantity).await {
            rollback(variants, &moves).await;
            return Err(match e {
                RepositoryError::Stock(DomainError::InsufficientStock {
                    requested,
                    available,
                    ..
                }) => LifecycleError::InsufficientStock {
                    item_id,
                    variant_id,
                    requested,
                    available,
                },
                other => other.into(),
            });
        }
        order.items_mut()[index].add_reserved(quantity);
        moves.push(StockMovement {
            item_id,
            variant_id,
            quantity,
        });
    }

    if let Err(e) = persist_items(order, deps, &moves).await {
        rollback(variants, &moves).await;
        return Err(e);
    }
    Ok(moves)
}

/// How much to consume from a variant when an order is delivered. Either
/// way the amount never exceeds the variant's reserved stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryRelease {
    /// The units the item holds in reservation.
    ItemReservation,
    /// The requested quantity.
    RequestedQuantity,
}

/// Release-on-deliver: consumes reserved units, dropping both physical and
/// reserved stock. Missing variants are logged and skipped.
pub(crate) async fn release_for_delivery(
    order: &mut Order,
    deps: &StateDeps,
    policy: DeliveryRelease,
) -> Result<Vec<StockMovement>> {
    let Some(variants) = deps.variants.as_deref() else {
        tracing::warn!(order_id = %order.id(), "no variant repository, skipping stock release");
        return Ok(Vec::new());
    };

    if policy == DeliveryRelease::ItemReservation {
        refresh_items(order, deps).await?;
    }

    let mut moves = Vec::new();
    for index in 0..order.items().len() {
        let item = &order.items()[index];
        let Some(variant_id) = item.variant_id else {
            continue;
        };
        let item_id = item.id;

        let wanted = match policy {
            DeliveryRelease::ItemReservation => item.reserved_quantity(),
            DeliveryRelease::RequestedQuantity => item.quantity,
        };
        if wanted == 0 {
            continue;
        }
        let Some(variant) = variants.get_variant(variant_id).await? else {
            tracing::warn!(%item_id, %variant_id, "variant not found, skipping release");
            continue;
        };
        let quantity = wanted.min(variant.reserved_stock());
        if quantity < wanted && policy == DeliveryRelease::ItemReservation {
            tracing::warn!(
                %item_id,
                %variant_id,
                wanted,
                reserved = variant.reserved_stock(),
                "variant holds less than the item reserved, releasing what is left"
            );
        }
        if quantity == 0 {
            continue;
        }

        match variants.release_stock(variant_id, quantity).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::warn!(%item_id, %variant_id, "variant not found, skipping release");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        order.items_mut()[index].clear_reserved();
        moves.push(StockMovement {
            item_id,
            variant_id,
            quantity,
        });
    }

    persist_items(order, deps, &moves).await?;
    Ok(moves)
}

/// Release-on-cancel: un-earmarks each item's requested quantity, clamped
/// at the variant's reserved stock. Physical stock is untouched.
pub(crate) async fn release_for_cancel(
    order: &mut Order,
    deps: &StateDeps,
) -> Result<Vec<StockMovement>> {
    let Some(variants) = deps.variants.as_deref() else {
        tracing::warn!(order_id = %order.id(), "no variant repository, skipping stock release");
        return Ok(Vec::new());
    };

    let mut moves = Vec::new();
    for index in 0..order.items().len() {
        let item = &order.items()[index];
        let Some(variant_id) = item.variant_id else {
            continue;
        };
        let (item_id, requested) = (item.id, item.quantity);

        let released = match variants.unreserve_stock(variant_id, requested).await {
            Ok(released) => released,
            Err(e) if e.is_not_found() => {
                tracing::warn!(%item_id, %variant_id, "variant not found, skipping release");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        order.items_mut()[index].clear_reserved();
        if released > 0 {
            moves.push(StockMovement {
                item_id,
                variant_id,
                quantity: released,
            });
        }
    }

    persist_items(order, deps, &moves).await?;
    Ok(moves)
}

/// Replaces the order's items with the stored copies, which consumers may
/// have updated since the order was loaded.
async fn refresh_items(order: &mut Order, deps: &StateDeps) -> Result<()> {
    let Some(items) = deps.items.as_deref() else {
        return Ok(());
    };
    for stored in items.get_order_items_by_order(order.id()).await? {
        order.refresh_item(stored);
    }
    Ok(())
}

/// Writes back the items touched by `moves`. Items the repository does not
/// know are skipped.
async fn persist_items(order: &Order, deps: &StateDeps, moves: &[StockMovement]) -> Result<()> {
    let Some(items) = deps.items.as_deref() else {
        return Ok(());
    };
    for m in moves {
        let Some(item) = order.item(m.item_id) else {
            continue;
        };
        if let Err(e) = items.update_order_item(order.id(), item).await {
            if e.is_not_found() {
                tracing::trace!(item_id = %m.item_id, "item not stored yet");
                continue;
            }
            return Err(e.into());
        }
    }
    Ok(())
}

/// Undoes reservations made earlier in the same entry action.
async fn rollback(variants: &dyn VariantRepository, moves: &[StockMovement]) {
    for m in moves {
        if let Err(e) = variants.unreserve_stock(m.variant_id, m.quantity).await {
            tracing::error!(variant_id = %m.variant_id, error = %e, "failed to roll back reservation");
        }
    }
}

/// Stores every item of a freshly started order.
pub(crate) async fn register_items(order: &Order, deps: &StateDeps) -> Result<()> {
    let Some(items) = deps.items.as_deref() else {
        return Ok(());
    };
    for item in order.items() {
        items.create_order_item(order.id(), item).await?;
    }
    Ok(())
}

/// Quantities to manufacture per item: the unreserved shortfall.
pub(crate) fn shortfalls(items: &[OrderItem]) -> HashMap<ItemId, u32> {
    items
        .iter()
        .filter(|i| i.shortfall() > 0)
        .map(|i| (i.id, i.shortfall()))
        .collect()
}

/// Quantities to manufacture per item: everything requested.
pub(crate) fn full_quantities(items: &[OrderItem]) -> HashMap<ItemId, u32> {
    items
        .iter()
        .filter(|i| i.quantity > 0)
        .map(|i| (i.id, i.quantity))
        .collect()
}
