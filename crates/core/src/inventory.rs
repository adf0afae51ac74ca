//! Stock allocation planning.
//!
//! When an order is placed, each line item takes stock from one or more
//! warehouses. The planner is pure: the caller loads (and locks) the candidate
//! stock levels in preference order and applies the resulting plan.

use serde::{Deserialize, Serialize};

use crate::WarehouseId;

/// On-hand quantity of one product in one warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseStock {
    /// Warehouse holding the stock.
    pub warehouse_id: WarehouseId,
    /// Units on hand.
    pub quantity: i32,
}

/// Quantities to take from each warehouse, in the order they were offered.
pub type AllocationPlan = Vec<WarehouseStock>;

/// Not enough stock across all offered warehouses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient stock: requested {requested}, available {available}")]
pub struct Shortfall {
    /// Units requested.
    pub requested: i32,
    /// Units available across all warehouses.
    pub available: i64,
}

/// Plan how to take `needed` units from warehouses offered in preference order.
///
/// Each warehouse is drained before the next one is touched, so an order is
/// shipped from as few warehouses as possible given the ordering. Warehouses
/// with no stock never appear in the plan.
///
/// # Errors
///
/// Returns `Shortfall` if the warehouses together hold fewer than `needed`
/// units. A non-positive `needed` yields an empty plan.
pub fn plan_allocation(available: &[WarehouseStock], needed: i32) -> Result<AllocationPlan, Shortfall> {
    let total: i64 = available
        .iter()
        .map(|stock| i64::from(stock.quantity.max(0)))
        .sum();

    if i64::from(needed) > total {
        return Err(Shortfall {
            requested: needed,
            available: total,
        });
    }

    let mut plan = Vec::new();
    let mut remaining = needed;

    for stock in available {
        if remaining <= 0 {
            break;
        }
        let take = remaining.min(stock.quantity);
        if take <= 0 {
            continue;
        }
        plan.push(WarehouseStock {
            warehouse_id: stock.warehouse_id,
            quantity: take,
        });
        remaining -= take;
    }

    Ok(plan)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stock(id: i32, quantity: i32) -> WarehouseStock {
        WarehouseStock {
            warehouse_id: WarehouseId::new(id),
            quantity,
        }
    }

    #[test]
    fn test_single_warehouse_covers_order() {
        let plan = plan_allocation(&[stock(1, 10), stock(2, 10)], 4).unwrap();
        assert_eq!(plan, vec![stock(1, 4)]);
    }

    #[test]
    fn test_spills_into_next_warehouse() {
        let plan = plan_allocation(&[stock(1, 3), stock(2, 10)], 5).unwrap();
        assert_eq!(plan, vec![stock(1, 3), stock(2, 2)]);
    }

    #[test]
    fn test_skips_empty_warehouses() {
        let plan = plan_allocation(&[stock(1, 0), stock(2, 5)], 5).unwrap();
        assert_eq!(plan, vec![stock(2, 5)]);
    }

    #[test]
    fn test_exact_total_is_enough() {
        let plan = plan_allocation(&[stock(1, 2), stock(2, 3)], 5).unwrap();
        let taken: i32 = plan.iter().map(|s| s.quantity).sum();
        assert_eq!(taken, 5);
    }

    #[test]
    fn test_shortfall_reports_available() {
        let err = plan_allocation(&[stock(1, 2), stock(2, 1)], 4).unwrap_err();
        assert_eq!(
            err,
            Shortfall {
                requested: 4,
                available: 3
            }
        );
    }

    #[test]
    fn test_negative_levels_do_not_count() {
        let err = plan_allocation(&[stock(1, -5), stock(2, 3)], 4).unwrap_err();
        assert_eq!(err.available, 3);
    }

    #[test]
    fn test_zero_needed_is_empty_plan() {
        assert!(plan_allocation(&[stock(1, 2)], 0).unwrap().is_empty());
        assert!(plan_allocation(&[], 0).unwrap().is_empty());
    }
}
