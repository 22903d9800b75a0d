use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderStatus};
use serde::Serialize;

use crate::model::Order;

/// Filters for listing a store's orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Only orders currently in this status.
    pub status: Option<OrderStatus>,

    /// Only orders created at or after this instant.
    pub date_from: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Creates a filter that matches every order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by minimum creation time (inclusive).
    pub fn date_from(mut self, from: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self
    }

    /// Checks a loaded order against the filter.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status
            && order.status != status
        {
            return false;
        }
        if let Some(from) = self.date_from
            && order.created_at < from
        {
            return false;
        }
        true
    }
}

/// Per-status counts and confirmed revenue for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub by_status: BTreeMap<String, u64>,
    pub total_revenue: Money,
}

impl OrderStats {
    /// Builds stats from `(status, count, summed total)` groups.
    ///
    /// Every status appears in `by_status`, with zero when absent from `groups`.
    pub fn from_groups(groups: impl IntoIterator<Item = (OrderStatus, u64, Money)>) -> Self {
        let mut by_status: BTreeMap<String, u64> = OrderStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        let mut total_orders = 0;
        let mut total_revenue = Money::zero();

        for (status, count, amount) in groups {
            *by_status.entry(status.as_str().to_string()).or_default() += count;
            total_orders += count;
            if OrderStatus::REVENUE.contains(&status) {
                total_revenue += amount;
            }
        }

        Self {
            total_orders,
            by_status,
            total_revenue,
        }
    }

    pub fn count(&self, status: OrderStatus) -> u64 {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}
