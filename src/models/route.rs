use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "route_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteStatus {
    Active,
    Closed,
}

/// A collector's daily visit plan. `total_collected`, `total_expenses` and
/// `net_amount` are derived sums, recomputed whenever a reversal touches a
/// referenced installment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionRoute {
    pub id: Uuid,
    pub manager_id: Uuid,
    pub route_date: NaiveDate,
    pub status: RouteStatus,
    pub total_collected: Decimal,
    pub total_expenses: Decimal,
    pub net_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One installment stop on a route. `amount_collected` is denormalized from
/// the installment's `paid_amount` and must be kept in sync when reversals
/// touch it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionRouteItem {
    pub id: Uuid,
    pub route_id: Uuid,
    pub sub_loan_id: Uuid,
    pub amount_due: Decimal,
    pub amount_collected: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Cash spent while running a route (fuel, tolls, meals).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteExpense {
    pub id: Uuid,
    pub route_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
