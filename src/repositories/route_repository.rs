use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CollectionRoute, CollectionRouteItem, RouteExpense};

/// Repository for daily collection routes and their derived totals.
pub struct RouteRepository {
    pool: PgPool,
}

impl RouteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_route(&self, route: &CollectionRoute) -> Result<CollectionRoute> {
        let row = sqlx::query_as::<_, CollectionRoute>(
            r#"
            INSERT INTO collection_routes (id, manager_id, route_date, status, total_collected, total_expenses, net_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, manager_id, route_date, status, total_collected, total_expenses, net_amount, created_at, updated_at
            "#,
        )
        .bind(route.id)
        .bind(route.manager_id)
        .bind(route.route_date)
        .bind(route.status)
        .bind(route.total_collected)
        .bind(route.total_expenses)
        .bind(route.net_amount)
        .bind(route.created_at)
        .bind(route.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_route(&self, id: Uuid) -> Result<Option<CollectionRoute>> {
        let row = sqlx::query_as::<_, CollectionRoute>(
            r#"
            SELECT id, manager_id, route_date, status, total_collected, total_expenses, net_amount, created_at, updated_at
            FROM collection_routes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn add_item(&self, item: &CollectionRouteItem) -> Result<CollectionRouteItem> {
        let row = sqlx::query_as::<_, CollectionRouteItem>(
            r#"
            INSERT INTO collection_route_items (id, route_id, sub_loan_id, amount_due, amount_collected, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, route_id, sub_loan_id, amount_due, amount_collected, created_at
            "#,
        )
        .bind(item.id)
        .bind(item.route_id)
        .bind(item.sub_loan_id)
        .bind(item.amount_due)
        .bind(item.amount_collected)
        .bind(item.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn add_expense(&self, expense: &RouteExpense) -> Result<RouteExpense> {
        let row = sqlx::query_as::<_, RouteExpense>(
            r#"
            INSERT INTO route_expenses (id, route_id, amount, description, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, route_id, amount, description, created_at
            "#,
        )
        .bind(expense.id)
        .bind(expense.route_id)
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_items(&self, route_id: Uuid) -> Result<Vec<CollectionRouteItem>> {
        let rows = sqlx::query_as::<_, CollectionRouteItem>(
            r#"
            SELECT id, route_id, sub_loan_id, amount_due, amount_collected, created_at
            FROM collection_route_items
            WHERE route_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(route_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Re-syncs `amount_collected` from the installment's `paid_amount` on
    /// every item of an ACTIVE route referencing it. Returns the ids of the
    /// routes whose totals now need recomputing.
    pub async fn sync_items_for_sub_loan(
        conn: &mut PgConnection,
        sub_loan_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE collection_route_items AS items
            SET amount_collected = sl.paid_amount
            FROM sub_loans sl, collection_routes r
            WHERE items.sub_loan_id = sl.id
              AND items.route_id = r.id
              AND items.sub_loan_id = $1
              AND r.status = 'ACTIVE'
            RETURNING items.route_id
            "#,
        )
        .bind(sub_loan_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut route_ids: Vec<Uuid> = rows.into_iter().map(|(id,)| id).collect();
        route_ids.sort();
        route_ids.dedup();
        Ok(route_ids)
    }

    /// Recomputes a route's derived sums from its items' linked installments
    /// and its expenses.
    pub async fn recompute_totals(
        conn: &mut PgConnection,
        route_id: Uuid,
    ) -> Result<CollectionRoute> {
        let row = sqlx::query_as::<_, CollectionRoute>(
            r#"
            UPDATE collection_routes
            SET total_collected = COALESCE((
                    SELECT SUM(sl.paid_amount)
                    FROM collection_route_items i
                    JOIN sub_loans sl ON sl.id = i.sub_loan_id
                    WHERE i.route_id = $1
                ), 0),
                total_expenses = COALESCE((
                    SELECT SUM(e.amount)
                    FROM route_expenses e
                    WHERE e.route_id = $1
                ), 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, manager_id, route_date, status, total_collected, total_expenses, net_amount, created_at, updated_at
            "#,
        )
        .bind(route_id)
        .fetch_one(&mut *conn)
        .await?;

        // net_amount depends on the two sums just written.
        let row = sqlx::query_as::<_, CollectionRoute>(
            r#"
            UPDATE collection_routes
            SET net_amount = total_collected - total_expenses
            WHERE id = $1
            RETURNING id, manager_id, route_date, status, total_collected, total_expenses, net_amount, created_at, updated_at
            "#,
        )
        .bind(row.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row)
    }
}
