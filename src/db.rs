use anyhow::Context;
use chrono::{Duration, NaiveDate};
use sqlx::{PgPool, Row};

use crate::models::{CustomerAggregate, OrderRow};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let customers = vec![
        ("C-1001", 34, "Female", "USA", "2023-04-12"),
        ("C-1002", 27, "Male", "UK", "2024-01-08"),
        ("C-1003", 45, "Female", "Canada", "2022-11-30"),
        ("C-1004", 52, "Male", "USA", "2024-06-19"),
        ("C-1005", 23, "Female", "India", "2025-02-02"),
    ];

    for &(id, age, gender, country, signup) in &customers {
        let signup_date =
            NaiveDate::parse_from_str(signup, "%Y-%m-%d").context("invalid seed signup date")?;
        sqlx::query(
            r#"
            INSERT INTO storefront.customers (customer_id, age, gender, country, signup_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (customer_id) DO UPDATE
            SET age = EXCLUDED.age, gender = EXCLUDED.gender, country = EXCLUDED.country
            "#,
        )
        .bind(id)
        .bind(age)
        .bind(gender)
        .bind(country)
        .bind(signup_date)
        .execute(pool)
        .await?;
    }

    let products = vec![
        ("P-01", "Ceramic Mug", "Kitchen", 12.5),
        ("P-02", "Linen Throw", "Home", 48.0),
        ("P-03", "Desk Lamp", "Office", 35.0),
    ];

    for &(id, name, category, _) in &products {
        sqlx::query(
            r#"
            INSERT INTO storefront.products (product_id, product_name, category)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(category)
        .execute(pool)
        .await?;
    }

    // Ninety days of orders ending on the churn reference date. The mug sells
    // most days, the lamp only occasionally, and C-1004 cancels early.
    let last_day = NaiveDate::from_ymd_opt(2025, 9, 27).context("invalid seed date")?;
    let mut order_no = 0;
    for offset in 0..90i64 {
        let day = last_day - Duration::days(89 - offset);
        for (slot, &(product_id, _, _, unit_price)) in products.iter().enumerate() {
            let sells = match slot {
                0 => offset % 5 != 0,
                1 => offset % 3 == 0,
                _ => offset % 17 == 0,
            };
            if !sells {
                continue;
            }

            let (customer_id, ..) = customers[(offset as usize + slot) % customers.len()];
            let status = if customer_id == "C-1004" && offset > 30 {
                "cancelled"
            } else {
                "active"
            };
            order_no += 1;
            sqlx::query(
                r#"
                INSERT INTO storefront.orders
                (order_id, customer_id, product_id, last_purchase_date, quantity, unit_price,
                 ratings, cancellations_count, subscription_status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (order_id) DO NOTHING
                "#,
            )
            .bind(format!("seed-{order_no:05}"))
            .bind(customer_id)
            .bind(product_id)
            .bind(day)
            .bind(1 + (offset % 4) as i32)
            .bind(unit_price)
            .bind(3.0 + (offset % 3) as f64)
            .bind(i32::from(status == "cancelled"))
            .bind(status)
            .execute(pool)
            .await?;
        }
    }

    Ok(())
}

pub async fn fetch_customer_aggregates(pool: &PgPool) -> anyhow::Result<Vec<CustomerAggregate>> {
    let records = sqlx::query(
        r#"
        SELECT
            c.customer_id, c.age::float8 AS age, c.gender, c.country,
            MIN(c.signup_date)::text AS signup_date,
            MAX(o.last_purchase_date)::text AS last_purchase_date,
            COUNT(o.order_id)::float8 AS purchase_count,
            SUM(o.quantity)::float8 AS total_items_purchased,
            SUM(o.unit_price * o.quantity)::float8 AS total_spend,
            AVG(o.ratings)::float8 AS avg_rating,
            SUM(o.cancellations_count)::float8 AS total_cancellations,
            MAX(o.subscription_status) AS subscription_status
        FROM storefront.customers c
        JOIN storefront.orders o ON c.customer_id = o.customer_id
        GROUP BY c.customer_id, c.age, c.gender, c.country
        ORDER BY c.customer_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to aggregate customers")?;

    let mut customers = Vec::with_capacity(records.len());
    for row in records {
        customers.push(CustomerAggregate {
            customer_id: row.get("customer_id"),
            age: row.get("age"),
            gender: row.get("gender"),
            country: row.get("country"),
            signup_date: row.get("signup_date"),
            last_purchase_date: row.get("last_purchase_date"),
            purchase_count: row.get("purchase_count"),
            total_items_purchased: row.get("total_items_purchased"),
            total_spend: row.get("total_spend"),
            avg_rating: row.get("avg_rating"),
            total_cancellations: row.get("total_cancellations"),
            subscription_status: row.get("subscription_status"),
        });
    }

    Ok(customers)
}

/// Every customer on file, including those without orders. Only the profile
/// columns are filled.
pub async fn fetch_customers(pool: &PgPool) -> anyhow::Result<Vec<CustomerAggregate>> {
    let records = sqlx::query(
        r#"
        SELECT customer_id, age::float8 AS age, gender, country, signup_date::text AS signup_date
        FROM storefront.customers
        ORDER BY customer_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch customers")?;

    Ok(records
        .into_iter()
        .map(|row| CustomerAggregate {
            customer_id: row.get("customer_id"),
            age: row.get("age"),
            gender: row.get("gender"),
            country: row.get("country"),
            signup_date: row.get("signup_date"),
            ..Default::default()
        })
        .collect())
}

pub async fn fetch_orders(pool: &PgPool) -> anyhow::Result<Vec<OrderRow>> {
    let records = sqlx::query(
        r#"
        SELECT
            o.order_id, o.last_purchase_date AS order_date, o.product_id, p.product_name,
            o.quantity::float8 AS quantity, o.unit_price::float8 AS unit_price,
            o.customer_id, p.category, o.subscription_status
        FROM storefront.orders o
        JOIN storefront.products p ON p.product_id = o.product_id
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to fetch orders")?;

    let mut orders = Vec::with_capacity(records.len());
    for row in records {
        orders.push(OrderRow {
            order_id: row.get("order_id"),
            order_date: row.get("order_date"),
            product_id: row.get("product_id"),
            product_name: row.get("product_name"),
            quantity: row.get("quantity"),
            unit_price: row.get("unit_price"),
            customer_id: row.get("customer_id"),
            category: row.get("category"),
            subscription_status: row.get("subscription_status"),
        });
    }

    Ok(orders)
}
