use sqlx::{FromRow, PgPool};

use super::dto::Stats;

#[derive(Debug, FromRow)]
pub struct StatsRow {
    pub total_debt: f64,
    pub total_income: f64,
    pub debt_count: i64,
    pub income_sources_count: i64,
}

impl From<StatsRow> for Stats {
    fn from(r: StatsRow) -> Self {
        Self {
            debt_to_income_ratio: debt_to_income_ratio(r.total_debt, r.total_income),
            total_debt: r.total_debt,
            total_income: r.total_income,
            debt_count: r.debt_count,
            income_sources_count: r.income_sources_count,
        }
    }
}

/// Zero when there is no income.
pub fn debt_to_income_ratio(debt: f64, income: f64) -> f64 {
    if income == 0.0 {
        0.0
    } else {
        debt / income
    }
}

/// Only debts with status `active` count.
pub async fn stats_for_user(db: &PgPool, user_id: i32) -> Result<StatsRow, sqlx::Error> {
    sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT
            COALESCE((SELECT SUM(amount) FROM debts
                      WHERE user_id = $1 AND status = 'active'), 0)::float8 AS total_debt,
            COALESCE((SELECT SUM(amount) FROM income_sources
                      WHERE user_id = $1), 0)::float8 AS total_income,
            (SELECT COUNT(*) FROM debts
             WHERE user_id = $1 AND status = 'active') AS debt_count,
            (SELECT COUNT(*) FROM income_sources
             WHERE user_id = $1) AS income_sources_count
        "#,
    )
    .bind(user_id)
    .fetch_one(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_is_zero_without_income() {
        assert_eq!(debt_to_income_ratio(1200.0, 0.0), 0.0);
    }

    #[test]
    fn stats_row_computes_ratio() {
        let stats = Stats::from(StatsRow {
            total_debt: 500.0,
            total_income: 2000.0,
            debt_count: 2,
            income_sources_count: 1,
        });
        assert_eq!(stats.debt_to_income_ratio, 0.25);
        assert_eq!(stats.debt_count, 2);
    }
}
