use anyhow::Result;
use async_trait::async_trait;
use decision_core::{Claim, EngineError, Round, RoundArtifact, RoundSink};

/// SQLite-backed round history plus the agent's key-value state.
pub struct RoundStore {
    pool: sqlx::AnyPool,
}

fn persistence(e: impl std::fmt::Display) -> EngineError {
    EngineError::Persistence(e.to_string())
}

impl RoundStore {
    pub fn new(pool: sqlx::AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &sqlx::AnyPool {
        &self.pool
    }

    /// Create all tables. Safe to call on every start.
    pub async fn init_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS rounds (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                status TEXT NOT NULL,
                claims_count INTEGER NOT NULL DEFAULT 0,
                orders_count INTEGER NOT NULL DEFAULT 0,
                total_pnl REAL NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS round_claims (
                round_id TEXT NOT NULL,
                claim_id TEXT NOT NULL,
                ticker TEXT NOT NULL,
                role TEXT NOT NULL,
                call TEXT NOT NULL,
                direction TEXT,
                magnitude REAL,
                confidence REAL NOT NULL,
                verified INTEGER NOT NULL,
                evidence_ids TEXT NOT NULL,
                PRIMARY KEY (round_id, claim_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS round_consensus (
                round_id TEXT NOT NULL,
                ticker TEXT NOT NULL,
                avg_confidence REAL NOT NULL,
                coverage REAL NOT NULL,
                liquidity REAL NOT NULL,
                final_score REAL NOT NULL,
                PRIMARY KEY (round_id, ticker)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS round_orders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                round_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                notional REAL NOT NULL,
                order_id TEXT,
                error TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS round_artifacts (
                round_id TEXT PRIMARY KEY,
                artifact TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_round_orders_round ON round_orders(round_id)")
            .execute(&self.pool)
            .await
            .ok();
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rounds_started ON rounds(started_at)")
            .execute(&self.pool)
            .await
            .ok();

        Ok(())
    }

    pub async fn save_state(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_state (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_state(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM agent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn save_metrics(&self, metrics_json: &serde_json::Value) -> Result<()> {
        let json_str = serde_json::to_string(metrics_json)?;
        self.save_state("engine_metrics", &json_str).await
    }

    pub async fn load_metrics(&self) -> Result<Option<serde_json::Value>> {
        match self.load_state("engine_metrics").await? {
            Some(s) => Ok(serde_json::from_str(&s).ok()),
            None => Ok(None),
        }
    }

    /// Status string of a recorded round
    pub async fn round_status(&self, round_id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM rounds WHERE id = ?")
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(s,)| s))
    }

    pub async fn load_artifact(&self, round_id: &str) -> Result<Option<RoundArtifact>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT artifact FROM round_artifacts WHERE round_id = ?")
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Orders recorded for a round as (symbol, side, notional), in submission order
    pub async fn round_orders(&self, round_id: &str) -> Result<Vec<(String, String, f64)>> {
        let rows: Vec<(String, String, f64)> =
            sqlx::query_as("SELECT symbol, side, notional FROM round_orders WHERE round_id = ? ORDER BY id")
                .bind(round_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn upsert_round(&self, round: &Round) -> Result<()> {
        sqlx::query(
            "INSERT INTO rounds (id, started_at, ended_at, status, claims_count, orders_count, total_pnl)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
              ended_at = excluded.ended_at,
              status = excluded.status,
              claims_count = excluded.claims_count,
              orders_count = excluded.orders_count,
              total_pnl = excluded.total_pnl",
        )
        .bind(round.id.to_string())
        .bind(round.started_at.to_rfc3339())
        .bind(round.ended_at.map(|t| t.to_rfc3339()))
        .bind(round.status.as_str())
        .bind(round.claims_count as i64)
        .bind(round.orders_count as i64)
        .bind(round.total_pnl)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_claims(&self, round_id: &str, claims: &[Claim], verified: bool) -> Result<()> {
        for claim in claims {
            sqlx::query(
                "INSERT INTO round_claims (round_id, claim_id, ticker, role, call, direction, magnitude, confidence, verified, evidence_ids)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(round_id, claim_id) DO NOTHING",
            )
            .bind(round_id)
            .bind(&claim.id)
            .bind(&claim.ticker)
            .bind(claim.role.as_str())
            .bind(claim.call.as_str())
            .bind(claim.direction.map(|d| d.as_str()))
            .bind(claim.magnitude)
            .bind(claim.confidence)
            .bind(verified as i64)
            .bind(serde_json::to_string(&claim.evidence_ids)?)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn insert_artifact(&self, artifact: &RoundArtifact) -> Result<()> {
        let round_id = artifact.round.id.to_string();

        for record in &artifact.consensus {
            sqlx::query(
                "INSERT INTO round_consensus (round_id, ticker, avg_confidence, coverage, liquidity, final_score)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(round_id, ticker) DO UPDATE SET
                  avg_confidence = excluded.avg_confidence,
                  coverage = excluded.coverage,
                  liquidity = excluded.liquidity,
                  final_score = excluded.final_score",
            )
            .bind(&round_id)
            .bind(&record.ticker)
            .bind(record.avg_confidence)
            .bind(record.coverage)
            .bind(record.liquidity)
            .bind(record.final_score)
            .execute(&self.pool)
            .await?;
        }

        for order in &artifact.orders {
            sqlx::query(
                "INSERT INTO round_orders (round_id, symbol, side, notional, order_id, error)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&round_id)
            .bind(&order.symbol)
            .bind(order.side.as_str())
            .bind(order.notional)
            .bind(order.order_id.as_deref())
            .bind(order.error.as_deref())
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            "INSERT INTO round_artifacts (round_id, artifact, created_at) VALUES (?, ?, ?)
             ON CONFLICT(round_id) DO UPDATE SET artifact = excluded.artifact, created_at = excluded.created_at",
        )
        .bind(&round_id)
        .bind(serde_json::to_string(artifact)?)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RoundSink for RoundStore {
    async fn start_round(&self, round: &Round) -> Result<(), EngineError> {
        self.upsert_round(round).await.map_err(persistence)
    }

    async fn record_claims(&self, round: &Round, verified: &[Claim], rejected: &[Claim]) -> Result<(), EngineError> {
        let round_id = round.id.to_string();
        self.insert_claims(&round_id, verified, true).await.map_err(persistence)?;
        self.insert_claims(&round_id, rejected, false).await.map_err(persistence)
    }

    async fn record_artifact(&self, artifact: &RoundArtifact) -> Result<(), EngineError> {
        self.insert_artifact(artifact).await.map_err(persistence)
    }

    async fn end_round(&self, round: &Round) -> Result<(), EngineError> {
        self.upsert_round(round).await.map_err(persistence)
    }
}
