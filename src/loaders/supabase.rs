use serde_json::{json, Value};

use crate::error::{PipelineError, Result};

/// Minimal Supabase PostgREST client: batched inserts, limited selects, and
/// a best-effort SQL side-channel. Constructed once and passed by reference;
/// there are no ambient globals.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    /// Insert a batch of rows. The table is append-only from this system's
    /// point of view; there is no upsert and no conflict handling.
    pub async fn insert_rows(&self, table: &str, rows: &[Value]) -> Result<()> {
        let response = self
            .auth(self.http.post(self.table_url(table)))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Select up to `limit` rows in the service's default order.
    pub async fn select_rows(&self, table: &str, limit: usize) -> Result<Vec<Value>> {
        let response = self
            .auth(self.http.get(self.table_url(table)))
            .query(&[("select", "*".to_string()), ("limit", limit.to_string())])
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json::<Vec<Value>>().await?)
    }

    /// Run a SQL statement through the `execute_sql` RPC. Only used for
    /// best-effort schema creation; callers tolerate failure.
    pub async fn execute_sql(&self, sql: &str) -> Result<()> {
        let url = format!("{}/rest/v1/rpc/execute_sql", self.base_url);
        let response = self
            .auth(self.http.post(url))
            .json(&json!({ "query": sql }))
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::Remote {
        status: status.as_u16(),
        body,
    })
}

/// Remote schema for the measurement table. The `id` column is the
/// system-assigned identity; the pipeline never supplies it.
pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS public.{} (\n\
             id BIGSERIAL PRIMARY KEY,\n\
             city TEXT,\n\
             time TIMESTAMP,\n\
             pm10 DOUBLE PRECISION,\n\
             pm2_5 DOUBLE PRECISION,\n\
             carbon_monoxide DOUBLE PRECISION,\n\
             nitrogen_dioxide DOUBLE PRECISION,\n\
             sulphur_dioxide DOUBLE PRECISION,\n\
             ozone DOUBLE PRECISION,\n\
             uv_index DOUBLE PRECISION,\n\
             aqi_category TEXT,\n\
             severity_score DOUBLE PRECISION,\n\
             risk_flag TEXT,\n\
             hour INTEGER\n\
         );",
        table
    )
}
