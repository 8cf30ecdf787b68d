use crate::error::StoreError;
use crate::models::{PropertyRecord, RecordFilter, RecordPredicate, ValidationSummary};
use crate::store::traits::{RecordStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Per-request server-side wait before the API returns `jobComplete = false`
const QUERY_TIMEOUT_MS: u64 = 20_000;

/// Column order used for inserts and table creation
const COLUMNS: &[(&str, &str)] = &[
    ("property_id", "STRING"),
    ("price", "FLOAT64"),
    ("sqft", "FLOAT64"),
    ("rooms", "INT64"),
    ("bathroom", "FLOAT64"),
    ("latitude", "FLOAT64"),
    ("longitude", "FLOAT64"),
    ("aes_score", "FLOAT64"),
    ("property_type", "STRING"),
    ("listing_urls", "STRING"),
    ("community", "STRING"),
    ("is_validated", "BOOL"),
    ("validated_by", "STRING"),
    ("validation_timestamp", "TIMESTAMP"),
];

/// Record store backed by a BigQuery table, driven through the REST `jobs.query` API
pub struct BigQueryStore {
    client: Client,
    base_url: String,
    project_id: String,
    table: String,
    access_token: String,
}

impl BigQueryStore {
    pub fn new(
        project_id: &str,
        dataset_id: &str,
        table_id: &str,
        access_token: &str,
    ) -> StoreResult<Self> {
        for (label, value) in [
            ("project", project_id),
            ("dataset", dataset_id),
            ("table", table_id),
        ] {
            if !is_identifier(value) {
                return Err(StoreError::Config(format!(
                    "invalid BigQuery {} identifier: {:?}",
                    label, value
                )));
            }
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: BIGQUERY_API_URL.to_string(),
            project_id: project_id.to_string(),
            table: format!("`{}.{}.{}`", project_id, dataset_id, table_id),
            access_token: access_token.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Run a query and collect every page of rows as column-name maps
    async fn query(&self, sql: &str, params: Vec<QueryParameter>) -> StoreResult<QueryOutput> {
        let endpoint = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            query_parameters: params,
            timeout_ms: QUERY_TIMEOUT_MS,
            format_options: FormatOptions {
                use_int64_timestamp: true,
            },
        };

        debug!(sql, "BigQuery query");

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;
        let mut page: QueryResponse = read_json(response).await?;
        if !page.job_complete {
            return Err(StoreError::Incomplete);
        }

        let affected_rows = page
            .num_dml_affected_rows
            .as_deref()
            .map(|n| {
                n.parse::<u64>()
                    .map_err(|_| StoreError::Decode(format!("bad affected row count: {}", n)))
            })
            .transpose()?;

        let schema = page.schema.take().unwrap_or_default();
        let mut rows = decode_rows(&schema, page.rows.take().unwrap_or_default())?;

        let job = page.job_reference.take();
        let mut token = page.page_token.take();
        while let (Some(page_token), Some(job)) = (token.take(), job.as_ref()) {
            let endpoint = format!(
                "{}/projects/{}/queries/{}",
                self.base_url, job.project_id, job.job_id
            );
            let mut request = self
                .client
                .get(&endpoint)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("pageToken", page_token.as_str()),
                    ("formatOptions.useInt64Timestamp", "true"),
                ]);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location.as_str())]);
            }

            let next: QueryResponse = read_json(request.send().await?).await?;
            if !next.job_complete {
                return Err(StoreError::Incomplete);
            }
            rows.extend(decode_rows(&schema, next.rows.unwrap_or_default())?);
            token = next.page_token;
        }

        Ok(QueryOutput {
            rows,
            affected_rows,
        })
    }
}

#[async_trait]
impl RecordStore for BigQueryStore {
    async fn fetch(&self, filter: &RecordFilter) -> StoreResult<Vec<PropertyRecord>> {
        let mut sql = format!("SELECT * FROM {}", self.table);
        if filter.predicate == RecordPredicate::Unvalidated {
            sql.push_str(" WHERE is_validated = FALSE");
        }
        let mut params = Vec::new();
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT @limit");
            let limit = i64::try_from(limit)
                .map_err(|_| StoreError::Config(format!("load limit {} is too large", limit)))?;
            params.push(QueryParameter::int("limit", limit));
        }

        let output = self.query(&sql, params).await?;
        let records = output
            .rows
            .into_iter()
            .map(|row| serde_json::from_value::<PropertyRecord>(Value::Object(row)))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Fetched {} records from BigQuery", records.len());
        Ok(records)
    }

    async fn update_validation(&self, ids: &[String], validator: &str) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE {} SET is_validated = TRUE, validated_by = @validator, \
             validation_timestamp = @validated_at WHERE property_id IN UNNEST(@ids)",
            self.table
        );
        let params = vec![
            QueryParameter::string("validator", Some(validator)),
            QueryParameter::timestamp("validated_at", Some(Utc::now())),
            QueryParameter::string_array("ids", ids),
        ];
        let output = self.query(&sql, params).await?;
        Ok(output.affected_rows.unwrap_or(0))
    }

    async fn delete(&self, property_id: &str) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE property_id = @id", self.table);
        let output = self
            .query(&sql, vec![QueryParameter::string("id", Some(property_id))])
            .await?;
        Ok(output.affected_rows.unwrap_or(0))
    }

    async fn fetch_summary(&self) -> StoreResult<ValidationSummary> {
        let sql = format!(
            "SELECT COUNT(*) AS total_rows, \
             SUM(CASE WHEN is_validated THEN 1 ELSE 0 END) AS validated_rows, \
             SUM(CASE WHEN NOT is_validated THEN 1 ELSE 0 END) AS unvalidated_rows \
             FROM {}",
            self.table
        );
        let output = self.query(&sql, Vec::new()).await?;
        let row = output
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("summary query returned no rows".to_string()))?;

        Ok(ValidationSummary {
            total: count_column(&row, "total_rows")?,
            validated: count_column(&row, "validated_rows")?,
            unvalidated: count_column(&row, "unvalidated_rows")?,
        })
    }

    async fn insert(&self, records: &[PropertyRecord]) -> StoreResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let (sql, params) = insert_statement(&self.table, records);
        let output = self.query(&sql, params).await?;
        let inserted = output.affected_rows.unwrap_or(0);
        if inserted != records.len() as u64 {
            warn!(
                "BigQuery reported {} inserted rows for {} records",
                inserted,
                records.len()
            );
        }
        Ok(inserted)
    }

    async fn ensure_table(&self) -> StoreResult<()> {
        let columns: Vec<String> = COLUMNS
            .iter()
            .map(|(name, ty)| {
                if *name == "property_id" {
                    format!("{} {} NOT NULL", name, ty)
                } else {
                    format!("{} {}", name, ty)
                }
            })
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.table,
            columns.join(", ")
        );
        self.query(&sql, Vec::new()).await?;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "bigquery"
    }
}

// -- wire types ---------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<QueryParameter>,
    timeout_ms: u64,
    format_options: FormatOptions,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FormatOptions {
    use_int64_timestamp: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: String,
    parameter_type: Value,
    parameter_value: Value,
}

impl QueryParameter {
    fn scalar(name: &str, ty: &str, value: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            parameter_type: json!({ "type": ty }),
            parameter_value: match value {
                Some(v) => json!({ "value": v }),
                None => json!({}),
            },
        }
    }

    fn string(name: &str, value: Option<&str>) -> Self {
        Self::scalar(name, "STRING", value.map(str::to_string))
    }

    fn int(name: &str, value: i64) -> Self {
        Self::scalar(name, "INT64", Some(value.to_string()))
    }

    fn float(name: &str, value: Option<f64>) -> Self {
        Self::scalar(name, "FLOAT64", value.map(|v| v.to_string()))
    }

    fn bool(name: &str, value: bool) -> Self {
        Self::scalar(name, "BOOL", Some(value.to_string()))
    }

    fn timestamp(name: &str, value: Option<DateTime<Utc>>) -> Self {
        Self::scalar(
            name,
            "TIMESTAMP",
            value.map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.6f+00:00").to_string()),
        )
    }

    fn string_array(name: &str, values: &[String]) -> Self {
        let values: Vec<Value> = values.iter().map(|v| json!({ "value": v })).collect();
        Self {
            name: name.to_string(),
            parameter_type: json!({ "type": "ARRAY", "arrayType": { "type": "STRING" } }),
            parameter_value: json!({ "arrayValues": values }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Option<Vec<TableRow>>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    num_dml_affected_rows: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableField>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableField {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Clone, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

struct QueryOutput {
    rows: Vec<Map<String, Value>>,
    affected_rows: Option<u64>,
}

async fn read_json(response: reqwest::Response) -> StoreResult<QueryResponse> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(StoreError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_str(&body)?)
}

// -- decoding -----------------------------------------------------------------

/// Turn positional `f`/`v` rows into maps keyed by column name with typed JSON values
fn decode_rows(schema: &TableSchema, rows: Vec<TableRow>) -> StoreResult<Vec<Map<String, Value>>> {
    rows.into_iter()
        .map(|row| -> StoreResult<Map<String, Value>> {
            if row.f.len() != schema.fields.len() {
                return Err(StoreError::Decode(format!(
                    "row has {} cells but schema has {} fields",
                    row.f.len(),
                    schema.fields.len()
                )));
            }
            schema
                .fields
                .iter()
                .zip(row.f)
                .map(|(field, cell)| -> StoreResult<(String, Value)> {
                    Ok((field.name.clone(), decode_cell(&field.ty, cell.v)?))
                })
                .collect::<StoreResult<Map<String, Value>>>()
        })
        .collect()
}

fn decode_cell(ty: &str, value: Value) -> StoreResult<Value> {
    let raw = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s,
        other => return Ok(other),
    };
    let bad = |what: &str| StoreError::Decode(format!("bad {} value: {}", what, raw));

    let decoded = match ty {
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => {
            let v: f64 = raw.parse().map_err(|_| bad("float"))?;
            json!(v)
        }
        "INTEGER" | "INT64" => {
            let v: i64 = raw.parse().map_err(|_| bad("integer"))?;
            json!(v)
        }
        "BOOLEAN" | "BOOL" => match raw.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(bad("boolean")),
        },
        "TIMESTAMP" => json!(parse_timestamp(&raw).ok_or_else(|| bad("timestamp"))?.to_rfc3339()),
        _ => Value::String(raw.clone()),
    };
    Ok(decoded)
}

/// Timestamps arrive as integer microseconds or, on older responses, float epoch seconds
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(micros) = raw.parse::<i64>() {
        return DateTime::<Utc>::from_timestamp_micros(micros);
    }
    let secs: f64 = raw.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn count_column(row: &Map<String, Value>, name: &str) -> StoreResult<u64> {
    match row.get(name) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().map(|f| f as u64))
            .ok_or_else(|| StoreError::Decode(format!("bad count in {}: {}", name, v))),
    }
}

fn insert_statement(table: &str, records: &[PropertyRecord]) -> (String, Vec<QueryParameter>) {
    let column_list: Vec<&str> = COLUMNS.iter().map(|(name, _)| *name).collect();
    let mut params = Vec::with_capacity(records.len() * COLUMNS.len());
    let mut tuples = Vec::with_capacity(records.len());

    for (i, r) in records.iter().enumerate() {
        let p = |col: &str| format!("r{}_{}", i, col);
        params.extend([
            QueryParameter::string(&p("property_id"), Some(&r.property_id)),
            QueryParameter::float(&p("price"), r.price),
            QueryParameter::float(&p("sqft"), r.sqft),
            QueryParameter::scalar(&p("rooms"), "INT64", r.rooms.map(|v| v.to_string())),
            QueryParameter::float(&p("bathroom"), r.bathroom),
            QueryParameter::float(&p("latitude"), r.latitude),
            QueryParameter::float(&p("longitude"), r.longitude),
            QueryParameter::float(&p("aes_score"), r.aes_score),
            QueryParameter::string(&p("property_type"), r.property_type.as_deref()),
            QueryParameter::string(&p("listing_urls"), r.listing_urls.as_deref()),
            QueryParameter::string(&p("community"), r.community.as_deref()),
            QueryParameter::bool(&p("is_validated"), r.is_validated),
            QueryParameter::string(&p("validated_by"), r.validated_by.as_deref()),
            QueryParameter::timestamp(&p("validation_timestamp"), r.validation_timestamp),
        ]);
        let placeholders: Vec<String> = column_list.iter().map(|c| format!("@{}", p(*c))).collect();
        tuples.push(format!("({})", placeholders.join(", ")));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        column_list.join(", "),
        tuples.join(", ")
    );
    (sql, params)
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
