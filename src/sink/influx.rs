//! InfluxDB 2.x sink built on the official client

use async_trait::async_trait;
use influxdb2::Client;
use influxdb2::api::buckets::ListBucketsRequest;
use influxdb2::api::organization::ListOrganizationRequest;
use influxdb2::models::PostBucketRequest;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{Bucket, Organization, Point, PointWriter, SinkClient};
use crate::error::SinkError;

/// Default number of points sent per write request
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Client for an InfluxDB 2.x server
#[derive(Debug, Clone)]
pub struct InfluxSink {
    client: Client,
    batch_size: usize,
}

impl InfluxSink {
    pub fn new(url: &str, token: &str, batch_size: usize) -> Self {
        tracing::debug!("Creating InfluxDB client: url={}", url);

        // Org and bucket are passed per request, the client default stays empty
        let client = Client::new(url.trim_end_matches('/'), "", token);

        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    async fn find_bucket(&self, org: &Organization, name: &str) -> Result<Option<Bucket>, SinkError> {
        let request = ListBucketsRequest {
            org_id: Some(org.id.clone()),
            name: Some(name.to_string()),
            ..ListBucketsRequest::default()
        };

        let buckets = self.client.list_buckets(Some(request)).await?;

        Ok(buckets
            .buckets
            .into_iter()
            .find(|b| b.name == name)
            .map(|b| Bucket {
                id: b.id.unwrap_or_default(),
                name: b.name,
            }))
    }
}

#[async_trait]
impl SinkClient for InfluxSink {
    async fn find_org(&self, name: &str) -> Result<Organization, SinkError> {
        let request = ListOrganizationRequest {
            org: Some(name.to_string()),
            ..ListOrganizationRequest::default()
        };

        let orgs = self.client.list_organizations(request).await?;

        orgs.orgs
            .into_iter()
            .find(|o| o.name == name)
            .map(|o| Organization {
                id: o.id.unwrap_or_default(),
                name: o.name,
            })
            .ok_or_else(|| SinkError::OrgNotFound(name.to_string()))
    }

    async fn find_or_create_bucket(
        &self,
        org: &Organization,
        name: &str,
    ) -> Result<Bucket, SinkError> {
        if let Some(bucket) = self.find_bucket(org, name).await? {
            return Ok(bucket);
        }

        tracing::info!("Creating {} bucket...", name);
        // No retention rules: keep data forever
        let request = PostBucketRequest::new(org.id.clone(), name.to_string());
        self.client
            .create_bucket(Some(request))
            .await
            .map_err(|e| SinkError::BucketCreation(e.to_string()))?;

        self.find_bucket(org, name)
            .await?
            .ok_or_else(|| SinkError::BucketCreation(format!("{} missing after create", name)))
    }

    fn writer(&self, org: &Organization, bucket: &Bucket) -> Box<dyn PointWriter> {
        tracing::info!("Opening writer for bucket {} ({})", bucket.name, bucket.id);
        let target = WriteTarget {
            client: self.client.clone(),
            org: org.name.clone(),
            bucket: bucket.name.clone(),
        };

        Box::new(InfluxPointWriter::spawn(target, self.batch_size))
    }
}

#[derive(Debug, Clone)]
struct WriteTarget {
    client: Client,
    org: String,
    bucket: String,
}

impl WriteTarget {
    async fn send(&self, lines: &[String]) -> Result<(), SinkError> {
        if lines.is_empty() {
            return Ok(());
        }

        self.client
            .write_line_protocol(&self.org, &self.bucket, lines.join("\n"))
            .await?;

        tracing::debug!("Wrote {} points to {}", lines.len(), self.bucket);
        Ok(())
    }
}

enum WriterCommand {
    Line(String),
    Flush(oneshot::Sender<Result<(), SinkError>>),
}

/// Point writer that batches lines in a background task
pub struct InfluxPointWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
    task: JoinHandle<()>,
}

impl InfluxPointWriter {
    fn spawn(target: WriteTarget, batch_size: usize) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut batch: Vec<String> = Vec::with_capacity(batch_size);
            let mut failure: Option<SinkError> = None;

            while let Some(command) = rx.recv().await {
                match command {
                    WriterCommand::Line(line) => {
                        batch.push(line);
                        if batch.len() >= batch_size {
                            if let Err(e) = target.send(&batch).await {
                                tracing::error!("Background write failed: {}", e);
                                failure = Some(e);
                            }
                            batch.clear();
                        }
                    }
                    WriterCommand::Flush(reply) => {
                        let result = match target.send(&batch).await {
                            Ok(()) => failure.take().map_or(Ok(()), Err),
                            Err(e) => Err(e),
                        };
                        batch.clear();
                        let _ = reply.send(result);
                    }
                }
            }

            // Writer closed: push out whatever is left
            if let Err(e) = target.send(&batch).await {
                tracing::error!("Final write failed: {}", e);
            }
        });

        Self { tx, task }
    }
}

#[async_trait]
impl PointWriter for InfluxPointWriter {
    fn write(&mut self, point: Point) {
        tracing::trace!("Queueing {} point", point.measurement());
        if self
            .tx
            .send(WriterCommand::Line(point.to_line_protocol()))
            .is_err()
        {
            tracing::warn!("Point dropped: writer task has exited");
        }
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(reply_tx))
            .map_err(|_| SinkError::WriterClosed)?;

        reply_rx.await.map_err(|_| SinkError::WriterClosed)?
    }

    async fn close(self: Box<Self>) -> Result<(), SinkError> {
        let InfluxPointWriter { tx, task } = *self;
        drop(tx);
        task.await.map_err(|_| SinkError::WriterClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Json;
    use axum::Router;
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use chrono::Utc;
    use serde_json::{Value, json};

    use super::*;

    #[derive(Default)]
    struct FakeInflux {
        buckets: Vec<String>,
        writes: Vec<(HashMap<String, String>, String)>,
        auth: Vec<String>,
    }

    type Shared = Arc<Mutex<FakeInflux>>;

    fn bucket_json(name: &str) -> Value {
        json!({"id": format!("b-{}", name), "name": name, "orgID": "o1", "retentionRules": []})
    }

    async fn orgs(
        State(state): State<Shared>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if let Some(auth) = headers.get("authorization") {
            state
                .lock()
                .unwrap()
                .auth
                .push(auth.to_str().unwrap().to_string());
        }
        match q.get("org").map(String::as_str) {
            Some("lab") => (
                StatusCode::OK,
                Json(json!({"orgs": [{"id": "o1", "name": "lab"}]})),
            ),
            Some("empty") => (StatusCode::OK, Json(json!({"orgs": []}))),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({"code": "not found", "message": "organization not found"})),
            ),
        }
    }

    async fn list_buckets(
        State(state): State<Shared>,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let state = state.lock().unwrap();
        let name = q.get("name").cloned().unwrap_or_default();
        let found: Vec<Value> = state
            .buckets
            .iter()
            .filter(|b| **b == name)
            .map(|b| bucket_json(b))
            .collect();
        Json(json!({ "buckets": found }))
    }

    async fn create_bucket(
        State(state): State<Shared>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let name = body["name"].as_str().unwrap_or_default().to_string();
        state.lock().unwrap().buckets.push(name.clone());
        (StatusCode::CREATED, Json(bucket_json(&name)))
    }

    async fn write(
        State(state): State<Shared>,
        Query(q): Query<HashMap<String, String>>,
        body: String,
    ) -> StatusCode {
        state.lock().unwrap().writes.push((q, body));
        StatusCode::NO_CONTENT
    }

    async fn serve_fake() -> (String, Shared) {
        let state: Shared = Arc::new(Mutex::new(FakeInflux::default()));
        let app = Router::new()
            .route("/api/v2/orgs", get(orgs))
            .route("/api/v2/buckets", get(list_buckets).post(create_bucket))
            .route("/api/v2/write", post(write))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/", addr), state)
    }

    #[tokio::test]
    async fn test_find_org() {
        let (url, state) = serve_fake().await;
        let sink = InfluxSink::new(&url, "secret", 10);

        let org = sink.find_org("lab").await.unwrap();
        assert_eq!(org.id, "o1");
        assert_eq!(state.lock().unwrap().auth, vec!["Token secret"]);

        let err = sink.find_org("empty").await.unwrap_err();
        assert!(matches!(err, SinkError::OrgNotFound(_)));

        // Server-side 404 surfaces as a client error
        assert!(sink.find_org("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_bucket_created_once() {
        let (url, state) = serve_fake().await;
        let sink = InfluxSink::new(&url, "secret", 10);
        let org = sink.find_org("lab").await.unwrap();

        let bucket = sink.find_or_create_bucket(&org, "daq").await.unwrap();
        assert_eq!(bucket.name, "daq");
        assert_eq!(bucket.id, "b-daq");
        let again = sink.find_or_create_bucket(&org, "daq").await.unwrap();
        assert_eq!(again.id, bucket.id);

        assert_eq!(state.lock().unwrap().buckets, vec!["daq"]);
    }

    #[tokio::test]
    async fn test_writer_flush_and_close() {
        let (url, state) = serve_fake().await;
        let sink = InfluxSink::new(&url, "secret", 2);
        let org = sink.find_org("lab").await.unwrap();
        let bucket = sink.find_or_create_bucket(&org, "daq").await.unwrap();

        let mut writer = sink.writer(&org, &bucket);
        let now = Utc::now();
        writer.write(Point::reading("temperature", "T1", 20.5, now));
        writer.write(Point::reading("temperature", "T2", 21.5, now));
        writer.write(Point::reading("voltage", "V1", 3.3, now));
        writer.flush().await.unwrap();

        {
            let state = state.lock().unwrap();
            // One full batch of two, then the flushed remainder
            assert_eq!(state.writes.len(), 2);
            let (query, body) = &state.writes[0];
            assert_eq!(query.get("org").map(String::as_str), Some("lab"));
            assert_eq!(query.get("bucket").map(String::as_str), Some("daq"));
            assert_eq!(body.lines().count(), 2);
            assert!(state.writes[1].1.starts_with("voltage,id=V1 voltage=3.3"));
        }

        writer.write(Point::reading("voltage", "V2", 5.0, now));
        writer.close().await.unwrap();
        assert_eq!(state.lock().unwrap().writes.len(), 3);
    }

    #[tokio::test]
    async fn test_flush_reports_write_failure() {
        // Nothing listens on this port
        let sink = InfluxSink::new("http://127.0.0.1:9", "secret", 10);
        let org = Organization {
            id: "o1".into(),
            name: "lab".into(),
        };
        let bucket = Bucket {
            id: "b1".into(),
            name: "daq".into(),
        };

        let mut writer = sink.writer(&org, &bucket);
        writer.write(Point::reading("temperature", "T1", 1.0, Utc::now()));
        assert!(writer.flush().await.is_err());
        writer.close().await.unwrap();
    }

    #[test]
    fn test_batch_size_at_least_one() {
        let sink = InfluxSink::new("http://localhost:8086/", "t", 0);
        assert_eq!(sink.batch_size, 1);
    }
}
