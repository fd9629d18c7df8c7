pub mod influx;
pub mod point;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SinkError;

pub use point::Point;

/// Organization owning the destination bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

/// Destination bucket for written points
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub id: String,
    pub name: String,
}

/// Client for a time-series backend
#[async_trait]
pub trait SinkClient: Send + Sync {
    /// Look up an organization by name
    async fn find_org(&self, name: &str) -> Result<Organization, SinkError>;

    /// Look up a bucket in the organization, creating it when absent
    async fn find_or_create_bucket(
        &self,
        org: &Organization,
        name: &str,
    ) -> Result<Bucket, SinkError>;

    /// Open an asynchronous point writer for the bucket
    fn writer(&self, org: &Organization, bucket: &Bucket) -> Box<dyn PointWriter>;
}

/// Buffered, asynchronous point writer
#[async_trait]
pub trait PointWriter: Send {
    /// Queue a point without waiting for it to be sent
    fn write(&mut self, point: Point);

    /// Send every point queued so far, or report why that failed
    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Release the writer
    async fn close(self: Box<Self>) -> Result<(), SinkError>;
}

/// Sink destination a recording session writes to
#[derive(Clone)]
pub struct SinkBinding {
    pub client: Arc<dyn SinkClient>,
    pub org: String,
    pub bucket: String,
}

impl std::fmt::Debug for SinkBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkBinding")
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Everything a [`FakeSink`] and its writers observed
    #[derive(Debug, Default)]
    pub struct FakeSinkLog {
        pub points: Vec<Point>,
        pub created_buckets: Vec<String>,
        pub writers_opened: usize,
        pub flushes: usize,
        pub closes: usize,
    }

    /// In-memory sink with one known organization and bucket
    pub struct FakeSink {
        pub org: String,
        pub bucket: String,
        pub fail_bucket_creation: bool,
        pub fail_flush: bool,
        /// Delay before answering an organization lookup
        pub org_delay: Option<std::time::Duration>,
        pub log: Arc<Mutex<FakeSinkLog>>,
    }

    impl FakeSink {
        pub fn new(org: &str, bucket: &str) -> Self {
            Self {
                org: org.to_string(),
                bucket: bucket.to_string(),
                fail_bucket_creation: false,
                fail_flush: false,
                org_delay: None,
                log: Arc::new(Mutex::new(FakeSinkLog::default())),
            }
        }
    }

    #[async_trait]
    impl SinkClient for FakeSink {
        async fn find_org(&self, name: &str) -> Result<Organization, SinkError> {
            if let Some(delay) = self.org_delay {
                tokio::time::sleep(delay).await;
            }
            if name != self.org {
                return Err(SinkError::OrgNotFound(name.to_string()));
            }
            Ok(Organization {
                id: "org-1".to_string(),
                name: name.to_string(),
            })
        }

        async fn find_or_create_bucket(
            &self,
            _org: &Organization,
            name: &str,
        ) -> Result<Bucket, SinkError> {
            if name != self.bucket {
                if self.fail_bucket_creation {
                    return Err(SinkError::BucketCreation("quota exceeded".to_string()));
                }
                self.log.lock().unwrap().created_buckets.push(name.to_string());
            }
            Ok(Bucket {
                id: "bucket-1".to_string(),
                name: name.to_string(),
            })
        }

        fn writer(&self, _org: &Organization, _bucket: &Bucket) -> Box<dyn PointWriter> {
            self.log.lock().unwrap().writers_opened += 1;
            Box::new(FakeWriter {
                pending: Vec::new(),
                fail_flush: self.fail_flush,
                log: self.log.clone(),
            })
        }
    }

    struct FakeWriter {
        pending: Vec<Point>,
        fail_flush: bool,
        log: Arc<Mutex<FakeSinkLog>>,
    }

    #[async_trait]
    impl PointWriter for FakeWriter {
        fn write(&mut self, point: Point) {
            self.pending.push(point);
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            let mut log = self.log.lock().unwrap();
            log.flushes += 1;
            if self.fail_flush {
                return Err(SinkError::WriterClosed);
            }
            log.points.append(&mut self.pending);
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<(), SinkError> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }
}
