pub mod simulated;

use std::collections::BTreeMap;

use crate::error::{DeviceError, RecorderError};
use crate::tags::{ChannelDescriptor, IGNORE_TYPE, TagRegistry, TagSpec};

/// A value read from a device item. Resolved once per reading at this boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceValue {
    Float32(f32),
    Float64(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    /// Nothing could be read for the item
    Empty,
}

impl DeviceValue {
    /// Numeric value kept in frames: f64 passes through, f32 is widened,
    /// everything else is dropped. NaN and infinities count as non-numeric.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            DeviceValue::Float64(v) => *v,
            DeviceValue::Float32(v) => f64::from(*v),
            _ => return None,
        };
        value.is_finite().then_some(value)
    }
}

/// Discovers device items and opens connections to them
pub trait DeviceBrowser: Send + Sync {
    /// All raw item identifiers exposed by the device, in channel order
    fn browse(&self) -> Result<Vec<String>, DeviceError>;

    /// Open a connection covering the given items
    fn connect(&self, raw_ids: &[String]) -> Result<Box<dyn DeviceConnection>, DeviceError>;

    /// Name of this device for logging
    fn name(&self) -> &str;
}

/// An open session with the device. Calls may block on device I/O.
pub trait DeviceConnection: Send {
    fn write(&mut self, raw_id: &str, value: bool) -> Result<(), DeviceError>;

    fn read(&mut self, raw_id: &str) -> Result<DeviceValue, DeviceError>;
}

/// One channel's value at the current instant
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub display_name: String,
    pub semantic_type: String,
    pub value: DeviceValue,
}

impl Reading {
    pub fn new(descriptor: &ChannelDescriptor, value: DeviceValue) -> Self {
        Self {
            display_name: descriptor.display_name.clone(),
            semantic_type: descriptor.semantic_type.clone(),
            value,
        }
    }

    /// Whether this reading is mirrored to the sink
    pub fn forwards_to_sink(&self) -> bool {
        self.semantic_type != IGNORE_TYPE
    }
}

/// Configuration for creating device browsers
#[derive(Debug, Clone)]
pub enum DeviceConfig {
    /// In-process simulated acquisition unit
    Simulated {
        channels: usize,
        unreadable: Option<usize>,
    },
}

impl DeviceConfig {
    /// Create a device browser from this configuration
    pub fn create_browser(&self) -> Box<dyn DeviceBrowser> {
        match self {
            DeviceConfig::Simulated {
                channels,
                unreadable,
            } => Box::new(simulated::SimulatedDevice::new(*channels, *unreadable)),
        }
    }
}

/// Owns the device connection and the tag registry built for it
pub struct DeviceController {
    connection: Box<dyn DeviceConnection>,
    registry: TagRegistry,
    control_id: String,
}

impl DeviceController {
    /// Wrap an open connection. The registry must map the scan-control channel.
    pub fn new(
        connection: Box<dyn DeviceConnection>,
        registry: TagRegistry,
    ) -> Result<Self, RecorderError> {
        let control_id = registry
            .control()
            .map(|d| d.raw_identifier.clone())
            .ok_or_else(|| {
                RecorderError::Config("scan-control channel (index 0) not configured".into())
            })?;

        Ok(Self {
            connection,
            registry,
            control_id,
        })
    }

    /// Browse the device, connect to every item it exposes and map the configured tags
    pub fn connect(
        browser: &dyn DeviceBrowser,
        tags: &BTreeMap<usize, TagSpec>,
    ) -> Result<Self, RecorderError> {
        let raw_ids = browser.browse()?;
        tracing::info!("Found {} items on {}", raw_ids.len(), browser.name());

        let registry = TagRegistry::build(&raw_ids, tags)?;
        let connection = browser.connect(&raw_ids)?;

        Self::new(connection, registry)
    }

    /// Start the device's scanning process
    pub fn start_scanning(&mut self) -> Result<(), DeviceError> {
        self.connection.write(&self.control_id, true)
    }

    /// Stop the device's scanning process
    pub fn stop_scanning(&mut self) -> Result<(), DeviceError> {
        self.connection.write(&self.control_id, false)
    }

    /// Read every measurement channel in index order.
    ///
    /// A failed read does not abort the batch: the channel yields
    /// [`DeviceValue::Empty`] and is dropped later by the frame builder.
    pub fn read_all(&mut self) -> Vec<Reading> {
        let connection = &mut self.connection;

        self.registry
            .measurement_channels()
            .map(|descriptor| {
                let value = match connection.read(&descriptor.raw_identifier) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        DeviceValue::Empty
                    }
                };
                Reading::new(descriptor, value)
            })
            .collect()
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.registry.tag_names()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Calls observed by a [`FakeConnection`]
    #[derive(Debug, Default)]
    pub struct FakeLog {
        pub writes: Vec<(String, bool)>,
        pub reads: usize,
    }

    impl FakeLog {
        pub fn scan_writes(&self, value: bool) -> usize {
            self.writes.iter().filter(|(_, v)| *v == value).count()
        }
    }

    /// Scriptable connection used by controller and recorder tests
    pub struct FakeConnection {
        pub values: HashMap<String, Result<DeviceValue, DeviceError>>,
        pub fail_writes: bool,
        /// Fail only the write that switches scanning off
        pub fail_stop: bool,
        pub log: Arc<Mutex<FakeLog>>,
    }

    impl DeviceConnection for FakeConnection {
        fn write(&mut self, raw_id: &str, value: bool) -> Result<(), DeviceError> {
            if self.fail_writes || (self.fail_stop && !value) {
                return Err(DeviceError::Write {
                    item: raw_id.to_string(),
                    reason: "device offline".to_string(),
                });
            }
            self.log
                .lock()
                .unwrap()
                .writes
                .push((raw_id.to_string(), value));
            Ok(())
        }

        fn read(&mut self, raw_id: &str) -> Result<DeviceValue, DeviceError> {
            self.log.lock().unwrap().reads += 1;
            self.values
                .get(raw_id)
                .cloned()
                .unwrap_or(Ok(DeviceValue::Empty))
        }
    }

    /// Controller over channels `Scan` (0), `A` (1, f32 1.5), `B` (2, f64 2.25),
    /// `C` (3, unreadable), `D` (4, f64 7.0, ignored by the sink)
    pub fn fake_controller(fail_writes: bool) -> (DeviceController, Arc<Mutex<FakeLog>>) {
        build_fake(fail_writes, false)
    }

    /// Like [`fake_controller`], but only stopping the scan fails
    pub fn fake_controller_failing_stop() -> (DeviceController, Arc<Mutex<FakeLog>>) {
        build_fake(false, true)
    }

    fn build_fake(fail_writes: bool, fail_stop: bool) -> (DeviceController, Arc<Mutex<FakeLog>>) {
        let raw_ids: Vec<String> = (0..5).map(|i| format!("item{}", i)).collect();
        let tags = BTreeMap::from([
            (0, TagSpec::new("Scan", "ignore")),
            (1, TagSpec::new("A", "temperature")),
            (2, TagSpec::new("B", "voltage")),
            (3, TagSpec::new("C", "temperature")),
            (4, TagSpec::new("D", "ignore")),
        ]);
        let registry = TagRegistry::build(&raw_ids, &tags).unwrap();

        let log = Arc::new(Mutex::new(FakeLog::default()));
        let connection = FakeConnection {
            values: HashMap::from([
                ("item1".to_string(), Ok(DeviceValue::Float32(1.5))),
                ("item2".to_string(), Ok(DeviceValue::Float64(2.25))),
                (
                    "item3".to_string(),
                    Err(DeviceError::Read {
                        item: "item3".to_string(),
                        reason: "unreadable".to_string(),
                    }),
                ),
                ("item4".to_string(), Ok(DeviceValue::Float64(7.0))),
            ]),
            fail_writes,
            fail_stop,
            log: log.clone(),
        };

        let controller = DeviceController::new(Box::new(connection), registry).unwrap();
        (controller, log)
    }
}
