use super::{DeviceBrowser, DeviceConnection, DeviceValue};
use crate::error::DeviceError;

/// Simulated acquisition unit with a scan-control flag on channel 0
pub struct SimulatedDevice {
    channels: usize,
    unreadable: Option<usize>,
}

impl SimulatedDevice {
    pub fn new(channels: usize, unreadable: Option<usize>) -> Self {
        Self {
            channels: channels.max(1),
            unreadable,
        }
    }

    fn item_name(index: usize) -> String {
        format!("Channel_{:03}", index)
    }
}

impl DeviceBrowser for SimulatedDevice {
    fn browse(&self) -> Result<Vec<String>, DeviceError> {
        Ok((0..self.channels).map(Self::item_name).collect())
    }

    fn connect(&self, raw_ids: &[String]) -> Result<Box<dyn DeviceConnection>, DeviceError> {
        if raw_ids.is_empty() {
            return Err(DeviceError::Connect("no items requested".into()));
        }

        tracing::info!("Simulated device connected with {} items", raw_ids.len());

        Ok(Box::new(SimulatedConnection {
            items: raw_ids.to_vec(),
            unreadable: self.unreadable.map(Self::item_name),
            scanning: false,
            samples: 0,
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedConnection {
    items: Vec<String>,
    unreadable: Option<String>,
    scanning: bool,
    samples: u64,
}

impl SimulatedConnection {
    fn position(&self, raw_id: &str) -> Result<usize, DeviceError> {
        self.items
            .iter()
            .position(|item| item == raw_id)
            .ok_or_else(|| DeviceError::Read {
                item: raw_id.to_string(),
                reason: "unknown item".to_string(),
            })
    }
}

impl DeviceConnection for SimulatedConnection {
    fn write(&mut self, raw_id: &str, value: bool) -> Result<(), DeviceError> {
        let position = self.position(raw_id).map_err(|_| DeviceError::Write {
            item: raw_id.to_string(),
            reason: "unknown item".to_string(),
        })?;

        if position != 0 {
            return Err(DeviceError::Write {
                item: raw_id.to_string(),
                reason: "item is read-only".to_string(),
            });
        }

        self.scanning = value;
        tracing::debug!("Simulated scanning set to {}", value);
        Ok(())
    }

    fn read(&mut self, raw_id: &str) -> Result<DeviceValue, DeviceError> {
        let position = self.position(raw_id)?;
        if position == 0 {
            return Ok(DeviceValue::Bool(self.scanning));
        }
        if !self.scanning {
            return Ok(DeviceValue::Empty);
        }

        // Open thermocouple inputs report a marker string instead of a number
        if self.unreadable.as_deref() == Some(raw_id) {
            return Ok(DeviceValue::Text("OPEN".to_string()));
        }

        self.samples += 1;

        // Every seventh item is a totalizer counter
        if position % 7 == 0 {
            return Ok(DeviceValue::Int(self.samples as i64));
        }

        let phase = self.samples as f64 * 0.05 + position as f64;
        let value = 20.0 + position as f64 + phase.sin();

        // Odd channels report single precision like thermocouple inputs
        if position % 2 == 1 {
            Ok(DeviceValue::Float32(value as f32))
        } else {
            Ok(DeviceValue::Float64(value))
        }
    }
}
