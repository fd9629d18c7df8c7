pub mod frames;
pub mod recording;

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use crate::device::testing::fake_controller;
    use crate::recorder::{Recorder, RecorderConfig};
    use crate::service::SharedState;
    use crate::service::state::create_shared_state;

    pub fn test_state() -> SharedState {
        let (controller, _log) = fake_controller(false);
        let config = RecorderConfig {
            source_name: "test-daq".to_string(),
            poll_interval: Duration::from_millis(20),
            warmup_delay: Duration::ZERO,
        };
        create_shared_state(Recorder::new(config, controller, None))
    }
}
