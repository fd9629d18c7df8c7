pub mod forwarder;
pub mod state;

pub use state::SharedState;
