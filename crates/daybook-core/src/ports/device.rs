//! Device conditions port
//!
//! Background jobs declare constraints (network, idle); the job runner asks
//! this port whether they currently hold.

/// Port trait for device state checks
#[async_trait::async_trait]
pub trait IDeviceConditions: Send + Sync {
    /// Whether a network connection is available
    async fn is_network_connected(&self) -> bool;

    /// Whether the device is idle enough for background work
    async fn is_device_idle(&self) -> bool;
}
