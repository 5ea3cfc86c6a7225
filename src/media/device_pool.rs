use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::media::MediaDevices;

/// Shared claim on a physical capture device.
///
/// Every track captured from a device holds a clone; the backend is told to
/// release the device when the last clone is dropped.
#[derive(Clone)]
pub struct DeviceLease {
    inner: Arc<LeaseInner>,
}

impl DeviceLease {
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }
}

impl std::fmt::Debug for DeviceLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DeviceLease").field(&self.inner.device_id).finish()
    }
}

struct LeaseInner {
    device_id: String,
    devices: Weak<dyn MediaDevices>,
}

impl Drop for LeaseInner {
    fn drop(&mut self) {
        if let Some(devices) = self.devices.upgrade() {
            devices.release_device(&self.device_id);
        }
    }
}

/// Weak registry of device leases keyed by device id.
pub struct DevicePool {
    devices: Weak<dyn MediaDevices>,
    leases: Mutex<HashMap<String, Weak<LeaseInner>>>,
}

impl DevicePool {
    #[must_use]
    pub fn new(devices: &Arc<dyn MediaDevices>) -> Self {
        Self {
            devices: Arc::downgrade(devices),
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Joins the live lease for `device_id`, or opens a new one.
    pub fn lease(&self, device_id: &str) -> DeviceLease {
        let mut leases = self.leases.lock();
        leases.retain(|_, weak| weak.strong_count() > 0);
        if let Some(inner) = leases.get(device_id).and_then(Weak::upgrade) {
            return DeviceLease { inner };
        }
        let inner = Arc::new(LeaseInner {
            device_id: device_id.to_owned(),
            devices: self.devices.clone(),
        });
        leases.insert(device_id.to_owned(), Arc::downgrade(&inner));
        DeviceLease { inner }
    }

    #[must_use]
    pub fn in_use(&self, device_id: &str) -> bool {
        self.leases
            .lock()
            .get(device_id)
            .is_some_and(|weak| weak.strong_count() > 0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::sim::SimMediaDevices;

    #[test]
    fn device_released_after_last_lease() {
        let sim = Arc::new(SimMediaDevices::with_default_catalog());
        let devices: Arc<dyn MediaDevices> = sim.clone();
        let pool = DevicePool::new(&devices);

        let a = pool.lease("mic-1");
        let b = pool.lease("mic-1");
        assert!(pool.in_use("mic-1"));

        drop(a);
        assert!(sim.released_devices().is_empty());

        drop(b);
        assert_eq!(sim.released_devices(), vec!["mic-1".to_owned()]);
        assert!(!pool.in_use("mic-1"));
    }

    #[test]
    fn new_lease_after_release_is_fresh() {
        let sim = Arc::new(SimMediaDevices::with_default_catalog());
        let devices: Arc<dyn MediaDevices> = sim.clone();
        let pool = DevicePool::new(&devices);

        drop(pool.lease("cam-1"));
        let again = pool.lease("cam-1");
        assert_eq!(again.device_id(), "cam-1");
        drop(again);
        assert_eq!(sim.released_devices().len(), 2);
    }
}
