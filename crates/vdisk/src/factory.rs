//! Logical volume factories and the process-wide factory registry.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::{Disk, LogicalVolumeInfo, PhysicalVolumeInfo};

/// Aggregates physical volumes into logical volumes.
///
/// Format crates (dynamic disks, LVM, …) implement this and register an
/// instance with [`register_logical_volume_factory`]; the volume manager
/// consults the registered set during every scan.
pub trait LogicalVolumeFactory: Send + Sync {
    /// Unique factory name; re-registering the same name is a no-op.
    fn name(&self) -> &'static str;

    /// Whether this factory claims `volume` as a member of one of its
    /// composite volumes. Claimed volumes are not passthrough-wrapped.
    fn handles_physical_volume(&self, volume: &PhysicalVolumeInfo) -> bool;

    /// Inserts (or overrides) composite logical volumes built from `disks`
    /// into `volumes`.
    fn map_disks(&self, disks: &[Disk], volumes: &mut IndexMap<String, LogicalVolumeInfo>);
}

type FactoryList = Arc<Vec<Arc<dyn LogicalVolumeFactory>>>;

/// Registry storage. The `Option` is the lazy-init marker; once populated,
/// the inner `Arc` is only ever replaced whole, so readers always observe an
/// immutable snapshot.
static REGISTRY: Mutex<Option<FactoryList>> = Mutex::new(None);

fn built_in_factories() -> Vec<Arc<dyn LogicalVolumeFactory>> {
    // The core ships no multi-disk volume formats; factories come from
    // format crates at registration time.
    Vec::new()
}

/// The current immutable factory snapshot, initialising the registry on
/// first use.
pub(crate) fn registered_factories() -> FactoryList {
    let mut guard = REGISTRY.lock();
    guard
        .get_or_insert_with(|| Arc::new(built_in_factories()))
        .clone()
}

/// Adds a factory to the process-wide registry.
///
/// Registration replaces the registry snapshot atomically, so scans already
/// holding the previous snapshot are unaffected. Registering a factory whose
/// name is already present is a no-op.
pub fn register_logical_volume_factory(factory: Arc<dyn LogicalVolumeFactory>) {
    let mut guard = REGISTRY.lock();
    let current = guard.get_or_insert_with(|| Arc::new(built_in_factories()));
    if current.iter().any(|f| f.name() == factory.name()) {
        log::trace!("logical volume factory {:?} already registered", factory.name());
        return;
    }
    log::debug!("registered logical volume factory {:?}", factory.name());
    let mut next = current.as_ref().clone();
    next.push(factory);
    *guard = Some(Arc::new(next));
}
