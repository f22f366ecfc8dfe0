use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::ops::Index;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::{Client, Error, Value};

/// Type alias used to represent [`Device`] IDs, which are unique among devices of the same type (e.g., CPUs, GPUs)
/// and, on multi-host environments, are also unique across all devices and all hosts.
pub type DeviceId = usize;

/// Type alias used to represent the index of the process (i.e., host) that a [`Device`] is attached to.
pub type ProcessIndex = usize;

/// Type alias used to represent replica IDs in [`DeviceAssignment`]s.
pub type ReplicaId = usize;

/// Type alias used to represent partition IDs in [`DeviceAssignment`]s.
pub type PartitionId = usize;

/// Physical device (e.g., a specific CPU, GPU, or TPU core) that executables can be placed on. Devices are owned by
/// the [`DeviceTable`] of the [`Client`] that they were registered with and are shared via [`Arc`]s.
///
/// Two devices are considered equal if they have the same [`Device::id`] and [`Device::kind`].
#[derive(Clone)]
pub struct Device {
    id: DeviceId,
    kind: String,
    process_index: ProcessIndex,
    local_hardware_id: Option<usize>,
    addressable: bool,
    attributes: HashMap<String, Value>,
}

impl Device {
    /// Creates a new addressable [`Device`] with the provided ID and kind, attached to process `0`.
    pub fn new<K: Into<String>>(id: DeviceId, kind: K) -> Self {
        Self {
            id,
            kind: kind.into(),
            process_index: 0,
            local_hardware_id: Some(id),
            addressable: true,
            attributes: HashMap::new(),
        }
    }

    /// Returns a copy of this [`Device`] attached to the provided process.
    pub fn with_process_index(mut self, process_index: ProcessIndex) -> Self {
        self.process_index = process_index;
        self
    }

    /// Returns a copy of this [`Device`] with the provided local hardware ID (e.g., a CUDA device number).
    pub fn with_local_hardware_id(mut self, local_hardware_id: Option<usize>) -> Self {
        self.local_hardware_id = local_hardware_id;
        self
    }

    /// Returns a copy of this [`Device`] with the provided addressability.
    pub fn with_addressable(mut self, addressable: bool) -> Self {
        self.addressable = addressable;
        self
    }

    /// Returns a copy of this [`Device`] with the provided attribute added.
    pub fn with_attribute<N: Into<String>, V: Into<Value>>(mut self, name: N, value: V) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// ID of this [`Device`].
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Kind of this [`Device`] (e.g., `"cpu"`, `"gpu"`, `"tpu"`).
    pub fn kind(&self) -> &str {
        self.kind.as_str()
    }

    /// Index of the process that this [`Device`] is attached to.
    pub fn process_index(&self) -> ProcessIndex {
        self.process_index
    }

    /// Opaque hardware ID of this [`Device`] on its host, if one is known.
    pub fn local_hardware_id(&self) -> Option<usize> {
        self.local_hardware_id
    }

    /// Returns `true` if this [`Device`] can be directly targeted by the [`Client`] that owns it. Devices that are
    /// attached to other hosts in multi-host environments are not addressable.
    pub fn is_addressable(&self) -> bool {
        self.addressable
    }

    /// Returns the attribute of this [`Device`] with the provided name.
    pub fn attribute<N: AsRef<str>>(&self, name: N) -> Result<&Value, Error> {
        let name = name.as_ref();
        self.attributes
            .get(name)
            .ok_or_else(|| Error::not_found(format!("attribute '{name}' not found for device '{self}'")))
    }

    /// Returns all attributes of this [`Device`].
    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }
}

impl Display for Device {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}(id={})", self.kind, self.id)
    }
}

impl Debug for Device {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Device[{}:{}, process={}]", self.kind, self.id, self.process_index)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.kind == other.kind
    }
}

impl Eq for Device {}

/// Table of all [`Device`]s known to a [`Client`], keyed by [`DeviceId`]. The table is append-only: devices are added
/// via [`DeviceTable::register`] (typically once, when the client starts up) and are never removed, while lookups
/// can happen concurrently from any number of threads.
#[derive(Default)]
pub struct DeviceTable {
    state: RwLock<DeviceTableState>,
}

#[derive(Default)]
struct DeviceTableState {
    devices: Vec<Arc<Device>>,
    indices: HashMap<DeviceId, usize>,
}

impl DeviceTable {
    /// Creates a new empty [`DeviceTable`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the provided [`Device`] with this table, returning the shared handle that lookups will return from
    /// now on. Returns an [`Error::AlreadyExists`] if a device with the same ID has already been registered.
    pub fn register(&self, device: Device) -> Result<Arc<Device>, Error> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = state.indices.get(&device.id).map(|index| &state.devices[*index]) {
            return Err(Error::already_exists(format!(
                "cannot register device '{device}' because device '{existing}' already has ID {}",
                device.id,
            )));
        }
        debug!(device_id = device.id, kind = device.kind.as_str(), "registering device");
        let device = Arc::new(device);
        let index = state.devices.len();
        state.indices.insert(device.id, index);
        state.devices.push(device.clone());
        Ok(device)
    }

    /// Returns the [`Device`] with the provided ID, if one has been registered.
    pub fn lookup(&self, id: DeviceId) -> Option<Arc<Device>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.indices.get(&id).map(|index| state.devices[*index].clone())
    }

    /// Returns all registered [`Device`]s, in registration order.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).devices.clone()
    }

    /// Returns all registered [`Device`]s that are addressable (refer to [`Device::is_addressable`]), in registration
    /// order.
    pub fn addressable_devices(&self) -> Vec<Arc<Device>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.devices.iter().filter(|device| device.is_addressable()).cloned().collect()
    }

    /// Number of registered [`Device`]s.
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).devices.len()
    }

    /// Returns `true` if no [`Device`]s have been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Debug for DeviceTable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_list().entries(self.devices().iter()).finish()
    }
}

/// Represents the [`Device`] assignment for a set of replicated and partitioned computations. Specifically, for `R`
/// replicas and `P` partitions, `R * P` [`Device`]s are required to execute the computation in parallel.
/// [`DeviceAssignment`]s hold the mapping from `(r, p)`, where `r` is a replica index and `p` is a partition index, to
/// the [`DeviceId`] of the [`Device`] on which the corresponding shard of the computation should be executed.
///
/// Indexing a [`DeviceAssignment`] with a `(replica, partition)` pair that is out of range panics. Use
/// [`DeviceAssignment::device_id`] for a fallible lookup.
///
/// The default [`DeviceAssignment`] for a given [`Client`] can be obtained using [`Client::default_device_assignment`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceAssignment {
    replica_count: usize,
    partition_count: usize,

    /// [`DeviceId`]s for all `(replica, partition)` pairs stored in row-major order.
    assignment: Vec<DeviceId>,
}

impl DeviceAssignment {
    /// Creates a new [`DeviceAssignment`] from the provided row-major list of [`DeviceId`]s. Returns an
    /// [`Error::InvalidArgument`] if the number of provided IDs does not match `replica_count * partition_count`.
    pub fn new<A: Into<Vec<DeviceId>>>(
        replica_count: usize,
        partition_count: usize,
        assignment: A,
    ) -> Result<Self, Error> {
        let assignment = assignment.into();
        if assignment.len() != replica_count * partition_count {
            return Err(Error::invalid_argument(format!(
                "expected {} device IDs for a device assignment with {replica_count} replica(s) and \
                 {partition_count} partition(s), but got {}",
                replica_count * partition_count,
                assignment.len(),
            )));
        }
        Ok(Self { replica_count, partition_count, assignment })
    }

    /// Creates a new [`DeviceAssignment`] where the device of each `(replica, partition)` pair is produced by `f`.
    pub fn from_fn<F: FnMut(ReplicaId, PartitionId) -> DeviceId>(
        replica_count: usize,
        partition_count: usize,
        mut f: F,
    ) -> Self {
        let mut assignment = Vec::with_capacity(replica_count * partition_count);
        for replica_id in 0..replica_count {
            for partition_id in 0..partition_count {
                assignment.push(f(replica_id, partition_id));
            }
        }
        Self { replica_count, partition_count, assignment }
    }

    /// Number of replicas that this [`DeviceAssignment`] has been computed for.
    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    /// Number of partitions that this [`DeviceAssignment`] has been computed for.
    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    /// Returns the [`DeviceId`] that replica `replica_id` of partition `partition_id` is assigned to or an
    /// [`Error::FailedPrecondition`] if any of the provided indices are out of range.
    pub fn device_id(&self, replica_id: ReplicaId, partition_id: PartitionId) -> Result<DeviceId, Error> {
        if replica_id >= self.replica_count {
            Err(Error::failed_precondition(format!(
                "replica ID {replica_id} is out of range for a device assignment with {} replica(s)",
                self.replica_count,
            )))
        } else if partition_id >= self.partition_count {
            Err(Error::failed_precondition(format!(
                "partition ID {partition_id} is out of range for a device assignment with {} partition(s)",
                self.partition_count,
            )))
        } else {
            Ok(self.assignment[replica_id * self.partition_count + partition_id])
        }
    }

    /// Returns the logical ID (i.e., the pair of replica ID and partition ID) assigned to the [`Device`] with the
    /// provided [`DeviceId`]. If multiple logical IDs are assigned to the same [`Device`] or if the provided
    /// [`DeviceId`] is not used by this [`DeviceAssignment`], then this function will return an [`Error::Internal`].
    pub fn logical_id(&self, device_id: DeviceId) -> Result<(ReplicaId, PartitionId), Error> {
        let mut logical_ids = self
            .assignment
            .iter()
            .enumerate()
            .filter(|(_, id)| **id == device_id)
            .map(|(index, _)| (index / self.partition_count, index % self.partition_count));
        match (logical_ids.next(), logical_ids.next()) {
            (Some(logical_id), None) => Ok(logical_id),
            (Some(_), Some(_)) => Err(Error::internal(format!("device {device_id} is assigned more than once"))),
            (None, _) => Err(Error::internal(format!("device {device_id} is not part of the device assignment"))),
        }
    }

    /// Returns the [`DeviceId`]s of this [`DeviceAssignment`] in row-major order.
    pub fn device_ids(&self) -> &[DeviceId] {
        self.assignment.as_slice()
    }

    /// Converts this [`DeviceAssignment`] to a Protobuf message. Note that the message stores the assignment one
    /// partition (i.e., computation) at a time.
    pub fn to_proto(&self) -> crate::protos::DeviceAssignment {
        let computation_devices = (0..self.partition_count)
            .map(|partition_id| crate::protos::ComputationDeviceAssignment {
                replica_device_ids: (0..self.replica_count)
                    .map(|replica_id| self[(replica_id, partition_id)] as i64)
                    .collect(),
            })
            .collect();
        crate::protos::DeviceAssignment {
            replica_count: self.replica_count as i32,
            computation_count: self.partition_count as i32,
            computation_devices,
        }
    }

    /// Converts the provided Protobuf message into a [`DeviceAssignment`]. Returns an [`Error::InvalidArgument`] if
    /// the message has negative counts, does not contain exactly one entry per computation and replica, or refers to
    /// negative device IDs.
    pub fn from_proto(proto: &crate::protos::DeviceAssignment) -> Result<Self, Error> {
        if proto.replica_count < 0 || proto.computation_count < 0 {
            return Err(Error::invalid_argument(format!(
                "invalid device assignment with {} replica(s) and {} computation(s)",
                proto.replica_count, proto.computation_count,
            )));
        }
        let replica_count = proto.replica_count as usize;
        let partition_count = proto.computation_count as usize;
        if proto.computation_devices.len() != partition_count {
            return Err(Error::invalid_argument(format!(
                "invalid device assignment; expected {partition_count} computation(s) but got {}",
                proto.computation_devices.len(),
            )));
        }
        let mut assignment = Vec::with_capacity(replica_count * partition_count);
        for replica_id in 0..replica_count {
            for (partition_id, computation) in proto.computation_devices.iter().enumerate() {
                if computation.replica_device_ids.len() != replica_count {
                    return Err(Error::invalid_argument(format!(
                        "invalid device assignment; expected {replica_count} replica(s) for computation \
                         {partition_id} but got {}",
                        computation.replica_device_ids.len(),
                    )));
                }
                let device_id = computation.replica_device_ids[replica_id];
                if device_id < 0 {
                    return Err(Error::invalid_argument(format!(
                        "invalid device ID {device_id} in device assignment",
                    )));
                }
                assignment.push(device_id as DeviceId);
            }
        }
        Ok(Self { replica_count, partition_count, assignment })
    }
}

impl Index<(ReplicaId, PartitionId)> for DeviceAssignment {
    type Output = DeviceId;

    fn index(&self, (replica_id, partition_id): (ReplicaId, PartitionId)) -> &Self::Output {
        assert!(
            replica_id < self.replica_count && partition_id < self.partition_count,
            "logical ID ({replica_id}, {partition_id}) is out of range for a device assignment with {} replica(s) \
             and {} partition(s)",
            self.replica_count,
            self.partition_count,
        );
        &self.assignment[replica_id * self.partition_count + partition_id]
    }
}

impl Display for DeviceAssignment {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "DeviceAssignment[{}x{}](", self.replica_count, self.partition_count)?;
        for replica_id in 0..self.replica_count {
            if replica_id > 0 {
                write!(formatter, ", ")?;
            }
            let row = &self.assignment[replica_id * self.partition_count..(replica_id + 1) * self.partition_count];
            write!(formatter, "{row:?}")?;
        }
        write!(formatter, ")")
    }
}

/// Resolves the first `replica_count` replicas and `partition_count` partitions of `assignment` to the [`Device`]s
/// registered in `table`. The result is indexed as `grid[replica_id][partition_id]`.
///
/// # Panics
///
/// Panics if the requested grid is larger than `assignment` or if any of the [`DeviceId`]s in the requested grid is
/// not registered in `table`. Both indicate a broken invariant between the compiler and the client rather than a
/// recoverable condition.
pub fn resolve_device_grid(
    assignment: &DeviceAssignment,
    table: &DeviceTable,
    replica_count: usize,
    partition_count: usize,
) -> Vec<Vec<Arc<Device>>> {
    assert!(
        replica_count <= assignment.replica_count() && partition_count <= assignment.partition_count(),
        "cannot resolve a {replica_count}x{partition_count} device grid from {assignment}",
    );
    (0..replica_count)
        .map(|replica_id| {
            (0..partition_count)
                .map(|partition_id| {
                    let device_id = assignment[(replica_id, partition_id)];
                    table.lookup(device_id).unwrap_or_else(|| {
                        panic!(
                            "device {device_id} assigned to replica {replica_id} and partition {partition_id} is not \
                             registered with the client",
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Resolves the devices of the first `replica_count` replicas of a single-partition `assignment`. This is equivalent
/// to [`resolve_device_grid`] with one partition, flattened.
///
/// # Panics
///
/// Panics under the same conditions as [`resolve_device_grid`].
pub fn resolve_replica_devices(
    assignment: &DeviceAssignment,
    table: &DeviceTable,
    replica_count: usize,
) -> Vec<Arc<Device>> {
    resolve_device_grid(assignment, table, replica_count, 1).into_iter().flatten().collect()
}

impl Client {
    /// Returns the default [`DeviceAssignment`] that the native client would use for a computation with the
    /// provided number of replicas and partitions.
    pub fn default_device_assignment(
        &self,
        replica_count: usize,
        partition_count: usize,
    ) -> Result<DeviceAssignment, Error> {
        self.native().default_device_assignment(replica_count, partition_count)
    }

    /// Returns the [`Device`]s of the default [`DeviceAssignment`] for the provided number of replicas and
    /// partitions, indexed as `grid[replica_id][partition_id]`.
    ///
    /// # Panics
    ///
    /// Panics if the native client assigns a device that is not registered with this [`Client`].
    pub fn default_device_grid(
        &self,
        replica_count: usize,
        partition_count: usize,
    ) -> Result<Vec<Vec<Arc<Device>>>, Error> {
        let assignment = self.default_device_assignment(replica_count, partition_count)?;
        Ok(resolve_device_grid(&assignment, self.device_table(), replica_count, partition_count))
    }

    /// Returns the [`Device`]s of the default single-partition [`DeviceAssignment`] for the provided number of
    /// replicas.
    ///
    /// # Panics
    ///
    /// Panics if the native client assigns a device that is not registered with this [`Client`].
    pub fn default_replica_devices(&self, replica_count: usize) -> Result<Vec<Arc<Device>>, Error> {
        let assignment = self.default_device_assignment(replica_count, 1)?;
        Ok(resolve_replica_devices(&assignment, self.device_table(), replica_count))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use crate::protos::{ComputationDeviceAssignment, DeviceAssignment as DeviceAssignmentProto};
    use crate::tests::test_client;
    use crate::{Device, DeviceAssignment, DeviceTable, Error, Value, resolve_device_grid, resolve_replica_devices};

    #[test]
    fn test_device() {
        let device = Device::new(3, "gpu")
            .with_process_index(1)
            .with_local_hardware_id(Some(0))
            .with_addressable(false)
            .with_attribute("compute_capability", "8.0")
            .with_attribute("core_count", 108i64);
        assert_eq!(device.id(), 3);
        assert_eq!(device.kind(), "gpu");
        assert_eq!(device.process_index(), 1);
        assert_eq!(device.local_hardware_id(), Some(0));
        assert!(!device.is_addressable());
        assert_eq!(device.attribute("core_count"), Ok(&Value::i64(108)));
        assert_eq!(device.attributes().len(), 2);
        assert!(matches!(
            device.attribute("__test__"),
            Err(Error::NotFound { message, .. }) if message == "attribute '__test__' not found for device 'gpu(id=3)'",
        ));
        assert_eq!(format!("{device}"), "gpu(id=3)");
        assert_eq!(format!("{device:?}"), "Device[gpu:3, process=1]");

        // Equality only considers the ID and the kind.
        assert_eq!(device, Device::new(3, "gpu"));
        assert_ne!(device, Device::new(3, "cpu"));
        assert_ne!(device, Device::new(4, "gpu"));
    }

    #[test]
    fn test_device_table() {
        let table = DeviceTable::new();
        assert!(table.is_empty());
        let device_0 = table.register(Device::new(0, "cpu")).unwrap();
        let device_1 = table.register(Device::new(1, "cpu").with_addressable(false)).unwrap();
        let device_7 = table.register(Device::new(7, "cpu")).unwrap();
        assert_eq!(table.len(), 3);
        assert!(Arc::ptr_eq(&table.lookup(1).unwrap(), &device_1));
        assert_eq!(table.lookup(2), None);
        assert_eq!(table.devices(), vec![device_0.clone(), device_1, device_7.clone()]);
        assert_eq!(table.addressable_devices(), vec![device_0, device_7]);
        assert!(matches!(
            table.register(Device::new(7, "gpu")),
            Err(Error::AlreadyExists { message, .. })
                if message == "cannot register device 'gpu(id=7)' because device 'cpu(id=7)' already has ID 7",
        ));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_device_table_concurrent_access() {
        let table = DeviceTable::new();
        std::thread::scope(|scope| {
            for thread_index in 0..4 {
                let table = &table;
                scope.spawn(move || {
                    for offset in 0..16 {
                        let id = thread_index * 16 + offset;
                        table.register(Device::new(id, "cpu")).unwrap();
                        assert_eq!(table.lookup(id).map(|device| device.id()), Some(id));
                    }
                });
            }
        });
        assert_eq!(table.len(), 64);
        assert!((0..64).all(|id| table.lookup(id).is_some()));
    }

    #[test]
    fn test_device_assignment() {
        let assignment = DeviceAssignment::new(2, 3, vec![0, 1, 2, 3, 4, 5]).unwrap();
        assert_eq!(assignment.replica_count(), 2);
        assert_eq!(assignment.partition_count(), 3);
        assert_eq!(assignment[(0, 2)], 2);
        assert_eq!(assignment[(1, 0)], 3);
        assert_eq!(assignment.device_id(1, 2), Ok(5));
        assert!(matches!(assignment.device_id(2, 0), Err(Error::FailedPrecondition { .. })));
        assert!(matches!(assignment.device_id(0, 3), Err(Error::FailedPrecondition { .. })));
        assert_eq!(assignment.logical_id(4), Ok((1, 1)));
        assert!(matches!(assignment.logical_id(6), Err(Error::Internal { .. })));
        assert_eq!(format!("{assignment}"), "DeviceAssignment[2x3]([0, 1, 2], [3, 4, 5])");
        assert_eq!(DeviceAssignment::from_fn(2, 3, |replica, partition| replica * 3 + partition), assignment);

        let duplicated = DeviceAssignment::new(2, 1, vec![4, 4]).unwrap();
        assert!(matches!(duplicated.logical_id(4), Err(Error::Internal { .. })));

        assert!(matches!(
            DeviceAssignment::new(2, 2, vec![0, 1, 2]),
            Err(Error::InvalidArgument { message, .. })
                if message == "expected 4 device IDs for a device assignment with 2 replica(s) and 2 partition(s), \
                    but got 3",
        ));
    }

    #[test]
    #[should_panic(expected = "logical ID (2, 0) is out of range")]
    fn test_device_assignment_index_out_of_range() {
        let assignment = DeviceAssignment::new(2, 1, vec![0, 1]).unwrap();
        let _ = assignment[(2, 0)];
    }

    #[test]
    fn test_device_assignment_proto() {
        let assignment = DeviceAssignment::new(2, 3, vec![0, 1, 2, 3, 4, 5]).unwrap();
        let proto = assignment.to_proto();
        assert_eq!(
            proto,
            DeviceAssignmentProto {
                replica_count: 2,
                computation_count: 3,
                computation_devices: vec![
                    ComputationDeviceAssignment { replica_device_ids: vec![0, 3] },
                    ComputationDeviceAssignment { replica_device_ids: vec![1, 4] },
                    ComputationDeviceAssignment { replica_device_ids: vec![2, 5] },
                ],
            },
        );
        assert_eq!(DeviceAssignment::from_proto(&proto), Ok(assignment));

        let mut missing_computation = proto.clone();
        missing_computation.computation_devices.pop();
        assert!(matches!(DeviceAssignment::from_proto(&missing_computation), Err(Error::InvalidArgument { .. })));

        let mut missing_replica = proto.clone();
        missing_replica.computation_devices[1].replica_device_ids.pop();
        assert!(matches!(DeviceAssignment::from_proto(&missing_replica), Err(Error::InvalidArgument { .. })));

        let mut negative_device = proto.clone();
        negative_device.computation_devices[0].replica_device_ids[1] = -1;
        assert!(matches!(DeviceAssignment::from_proto(&negative_device), Err(Error::InvalidArgument { .. })));

        let negative_count = DeviceAssignmentProto { replica_count: -1, ..proto };
        assert!(matches!(DeviceAssignment::from_proto(&negative_count), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_resolve_device_grid() {
        let client = test_client();
        let assignment = DeviceAssignment::new(2, 3, vec![5, 4, 3, 2, 1, 0]).unwrap();
        let grid = resolve_device_grid(&assignment, client.device_table(), 2, 3);
        assert_eq!(grid.len(), 2);
        assert!(grid.iter().all(|row| row.len() == 3));
        for replica_id in 0..2 {
            for partition_id in 0..3 {
                let device = &grid[replica_id][partition_id];
                assert_eq!(device.id(), assignment[(replica_id, partition_id)]);
                assert!(Arc::ptr_eq(device, &client.lookup_device(device.id()).unwrap()));
            }
        }

        // Resolving a sub-grid only looks at the leading replicas and partitions.
        let grid = resolve_device_grid(&assignment, client.device_table(), 1, 2);
        assert_eq!(grid.iter().flatten().map(|device| device.id()).collect::<Vec<_>>(), vec![5, 4]);

        let assignment = DeviceAssignment::new(3, 1, vec![6, 2, 7]).unwrap();
        let devices = resolve_replica_devices(&assignment, client.device_table(), 3);
        assert_eq!(devices.iter().map(|device| device.id()).collect::<Vec<_>>(), vec![6, 2, 7]);
    }

    #[test]
    #[should_panic(expected = "device 42 assigned to replica 1 and partition 0 is not registered with the client")]
    fn test_resolve_device_grid_missing_device() {
        let client = test_client();
        let assignment = DeviceAssignment::new(2, 1, vec![0, 42]).unwrap();
        resolve_device_grid(&assignment, client.device_table(), 2, 1);
    }

    #[test]
    #[should_panic(expected = "cannot resolve a 3x1 device grid")]
    fn test_resolve_device_grid_larger_than_assignment() {
        let client = test_client();
        let assignment = DeviceAssignment::new(2, 1, vec![0, 1]).unwrap();
        resolve_replica_devices(&assignment, client.device_table(), 3);
    }

    #[test]
    fn test_client_default_device_grid() {
        let client = test_client();
        let assignment = client.default_device_assignment(2, 3).unwrap();
        assert_eq!(assignment, DeviceAssignment::new(2, 3, vec![0, 1, 2, 3, 4, 5]).unwrap());
        let grid = client.default_device_grid(2, 3).unwrap();
        let ids = grid.iter().map(|row| row.iter().map(|device| device.id()).collect::<Vec<_>>()).collect::<Vec<_>>();
        assert_eq!(ids, vec![vec![0, 1, 2], vec![3, 4, 5]]);
        let devices = client.default_replica_devices(4).unwrap();
        assert_eq!(devices.iter().map(|device| device.id()).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert!(matches!(client.default_device_grid(3, 3), Err(Error::ResourceExhausted { .. })));
    }
}
