use std::fmt::Debug;
use std::sync::Arc;

use crate::{
    CompileOptions, Configuration, Device, DeviceAssignment, DeviceId, DeviceTable, Error, Program, ProgramModule,
};

/// Native compiler client (e.g., a PJRT plugin for a specific accelerator platform) that a [`Client`] delegates
/// compilation and default device placement to. Implementations must be safe to call from multiple threads
/// concurrently.
pub trait NativeClient: Send + Sync {
    /// Returns a string that identifies the platform of this client (e.g., `"cpu"`, `"gpu"`, `"tpu"`, etc.).
    fn platform_name(&self) -> &str;

    /// Compiles the provided [`Program`] using the provided [`CompileOptions`].
    fn compile(&self, program: &Program, options: &CompileOptions) -> Result<Arc<dyn NativeExecutable>, Error>;

    /// Deserializes and loads an executable that was previously serialized using [`NativeExecutable::serialize`],
    /// optionally overriding the [`CompileOptions`] that were stored along with it.
    fn deserialize_executable(
        &self,
        data: &[u8],
        options: Option<&CompileOptions>,
    ) -> Result<Arc<dyn NativeExecutable>, Error>;

    /// Returns the default [`DeviceAssignment`] for a computation with the provided number of replicas and partitions.
    fn default_device_assignment(
        &self,
        replica_count: usize,
        partition_count: usize,
    ) -> Result<DeviceAssignment, Error>;
}

/// Low-level compiled executable produced by a [`NativeClient`]. [`LoadedExecutable`](crate::LoadedExecutable)s wrap
/// these and add sharding normalization, cost analysis, and device resolution on top.
pub trait NativeExecutable: Send + Sync {
    /// Returns a string that identifies this executable.
    fn name(&self) -> &str;

    /// Returns a fingerprint of this executable that can be used to check whether two executables are identical.
    fn fingerprint(&self) -> Result<String, Error>;

    /// Number of replicas of this executable.
    fn replica_count(&self) -> usize;

    /// Number of partitions of this executable.
    fn partition_count(&self) -> usize;

    /// Returns the [`ProgramModule`]s that make up this executable. The list is normally of length one.
    fn program_modules(&self) -> Result<Vec<Arc<dyn ProgramModule>>, Error>;

    /// Returns the [`DeviceAssignment`] that this executable was compiled for.
    fn device_assignment(&self) -> Result<DeviceAssignment, Error>;

    /// Returns the [`CompileOptions`] that were used to compile this executable.
    fn compile_options(&self) -> Result<CompileOptions, Error>;

    /// Serializes this executable into a string (i.e., byte array) that can be passed to
    /// [`NativeClient::deserialize_executable`].
    fn serialize(&self) -> Result<Vec<u8>, Error>;
}

/// [`Client`]s represent a connection to an accelerator platform. They hold the [`DeviceTable`] of the platform and a
/// [`NativeClient`] that performs the actual compilation work, and they are the entry point for compiling
/// [`Program`]s into [`LoadedExecutable`](crate::LoadedExecutable)s and for resolving device placements.
///
/// [`Client`]s are cheap to clone and all clones share the same [`DeviceTable`] and [`NativeClient`].
#[derive(Clone)]
pub struct Client {
    native: Arc<dyn NativeClient>,
    devices: Arc<DeviceTable>,
    configuration: Configuration,
}

impl Client {
    /// Creates a new [`Client`] backed by the provided [`NativeClient`] and with an empty [`DeviceTable`].
    pub fn new(native: Arc<dyn NativeClient>, configuration: Configuration) -> Self {
        Self { native, devices: Arc::new(DeviceTable::new()), configuration }
    }

    /// Creates a new [`Client`] backed by the provided [`NativeClient`] and registers the provided [`Device`]s with
    /// it. Returns an [`Error::AlreadyExists`] if the same [`DeviceId`] appears more than once.
    pub fn with_devices<I: IntoIterator<Item = Device>>(
        native: Arc<dyn NativeClient>,
        configuration: Configuration,
        devices: I,
    ) -> Result<Self, Error> {
        let client = Self::new(native, configuration);
        for device in devices {
            client.register_device(device)?;
        }
        Ok(client)
    }

    /// Returns the underlying [`NativeClient`].
    pub(crate) fn native(&self) -> &Arc<dyn NativeClient> {
        &self.native
    }

    /// Returns the [`Configuration`] that this [`Client`] was created with.
    pub fn configuration(&self) -> Configuration {
        self.configuration
    }

    /// Returns a string that identifies the platform of this [`Client`] (e.g., `"cpu"`, `"gpu"`, `"tpu"`, etc.).
    pub fn platform_name(&self) -> &str {
        self.native.platform_name()
    }

    /// Returns the [`DeviceTable`] of this [`Client`].
    pub fn device_table(&self) -> &DeviceTable {
        &self.devices
    }

    /// Registers the provided [`Device`] with this [`Client`]. Refer to [`DeviceTable::register`] for more
    /// information.
    pub fn register_device(&self, device: Device) -> Result<Arc<Device>, Error> {
        self.devices.register(device)
    }

    /// Returns all [`Device`]s that are visible to this [`Client`], including ones that are not addressable.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.devices.devices()
    }

    /// Returns the [`Device`]s that this [`Client`] can directly issue work to.
    pub fn addressable_devices(&self) -> Vec<Arc<Device>> {
        self.devices.addressable_devices()
    }

    /// Looks up the [`Device`] with the provided [`DeviceId`], returning an [`Error::NotFound`] if there is no such
    /// device.
    pub fn lookup_device(&self, id: DeviceId) -> Result<Arc<Device>, Error> {
        self.devices.lookup(id).ok_or_else(|| Error::not_found(format!("device with ID '{id}' not found")))
    }
}

impl Debug for Client {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Client")
            .field("platform_name", &self.platform_name())
            .field("devices", &self.devices)
            .field("configuration", &self.configuration)
            .finish()
    }
}
