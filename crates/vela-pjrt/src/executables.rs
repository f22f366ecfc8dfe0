use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, warn};

use crate::protos::OpSharding;
use crate::{
    Client, CompileOptions, CostAnalyzer, Device, DeviceAssignment, Error, HloCostAnalysis, NativeExecutable, Program,
    ProgramModule, ShardingTree, Value, flatten_op_shardings, resolve_device_grid,
};

/// Compiled [`Program`] that has been loaded by a [`Client`] and is ready to be dispatched to the [`Device`]s of its
/// [`DeviceAssignment`]. [`LoadedExecutable`]s are cheap to clone and all clones share the same underlying
/// [`NativeExecutable`], which is released when the last clone is dropped.
#[derive(Clone)]
pub struct LoadedExecutable {
    native: Arc<dyn NativeExecutable>,
    client: Client,

    /// Cached [`LoadedExecutable::cost_analysis`] of this [`LoadedExecutable`] so that it will only be computed once.
    cost_analysis: Arc<OnceLock<Result<HashMap<String, Value>, Error>>>,
}

impl LoadedExecutable {
    /// Creates a new [`LoadedExecutable`] that wraps the provided [`NativeExecutable`] and is owned by `client`.
    pub(crate) fn new(native: Arc<dyn NativeExecutable>, client: Client) -> Self {
        Self { native, client, cost_analysis: Arc::new(OnceLock::new()) }
    }

    /// Returns the [`Client`] that loaded this [`LoadedExecutable`].
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns a string that identifies this [`LoadedExecutable`].
    pub fn name(&self) -> &str {
        self.native.name()
    }

    /// Returns a fingerprint of this [`LoadedExecutable`] that can be used to check whether two executables are
    /// identical.
    pub fn fingerprint(&self) -> Result<String, Error> {
        self.native.fingerprint()
    }

    /// Number of replicas of this [`LoadedExecutable`].
    pub fn replica_count(&self) -> usize {
        self.native.replica_count()
    }

    /// Number of partitions of this [`LoadedExecutable`].
    pub fn partition_count(&self) -> usize {
        self.native.partition_count()
    }

    /// Returns the [`ProgramModule`]s that make up this [`LoadedExecutable`].
    pub fn modules(&self) -> Result<Vec<Arc<dyn ProgramModule>>, Error> {
        self.native.program_modules()
    }

    /// Returns the [`CompileOptions`] that this [`LoadedExecutable`] was compiled with.
    pub fn compile_options(&self) -> Result<CompileOptions, Error> {
        self.native.compile_options()
    }

    /// Returns the [`DeviceAssignment`] of this [`LoadedExecutable`].
    pub fn device_assignment(&self) -> Result<DeviceAssignment, Error> {
        self.native.device_assignment()
    }

    /// Returns the [`Device`] that each `(replica, partition)` shard of this [`LoadedExecutable`] will be dispatched
    /// to, indexed as `grid[replica_id][partition_id]`.
    ///
    /// # Panics
    ///
    /// Panics if the [`DeviceAssignment`] of this executable refers to a device that is not registered with its
    /// [`Client`], or if it is smaller than the replica and partition counts of the executable.
    pub fn device_grid(&self) -> Result<Vec<Vec<Arc<Device>>>, Error> {
        let assignment = self.device_assignment()?;
        Ok(resolve_device_grid(&assignment, self.client.device_table(), self.replica_count(), self.partition_count()))
    }

    /// Returns the _addressable_ [`Device`]s that this [`LoadedExecutable`] will run on, in row-major
    /// `(replica, partition)` order and without duplicates.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`LoadedExecutable::device_grid`].
    pub fn addressable_devices(&self) -> Result<Vec<Arc<Device>>, Error> {
        let mut devices = Vec::<Arc<Device>>::new();
        for device in self.device_grid()?.into_iter().flatten() {
            if device.is_addressable() && !devices.iter().any(|existing| existing.id() == device.id()) {
                devices.push(device);
            }
        }
        Ok(devices)
    }

    /// Returns the flattened [`OpSharding`]s of the outputs of this [`LoadedExecutable`], with one entry per array
    /// leaf of the output (refer to [`ShardingTree`]). Returns [`None`] if the modules of this executable cannot be
    /// retrieved, if there are no modules, or if the first module has no SPMD output sharding.
    pub fn output_shardings(&self) -> Option<Vec<OpSharding>> {
        let module = self.first_module()?;
        let sharding = module.spmd_output_sharding()?;
        Some(ShardingTree::from(sharding).into_leaves())
    }

    /// Returns the flattened [`OpSharding`]s of the parameters of this [`LoadedExecutable`]. Each parameter sharding
    /// is flattened independently (refer to [`crate::flatten_op_sharding`]) and the results are concatenated in
    /// parameter order. Returns [`None`] if the modules of this executable cannot be retrieved, if there are no
    /// modules, or if the first module has no SPMD parameter shardings.
    pub fn parameter_shardings(&self) -> Option<Vec<OpSharding>> {
        let module = self.first_module()?;
        let shardings = module.spmd_parameter_shardings()?;
        Some(flatten_op_shardings(&shardings))
    }

    /// Returns the first [`ProgramModule`] of this executable, if there is one. Failures to retrieve the modules are
    /// logged and otherwise treated as if there were no modules.
    fn first_module(&self) -> Option<Arc<dyn ProgramModule>> {
        match self.modules() {
            Ok(modules) => modules.into_iter().next(),
            Err(error) => {
                warn!(executable = self.name(), %error, "failed to retrieve the program modules of executable");
                None
            }
        }
    }

    /// Runs the provided [`CostAnalyzer`] over the entry computation of this [`LoadedExecutable`] and returns every
    /// property that it recorded.
    ///
    /// Returns an [`Error::NotFound`] if this executable has no modules and an [`Error::Unimplemented`] if it has more
    /// than one (i.e., if it is a _Multiple Program Multiple Data (MPMD)_ executable). Errors returned while
    /// retrieving the modules or while traversing the entry computation are propagated as-is.
    pub fn run_cost_analysis(&self, analyzer: &mut dyn CostAnalyzer) -> Result<HashMap<String, Value>, Error> {
        let modules = self.modules()?;
        let module = match modules.as_slice() {
            [] => {
                return Err(Error::not_found(format!(
                    "Executable '{}' did not have an HloModule to generate cost analysis with.",
                    self.name(),
                )));
            }
            [module] => module,
            _ => {
                return Err(Error::unimplemented(
                    "GetCostAnalysis() doesn't support multiple program multiple data executables.",
                ));
            }
        };
        module.entry_computation().accept(analyzer)?;
        let mut properties = HashMap::new();
        analyzer.properties().for_each(|name, value| {
            properties.insert(name.to_string(), Value::F32(value));
        });
        Ok(properties)
    }

    /// Returns the cost properties of this [`LoadedExecutable`] as computed by [`HloCostAnalysis`]. The analysis only
    /// runs the first time this function is called and its result (including failures) is cached.
    pub fn cost_analysis(&self) -> Result<&HashMap<String, Value>, Error> {
        self.cost_analysis
            .get_or_init(|| self.run_cost_analysis(&mut HloCostAnalysis::new()))
            .as_ref()
            .map_err(|error| error.clone())
    }

    /// Serializes this [`LoadedExecutable`] into a string (i.e., byte array) that can later be loaded using
    /// [`Client::deserialize_and_load_executable`].
    pub fn serialize(&self) -> Result<SerializedExecutable, Error> {
        Ok(SerializedExecutable { data: self.native.serialize()? })
    }
}

impl Debug for LoadedExecutable {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "LoadedExecutable[name={}, replicas={}, partitions={}]",
            self.name(),
            self.replica_count(),
            self.partition_count(),
        )
    }
}

/// Platform-specific serialized representation of a [`LoadedExecutable`]. Note that the serialization format is not
/// guaranteed to be stable over time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SerializedExecutable {
    data: Vec<u8>,
}

impl SerializedExecutable {
    /// Returns the underlying bytes of this [`SerializedExecutable`].
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Consumes this [`SerializedExecutable`], returning its underlying bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl Client {
    /// Compiles a [`Program`] turning it into a [`LoadedExecutable`] which is ready to be dispatched to the [`Device`]s
    /// managed by this [`Client`]. Errors returned by the [`NativeClient`](crate::NativeClient) are propagated as-is.
    pub fn compile(&self, program: &Program, options: &CompileOptions) -> Result<LoadedExecutable, Error> {
        debug!(
            platform = self.platform_name(),
            format = program.format(),
            size_in_bytes = program.code().len(),
            replica_count = options.executable_build_options.replica_count,
            partition_count = options.executable_build_options.partition_count,
            use_alternate_lowering = self.configuration().use_alternate_lowering,
            "compiling program",
        );
        let native = self.native().compile(program, options)?;
        info!(
            executable = native.name(),
            replica_count = native.replica_count(),
            partition_count = native.partition_count(),
            "compiled executable",
        );
        Ok(LoadedExecutable::new(native, self.clone()))
    }

    /// Deserializes the provided data into a [`LoadedExecutable`]. Note that the provided data must be the result of
    /// [`LoadedExecutable::serialize`] and must have been produced by the same platform that this [`Client`] is
    /// using. If `options` is provided, it overrides the [`CompileOptions`] that were stored along with the
    /// executable. Errors returned by the [`NativeClient`](crate::NativeClient) are propagated as-is.
    pub fn deserialize_and_load_executable(
        &self,
        data: &[u8],
        options: Option<&CompileOptions>,
    ) -> Result<LoadedExecutable, Error> {
        debug!(
            platform = self.platform_name(),
            size_in_bytes = data.len(),
            overrides_compile_options = options.is_some(),
            "deserializing executable",
        );
        let native = self.native().deserialize_executable(data, options)?;
        Ok(LoadedExecutable::new(native, self.clone()))
    }
}
