use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use prost::Message;

use crate::protos::{DebugOptions, OptionValue, Shape};
use crate::{DeviceAssignment, Error};

/// Topology of a multi-slice deployment (i.e., a deployment where a single computation spans multiple accelerator
/// slices that are connected over a data-center network). Implementations are provided by platform-specific code.
pub trait MultiSliceTopology: Debug + Send + Sync {
    /// Serializes this topology into an opaque blob that the native compiler understands.
    fn serialize(&self) -> Vec<u8>;
}

/// Optional multi-slice configuration of a [`CompileOptions`].
///
/// Note that this configuration can only be _written_ to the [`CompileOptions`] wire format. There is no way to
/// reconstruct a [`MultiSliceTopology`] from its serialized form and so [`CompileOptions::from_proto`] rejects any
/// message that carries one. Only [`MultiSliceConfiguration::Empty`] survives a round trip.
#[derive(Clone, Debug, Default)]
pub enum MultiSliceConfiguration {
    /// No multi-slice topology. This is the only configuration that [`CompileOptions::from_proto`] can read back.
    #[default]
    Empty,

    /// Computation spans the slices of the provided [`MultiSliceTopology`].
    Present(Arc<dyn MultiSliceTopology>),
}

impl MultiSliceConfiguration {
    /// Returns `true` if this is [`MultiSliceConfiguration::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Serialized form of this configuration. [`MultiSliceConfiguration::Empty`] serializes to no bytes.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Present(topology) => topology.serialize(),
        }
    }
}

impl PartialEq for MultiSliceConfiguration {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Present(lhs), Self::Present(rhs)) => Arc::ptr_eq(lhs, rhs) || lhs.serialize() == rhs.serialize(),
            _ => false,
        }
    }
}

/// Value of a compiler environment option override.
#[derive(Clone, Debug, PartialEq)]
pub enum OptionOverride {
    /// Text value (e.g., a regular expression selecting compiler passes).
    String(String),

    /// Boolean switch.
    Bool(bool),

    /// Integer value, such as an autotuning level.
    Int(i64),

    /// Floating-point value, such as a memory fraction.
    Double(f64),
}

impl OptionOverride {
    /// Converts this [`OptionOverride`] to a Protobuf message.
    pub fn to_proto(&self) -> crate::protos::OptionOverride {
        let value = match self {
            Self::String(value) => OptionValue::StringField(value.clone()),
            Self::Bool(value) => OptionValue::BoolField(*value),
            Self::Int(value) => OptionValue::IntField(*value),
            Self::Double(value) => OptionValue::DoubleField(*value),
        };
        crate::protos::OptionOverride { value: Some(value) }
    }

    /// Converts the provided Protobuf message into an [`OptionOverride`]. Returns an [`Error::InvalidArgument`] if
    /// the message does not carry a value.
    pub fn from_proto(proto: &crate::protos::OptionOverride) -> Result<Self, Error> {
        match &proto.value {
            Some(OptionValue::StringField(value)) => Ok(Self::String(value.clone())),
            Some(OptionValue::BoolField(value)) => Ok(Self::Bool(*value)),
            Some(OptionValue::IntField(value)) => Ok(Self::Int(*value)),
            Some(OptionValue::DoubleField(value)) => Ok(Self::Double(*value)),
            None => Err(Error::invalid_argument("option override does not have a value")),
        }
    }
}

impl From<&str> for OptionOverride {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for OptionOverride {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for OptionOverride {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionOverride {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for OptionOverride {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Options that control how the compiler builds an executable, including the number of replicas and partitions of
/// the computation and (optionally) the static [`DeviceAssignment`] that it should be compiled for.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutableBuildOptions {
    /// Ordinal of the device to compile for, if any. [`None`] lets the compiler pick.
    pub device_ordinal: Option<usize>,

    /// [`Shape`] (including layout) of the result of the computation. If [`None`], the compiler infers it.
    pub result_layout: Option<Shape>,

    /// [`DebugOptions`] to pass to the compiler.
    pub debug_options: Option<DebugOptions>,

    /// Number of replicas of the computation.
    pub replica_count: usize,

    /// Number of partitions of the computation.
    pub partition_count: usize,

    /// If `true`, use _Single Program Multiple Data (SPMD)_ partitioning.
    pub use_spmd_partitioning: bool,

    /// If `true`, automatically generate shardings for the SPMD partitioner.
    pub use_auto_spmd_partitioning: bool,

    /// Mesh shape used for automatic SPMD partitioning.
    pub auto_spmd_partitioning_mesh_shape: Vec<i64>,

    /// Mesh device IDs used for automatic SPMD partitioning.
    pub auto_spmd_partitioning_mesh_ids: Vec<i64>,

    /// If `true`, HLOs should be deduplicated.
    pub deduplicate_hlo: bool,

    /// Static [`DeviceAssignment`] of the computation. Its shape must match [`Self::replica_count`] and
    /// [`Self::partition_count`].
    pub device_assignment: Option<DeviceAssignment>,

    /// If `true`, parameters that are passed through unchanged are aliased with the corresponding outputs.
    pub alias_passthrough_params: bool,

    /// If `true`, the compiler only runs its backend and skips the HLO optimization passes.
    pub run_backend_only: bool,

    /// Per-parameter flags controlling whether sharding propagation may change the parameter shardings.
    pub allow_spmd_sharding_propagation_to_parameters: Vec<bool>,

    /// Per-output flags controlling whether sharding propagation may change the output shardings.
    pub allow_spmd_sharding_propagation_to_output: Vec<bool>,
}

impl Default for ExecutableBuildOptions {
    fn default() -> Self {
        Self {
            device_ordinal: None,
            result_layout: None,
            debug_options: None,
            replica_count: 1,
            partition_count: 1,
            use_spmd_partitioning: false,
            use_auto_spmd_partitioning: false,
            auto_spmd_partitioning_mesh_shape: Vec::new(),
            auto_spmd_partitioning_mesh_ids: Vec::new(),
            deduplicate_hlo: false,
            device_assignment: None,
            alias_passthrough_params: false,
            run_backend_only: false,
            allow_spmd_sharding_propagation_to_parameters: Vec::new(),
            allow_spmd_sharding_propagation_to_output: Vec::new(),
        }
    }
}

impl ExecutableBuildOptions {
    /// Converts these [`ExecutableBuildOptions`] to a Protobuf message. Returns an [`Error::FailedPrecondition`] if
    /// the replica or partition count is `0`, or if a static [`DeviceAssignment`] is set whose shape disagrees with
    /// those counts. The wire format uses `0` to mean "unset", so a zero count could not be read back as-is.
    pub fn to_proto(&self) -> Result<crate::protos::ExecutableCompilationOptions, Error> {
        if self.replica_count == 0 || self.partition_count == 0 {
            return Err(Error::failed_precondition(format!(
                "the build options request {} replica(s) and {} partition(s), but both counts must be positive",
                self.replica_count, self.partition_count,
            )));
        }
        if let Some(device_assignment) = &self.device_assignment {
            if device_assignment.replica_count() != self.replica_count
                || device_assignment.partition_count() != self.partition_count
            {
                return Err(Error::failed_precondition(format!(
                    "the device assignment has {} replica(s) and {} partition(s), but the build options request {} \
                     replica(s) and {} partition(s)",
                    device_assignment.replica_count(),
                    device_assignment.partition_count(),
                    self.replica_count,
                    self.partition_count,
                )));
            }
        }
        Ok(crate::protos::ExecutableCompilationOptions {
            device_ordinal: self.device_ordinal.map_or(-1, |ordinal| ordinal as i64),
            result_shape: self.result_layout.clone(),
            debug_options: self.debug_options.clone(),
            replica_count: self.replica_count as i64,
            partition_count: self.partition_count as i64,
            use_spmd_partitioning: self.use_spmd_partitioning,
            use_auto_spmd_partitioning: self.use_auto_spmd_partitioning,
            deduplicate_hlo: self.deduplicate_hlo,
            device_assignment: self.device_assignment.as_ref().map(DeviceAssignment::to_proto),
            alias_passthrough_params: self.alias_passthrough_params,
            run_backend_only: self.run_backend_only,
            allow_spmd_sharding_propagation_to_output: self.allow_spmd_sharding_propagation_to_output.clone(),
            auto_spmd_partitioning_mesh_shape: self.auto_spmd_partitioning_mesh_shape.clone(),
            auto_spmd_partitioning_mesh_ids: self.auto_spmd_partitioning_mesh_ids.clone(),
            allow_spmd_sharding_propagation_to_parameters: self.allow_spmd_sharding_propagation_to_parameters.clone(),
        })
    }

    /// Converts the provided Protobuf message into [`ExecutableBuildOptions`]. Replica and partition counts of `0`
    /// mean "unset" and read as `1` ([`ExecutableBuildOptions::to_proto`] never writes them). A device ordinal of
    /// `-1` is also interpreted as unset. Returns an [`Error::InvalidArgument`] for negative counts, device ordinals
    /// below `-1`, or a malformed device assignment.
    pub fn from_proto(proto: &crate::protos::ExecutableCompilationOptions) -> Result<Self, Error> {
        let device_ordinal = match proto.device_ordinal {
            -1 => None,
            ordinal if ordinal >= 0 => Some(ordinal as usize),
            ordinal => return Err(Error::invalid_argument(format!("invalid device ordinal: {ordinal}"))),
        };
        let count = |name: &str, count: i64| match count {
            0 => Ok(1),
            count if count > 0 => Ok(count as usize),
            count => Err(Error::invalid_argument(format!("invalid {name} count: {count}"))),
        };
        Ok(Self {
            device_ordinal,
            result_layout: proto.result_shape.clone(),
            debug_options: proto.debug_options.clone(),
            replica_count: count("replica", proto.replica_count)?,
            partition_count: count("partition", proto.partition_count)?,
            use_spmd_partitioning: proto.use_spmd_partitioning,
            use_auto_spmd_partitioning: proto.use_auto_spmd_partitioning,
            auto_spmd_partitioning_mesh_shape: proto.auto_spmd_partitioning_mesh_shape.clone(),
            auto_spmd_partitioning_mesh_ids: proto.auto_spmd_partitioning_mesh_ids.clone(),
            deduplicate_hlo: proto.deduplicate_hlo,
            device_assignment: proto.device_assignment.as_ref().map(DeviceAssignment::from_proto).transpose()?,
            alias_passthrough_params: proto.alias_passthrough_params,
            run_backend_only: proto.run_backend_only,
            allow_spmd_sharding_propagation_to_parameters: proto.allow_spmd_sharding_propagation_to_parameters.clone(),
            allow_spmd_sharding_propagation_to_output: proto.allow_spmd_sharding_propagation_to_output.clone(),
        })
    }
}

/// Configuration options for compiling a program into an executable.
///
/// [`CompileOptions`] can be converted to and from the [`CompilationOptions`](crate::protos::CompilationOptions) wire
/// format without loss, with one exception: the [`MultiSliceConfiguration`] is written as an opaque blob and messages
/// that carry such a blob cannot be read back (refer to [`CompileOptions::from_proto`]). In addition, the wire format
/// does not distinguish between "no argument layouts" and "an empty list of argument layouts", and so
/// `argument_layouts: Some(vec![])` reads back as [`None`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompileOptions {
    /// [`Shape`]s (with layouts) of the arguments of the program. If [`None`], the compiler chooses the layouts.
    pub argument_layouts: Option<Vec<Shape>>,

    /// If `true`, the program expects a single tuple argument containing all parameters.
    pub parameter_is_tupled_arguments: bool,

    /// [`ExecutableBuildOptions`] controlling how the executable is built.
    pub executable_build_options: ExecutableBuildOptions,

    /// If `true`, the compiler produces a portable executable that is not tied to specific devices.
    pub compile_portable_executable: bool,

    /// Version of the profiling schema used for cost data.
    pub profile_version: i64,

    /// Optional [`MultiSliceConfiguration`].
    pub multi_slice_configuration: MultiSliceConfiguration,

    /// Compiler environment option overrides, keyed by option name.
    pub environment_option_overrides: HashMap<String, OptionOverride>,
}

impl CompileOptions {
    /// Converts these [`CompileOptions`] to a Protobuf message. Errors returned while converting the
    /// [`ExecutableBuildOptions`] are propagated as-is.
    pub fn to_proto(&self) -> Result<crate::protos::CompilationOptions, Error> {
        Ok(crate::protos::CompilationOptions {
            argument_layouts: self.argument_layouts.clone().unwrap_or_default(),
            parameter_is_tupled_arguments: self.parameter_is_tupled_arguments,
            executable_build_options: Some(self.executable_build_options.to_proto()?),
            compile_portable_executable: self.compile_portable_executable,
            profile_version: self.profile_version,
            serialized_multi_slice_configuration: self.multi_slice_configuration.serialize(),
            environment_option_overrides: self
                .environment_option_overrides
                .iter()
                .map(|(name, value)| (name.clone(), value.to_proto()))
                .collect(),
        })
    }

    /// Converts the provided Protobuf message into [`CompileOptions`].
    ///
    /// Returns an [`Error::Unimplemented`] if the message carries a serialized [`MultiSliceConfiguration`], before
    /// looking at any other field. Errors returned while converting the [`ExecutableBuildOptions`] or the
    /// environment option overrides are propagated as-is.
    pub fn from_proto(proto: &crate::protos::CompilationOptions) -> Result<Self, Error> {
        if !proto.serialized_multi_slice_configuration.is_empty() {
            return Err(Error::unimplemented("multi_slice_config not supported in CompileOptions::FromProto."));
        }
        let argument_layouts =
            if proto.argument_layouts.is_empty() { None } else { Some(proto.argument_layouts.clone()) };
        let executable_build_options = match &proto.executable_build_options {
            Some(options) => ExecutableBuildOptions::from_proto(options)?,
            None => ExecutableBuildOptions::default(),
        };
        let environment_option_overrides = proto
            .environment_option_overrides
            .iter()
            .map(|(name, value)| Ok((name.clone(), OptionOverride::from_proto(value)?)))
            .collect::<Result<HashMap<_, _>, Error>>()?;
        Ok(Self {
            argument_layouts,
            parameter_is_tupled_arguments: proto.parameter_is_tupled_arguments,
            executable_build_options,
            compile_portable_executable: proto.compile_portable_executable,
            profile_version: proto.profile_version,
            multi_slice_configuration: MultiSliceConfiguration::Empty,
            environment_option_overrides,
        })
    }

    /// Serializes these [`CompileOptions`] into a string (i.e., byte array).
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        Ok(self.to_proto()?.encode_to_vec())
    }

    /// Deserializes [`CompileOptions`] from the provided bytes, which must have been produced by
    /// [`CompileOptions::serialize`] (or by a native client that uses the same wire format).
    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        let proto = crate::protos::CompilationOptions::decode(data)
            .map_err(|error| Error::invalid_argument(format!("failed to decode compile options; {error}")))?;
        Self::from_proto(&proto)
    }
}
