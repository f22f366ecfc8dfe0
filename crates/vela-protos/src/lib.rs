//! Protobuf messages that make up the wire format shared between `vela` and native compiler clients. Every message
//! here mirrors the XLA message of the same role, field numbers included, so that bytes produced by `vela` can be
//! handed to (and read back from) a native PJRT client without any translation layer.

use std::collections::HashMap;

use prost::{Enumeration, Message, Oneof};

/// Type of the individual elements stored in an array.
///
/// This type corresponds to `PrimitiveType` in [XLA](https://github.com/openxla/xla).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum BufferType {
    /// Invalid [`BufferType`] that serves as a default.
    Invalid = 0,

    /// Token values that are threaded between side-effecting operations.
    Token = 17,

    /// Predicate values (i.e., `true` and `false`).
    Predicate = 1,

    /// Signed 8-bit integer values.
    I8 = 2,

    /// Signed 16-bit integer values.
    I16 = 3,

    /// Signed 32-bit integer values.
    I32 = 4,

    /// Signed 64-bit integer values.
    I64 = 5,

    /// Unsigned 8-bit integer values.
    U8 = 6,

    /// Unsigned 16-bit integer values.
    U16 = 7,

    /// Unsigned 32-bit integer values.
    U32 = 8,

    /// Unsigned 64-bit integer values.
    U64 = 9,

    /// 16-bit floating-point values with 8 exponent bits and 7 mantissa bits.
    BF16 = 16,

    /// IEEE 16-bit floating-point values.
    F16 = 10,

    /// IEEE 32-bit floating-point values.
    F32 = 11,

    /// IEEE 64-bit floating-point values.
    F64 = 12,

    /// Complex values represented as pairs of 32-bit floating-point values.
    C64 = 15,

    /// Complex values represented as pairs of 64-bit floating-point values.
    C128 = 18,

    /// Heterogeneous sequences of values whose element shapes are stored in [`Shape::tuple_shapes`].
    Tuple = 13,

    /// Opaque data passed to custom operations.
    OpaqueType = 14,
}

impl BufferType {
    /// Number of bytes used to store a single element of this [`BufferType`], or [`None`] for types that do not
    /// have a fixed element size (i.e., tuples, tokens, and opaque values).
    pub fn element_size_in_bytes(&self) -> Option<usize> {
        match self {
            Self::Predicate | Self::I8 | Self::U8 => Some(1),
            Self::I16 | Self::U16 | Self::BF16 | Self::F16 => Some(2),
            Self::I32 | Self::U32 | Self::F32 => Some(4),
            Self::I64 | Self::U64 | Self::F64 | Self::C64 => Some(8),
            Self::C128 => Some(16),
            Self::Invalid | Self::Token | Self::Tuple | Self::OpaqueType => None,
        }
    }
}

/// Shape of an array (element type, dimensions, and optional layout) or of a tuple of values.
///
/// Tuple shapes are represented as rank zero [`Shape`]s with [`BufferType::Tuple`] as their element type and
/// populated [`Shape::tuple_shapes`].
///
/// This type corresponds to `ShapeProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct Shape {
    /// [`BufferType`] of the array elements.
    #[prost(enumeration = "BufferType", tag = "2")]
    pub element_type: i32,

    /// Size of each dimension of the array.
    #[prost(int64, repeated, tag = "3")]
    pub dimensions: Vec<i64>,

    /// Element shapes of tuple-shaped values.
    #[prost(message, repeated, tag = "4")]
    pub tuple_shapes: Vec<Shape>,

    /// Optional memory [`Layout`] of the array. If not set, the compiler picks a layout.
    #[prost(message, optional, tag = "5")]
    pub layout: Option<Layout>,

    /// For each dimension, whether its size is dynamic (in which case [`Shape::dimensions`] holds an upper bound).
    #[prost(bool, repeated, tag = "6")]
    pub is_dynamic_dimension: Vec<bool>,
}

impl Shape {
    /// Creates a new array [`Shape`] with the provided element type and dimensions and no layout.
    pub fn array<D: Into<Vec<i64>>>(element_type: BufferType, dimensions: D) -> Self {
        Self { element_type: element_type as i32, dimensions: dimensions.into(), ..Default::default() }
    }

    /// Creates a new tuple [`Shape`] with the provided element shapes.
    pub fn tuple<S: Into<Vec<Shape>>>(tuple_shapes: S) -> Self {
        Self { element_type: BufferType::Tuple as i32, tuple_shapes: tuple_shapes.into(), ..Default::default() }
    }

    /// Returns a copy of this [`Shape`] with the provided [`Layout`] attached.
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Returns `true` if this is a tuple [`Shape`].
    pub fn is_tuple(&self) -> bool {
        self.element_type == BufferType::Tuple as i32
    }

    /// Number of elements in this array [`Shape`], or [`None`] if that number does not fit in a [`usize`]. Tuple
    /// shapes have no elements of their own and so this function returns `Some(0)` for them.
    pub fn element_count(&self) -> Option<usize> {
        if self.is_tuple() {
            return Some(0);
        }
        self.dimensions.iter().try_fold(1usize, |count, dimension| {
            count.checked_mul(usize::try_from((*dimension).max(0)).ok()?)
        })
    }

    /// Number of bytes needed to store the values of this [`Shape`] (recursing into tuple element shapes), or
    /// [`None`] if that number does not fit in a [`usize`]. Element types with no fixed size contribute `0` bytes.
    pub fn size_in_bytes(&self) -> Option<usize> {
        if self.is_tuple() {
            self.tuple_shapes.iter().try_fold(0usize, |size, shape| size.checked_add(shape.size_in_bytes()?))
        } else {
            let element_size = BufferType::try_from(self.element_type)
                .ok()
                .and_then(|element_type| element_type.element_size_in_bytes())
                .unwrap_or(0);
            element_size.checked_mul(self.element_count()?)
        }
    }
}

/// Tile used in a tiled [`Layout`].
///
/// This type corresponds to `TileProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct Tile {
    /// Number of elements in each dimension of the tile, ordered from the most major dimension to the most minor one.
    #[prost(int64, repeated, tag = "1")]
    pub dimensions: Vec<i64>,
}

/// Memory layout of an array.
///
/// This type corresponds to `LayoutProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct Layout {
    /// Sequence of dimension numbers, from minor (i.e., fastest varying index) to major (i.e., slowest varying index).
    #[prost(int64, repeated, tag = "1")]
    pub minor_to_major: Vec<i64>,

    /// Tiles applied to the array, in order.
    #[prost(message, repeated, tag = "6")]
    pub tiles: Vec<Tile>,

    /// Number of bits used to store a single element. `0` means the natural size of the element type.
    #[prost(int64, tag = "7")]
    pub element_size_in_bits: i64,

    /// Memory space in which the array resides. `0` is the default memory space.
    #[prost(int64, tag = "8")]
    pub memory_space: i64,
}

impl Layout {
    /// Creates a new [`Layout`] with the provided minor-to-major dimension ordering.
    pub fn new<D: Into<Vec<i64>>>(minor_to_major: D) -> Self {
        Self { minor_to_major: minor_to_major.into(), ..Default::default() }
    }
}

/// Kind of an [`OpSharding`].
///
/// This type corresponds to `OpSharding.Type` in [XLA](https://github.com/openxla/xla).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum OpShardingType {
    /// Replicated across all devices.
    Replicated = 0,

    /// Maximal sharding (i.e., a single device executes the operation).
    Maximal = 1,

    /// Tuple sharding where only [`OpSharding::tuple_shardings`] is meaningful.
    Tuple = 2,

    /// Tiled sharding described by the tile assignment fields.
    Other = 3,

    /// Manually sharded operation.
    Manual = 4,

    /// Placeholder sharding with lowest precedence.
    Unknown = 5,
}

/// Metadata that records where an operation (and thus its sharding) came from.
///
/// This type corresponds to `OpMetadata` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct OpMetadata {
    /// Framework-level operation type (e.g., `"Add"`).
    #[prost(string, tag = "1")]
    pub op_type: String,

    /// User-visible operation name.
    #[prost(string, tag = "2")]
    pub op_name: String,

    /// Source file that produced the operation.
    #[prost(string, tag = "3")]
    pub source_file: String,

    /// Line in [`OpMetadata::source_file`] that produced the operation.
    #[prost(int32, tag = "4")]
    pub source_line: i32,
}

/// Describes how the value produced by an operation is partitioned across devices. Tuple-shaped values carry one
/// nested [`OpSharding`] per tuple element in [`OpSharding::tuple_shardings`], and those nested shardings may
/// themselves be tuples.
///
/// This type corresponds to `OpSharding` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct OpSharding {
    /// Kind of sharding represented by this message.
    #[prost(enumeration = "OpShardingType", tag = "1")]
    pub r#type: i32,

    /// Shape of each sharded tile.
    #[prost(message, optional, tag = "2")]
    pub tile_shape: Option<Shape>,

    /// Shape of the tile-assignment tensor.
    #[prost(int64, repeated, tag = "3")]
    pub tile_assignment_dimensions: Vec<i64>,

    /// Flattened list of assigned device IDs.
    #[prost(int64, repeated, tag = "4")]
    pub tile_assignment_devices: Vec<i64>,

    /// Element shardings for tuple-shaped values.
    #[prost(message, repeated, tag = "5")]
    pub tuple_shardings: Vec<OpSharding>,

    /// If `true`, data is replicated across the last tile-assignment dimension.
    #[prost(bool, tag = "6")]
    pub replicate_on_last_tile_dim: bool,

    /// Metadata that records the origin of this sharding.
    #[prost(message, repeated, tag = "7")]
    pub metadata: Vec<OpMetadata>,

    /// Sharding type of each trailing tile-assignment subgroup dimension.
    #[prost(enumeration = "OpShardingType", repeated, tag = "8")]
    pub last_tile_dims: Vec<i32>,

    /// Dimensions used to reshape iota-generated device IDs.
    #[prost(int64, repeated, tag = "9")]
    pub iota_reshape_dims: Vec<i64>,

    /// Permutation applied after reshaping iota-generated device IDs.
    #[prost(int32, repeated, tag = "10")]
    pub iota_transpose_perm: Vec<i32>,
}

impl OpSharding {
    /// Creates a new [`OpShardingType::Replicated`] sharding.
    pub fn replicated() -> Self {
        Self { r#type: OpShardingType::Replicated as i32, ..Default::default() }
    }

    /// Creates a new [`OpShardingType::Maximal`] sharding that places the whole value on `device_id`.
    pub fn maximal(device_id: i64) -> Self {
        Self {
            r#type: OpShardingType::Maximal as i32,
            tile_assignment_dimensions: vec![1],
            tile_assignment_devices: vec![device_id],
            ..Default::default()
        }
    }

    /// Creates a new tiled (i.e., [`OpShardingType::Other`]) sharding.
    pub fn tiled<D: Into<Vec<i64>>, I: Into<Vec<i64>>>(tile_assignment_dimensions: D, devices: I) -> Self {
        Self {
            r#type: OpShardingType::Other as i32,
            tile_assignment_dimensions: tile_assignment_dimensions.into(),
            tile_assignment_devices: devices.into(),
            ..Default::default()
        }
    }

    /// Creates a new [`OpShardingType::Manual`] sharding.
    pub fn manual() -> Self {
        Self { r#type: OpShardingType::Manual as i32, ..Default::default() }
    }

    /// Creates a new [`OpShardingType::Tuple`] sharding with the provided element shardings.
    pub fn tuple<S: Into<Vec<OpSharding>>>(tuple_shardings: S) -> Self {
        Self { r#type: OpShardingType::Tuple as i32, tuple_shardings: tuple_shardings.into(), ..Default::default() }
    }

    /// Returns `true` if this is an [`OpShardingType::Tuple`] sharding.
    pub fn is_tuple(&self) -> bool {
        self.r#type == OpShardingType::Tuple as i32
    }
}

/// Device IDs assigned to the replicas of a single computation (i.e., partition).
///
/// This type corresponds to `DeviceAssignmentProto.ComputationDevice` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct ComputationDeviceAssignment {
    /// The element at index `i` is the device ID assigned to replica `i` of this computation.
    #[prost(int64, repeated, tag = "1")]
    pub replica_device_ids: Vec<i64>,
}

/// Assignment of devices to `(replica, computation)` pairs. For `R` replicas and `C` computations, `R * C` devices are
/// required to execute the computations in parallel.
///
/// This type corresponds to `DeviceAssignmentProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Eq, Hash, Message)]
pub struct DeviceAssignment {
    /// Number of replicas.
    #[prost(int32, tag = "1")]
    pub replica_count: i32,

    /// Number of computations.
    #[prost(int32, tag = "2")]
    pub computation_count: i32,

    /// [`ComputationDeviceAssignment`] for each computation. Its length must match [`Self::computation_count`].
    #[prost(message, repeated, tag = "3")]
    pub computation_devices: Vec<ComputationDeviceAssignment>,
}

/// Debugging options passed to the compiler. Only the subset of options that `vela` callers commonly set is
/// represented here. All fields are optional so that unset options are omitted from the wire format.
///
/// This type corresponds to `DebugOptions` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct DebugOptions {
    /// Numerical backend optimization level (similar to `-O` flags in compilers).
    #[prost(int32, optional, tag = "31")]
    pub xla_backend_optimization_level: Option<i32>,

    /// If `true`, the compiler IR string will be embedded in the generated executable.
    #[prost(bool, optional, tag = "33")]
    pub xla_embed_ir_in_executable: Option<bool>,

    /// If `true`, expensive LLVM optimization passes will be skipped.
    #[prost(bool, optional, tag = "73")]
    pub xla_llvm_disable_expensive_passes: Option<bool>,

    /// If `true`, the CPU backend may use fast-math optimizations.
    #[prost(bool, optional, tag = "99")]
    pub xla_cpu_enable_fast_math: Option<bool>,

    /// If `true`, the GPU backend uses fast min/max operations that do not propagate NaNs.
    #[prost(bool, optional, tag = "100")]
    pub xla_gpu_enable_fast_min_max: Option<bool>,

    /// Directory path to dump HLO modules to.
    #[prost(string, optional, tag = "109")]
    pub xla_dump_to: Option<String>,

    /// Only dump HLO modules after passes whose names match this regular expression.
    #[prost(string, optional, tag = "111")]
    pub xla_dump_hlo_pass_re: Option<String>,

    /// If `true`, HLO will be dumped in text format.
    #[prost(bool, optional, tag = "112")]
    pub xla_dump_hlo_as_text: Option<bool>,

    /// Extra backend-specific options as key-value pairs.
    #[prost(map = "string, string", tag = "500")]
    pub xla_backend_extra_options: HashMap<String, String>,
}

/// Options that control how the compiler builds an executable out of a program, including device placement and
/// partitioning.
///
/// This type corresponds to `ExecutableBuildOptionsProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct ExecutableCompilationOptions {
    /// Ordinal of the device to compile for. A value of `-1` indicates that this option has not been set.
    #[prost(int64, tag = "1")]
    pub device_ordinal: i64,

    /// Optional [`Shape`] (including layout) of the program result. If not set, it is inferred by the compiler.
    #[prost(message, optional, tag = "2")]
    pub result_shape: Option<Shape>,

    /// [`DebugOptions`] to pass to the compiler.
    #[prost(message, optional, tag = "3")]
    pub debug_options: Option<DebugOptions>,

    /// Number of replicas of the computation. `0` is interpreted as the default of `1`.
    #[prost(int64, tag = "4")]
    pub replica_count: i64,

    /// Number of partitions of the computation. `0` is interpreted as the default of `1`.
    #[prost(int64, tag = "5")]
    pub partition_count: i64,

    /// If `true`, use _Single Program Multiple Data (SPMD)_ partitioning.
    #[prost(bool, tag = "6")]
    pub use_spmd_partitioning: bool,

    /// If `true`, automatically generate shardings for the SPMD partitioner.
    #[prost(bool, tag = "7")]
    pub use_auto_spmd_partitioning: bool,

    /// If `true`, HLOs should be deduplicated.
    #[prost(bool, tag = "8")]
    pub deduplicate_hlo: bool,

    /// Optional static device assignment for the computation.
    #[prost(message, optional, tag = "9")]
    pub device_assignment: Option<DeviceAssignment>,

    /// If `true`, parameters that are passed through unchanged are aliased with the corresponding outputs.
    #[prost(bool, tag = "10")]
    pub alias_passthrough_params: bool,

    /// If `true`, the compiler only runs its backend and skips the HLO optimization passes.
    #[prost(bool, tag = "11")]
    pub run_backend_only: bool,

    /// Per-output flags controlling whether sharding propagation may change the output shardings.
    #[prost(bool, repeated, tag = "12")]
    pub allow_spmd_sharding_propagation_to_output: Vec<bool>,

    /// Mesh shape used for automatic SPMD partitioning.
    #[prost(int64, repeated, tag = "16")]
    pub auto_spmd_partitioning_mesh_shape: Vec<i64>,

    /// Mesh device IDs used for automatic SPMD partitioning.
    #[prost(int64, repeated, tag = "17")]
    pub auto_spmd_partitioning_mesh_ids: Vec<i64>,

    /// Per-parameter flags controlling whether sharding propagation may change the parameter shardings.
    #[prost(bool, repeated, tag = "18")]
    pub allow_spmd_sharding_propagation_to_parameters: Vec<bool>,
}

/// Value of an [`OptionOverride`].
///
/// This type corresponds to `OptionOverrideProto.value` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Oneof)]
pub enum OptionValue {
    /// String option value.
    #[prost(string, tag = "1")]
    StringField(String),

    /// Boolean option value.
    #[prost(bool, tag = "2")]
    BoolField(bool),

    /// Integer option value.
    #[prost(int64, tag = "3")]
    IntField(i64),

    /// Floating-point option value.
    #[prost(double, tag = "4")]
    DoubleField(f64),
}

/// Override for a compiler environment option.
///
/// This type corresponds to `OptionOverrideProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct OptionOverride {
    /// Value of this option override.
    #[prost(oneof = "OptionValue", tags = "1, 2, 3, 4")]
    pub value: Option<OptionValue>,
}

/// Configuration options for compiling a program into an executable.
///
/// This type corresponds to `CompileOptionsProto` in [XLA](https://github.com/openxla/xla).
#[derive(Clone, PartialEq, Message)]
pub struct CompilationOptions {
    /// [`Shape`]s (with layouts) of the program arguments. An empty list means that layouts are inferred.
    #[prost(message, repeated, tag = "1")]
    pub argument_layouts: Vec<Shape>,

    /// If `true`, the program expects a single tuple argument containing all parameters.
    #[prost(bool, tag = "2")]
    pub parameter_is_tupled_arguments: bool,

    /// [`ExecutableCompilationOptions`] controlling how the executable is built.
    #[prost(message, optional, tag = "3")]
    pub executable_build_options: Option<ExecutableCompilationOptions>,

    /// If `true`, the compiler produces a portable executable that is not tied to specific devices.
    #[prost(bool, tag = "4")]
    pub compile_portable_executable: bool,

    /// Version of the profiling schema used for cost data.
    #[prost(int64, tag = "5")]
    pub profile_version: i64,

    /// Opaque serialized multi-slice configuration. This is a one-way field: readers cannot reconstruct the
    /// structured configuration from it.
    #[prost(bytes = "vec", tag = "6")]
    pub serialized_multi_slice_configuration: Vec<u8>,

    /// Environment option overrides for the compiler.
    #[prost(map = "string, message", tag = "7")]
    pub environment_option_overrides: HashMap<String, OptionOverride>,
}
