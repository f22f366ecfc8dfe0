use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Display;

use crate::Error;
use crate::protos::{BufferType, OpSharding, Shape};

/// Program that can be compiled using a [`Client`](crate::Client). Programs can be provided in multiple formats
/// though not all native clients support all formats. The [`Program::Mlir`] format is the recommended format to use.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Program {
    /// [MLIR](https://mlir.llvm.org/) program represented using its MLIR bytecode (or textual assembly).
    Mlir {
        /// MLIR bytecode that represents a program.
        bytecode: Vec<u8>,
    },

    /// XLA HLO program.
    Hlo {
        /// Serialized [`HloModuleProto`](https://github.com/openxla/xla/blob/main/xla/service/hlo.proto#L557)
        /// message that represents a program.
        proto: Vec<u8>,
    },

    /// XLA HLO program paired with a configuration.
    HloWithConfig {
        /// Serialized [`HloModuleProtoWithConfig`](https://github.com/openxla/xla/blob/main/xla/xla.proto#L1725)
        /// message that represents a program.
        proto: Vec<u8>,
    },
}

impl Program {
    /// Returns the code of this [`Program`].
    pub fn code(&self) -> &[u8] {
        match self {
            Self::Mlir { bytecode } => bytecode,
            Self::Hlo { proto } => proto,
            Self::HloWithConfig { proto } => proto,
        }
    }

    /// Returns the name of the format of this [`Program`], as understood by native compilers.
    pub fn format(&self) -> &'static str {
        match self {
            Self::Mlir { .. } => "mlir",
            Self::Hlo { .. } => "hlo",
            Self::HloWithConfig { .. } => "hlo_with_config",
        }
    }
}

/// Module produced by compiling a [`Program`]. An executable normally consists of a single module, but
/// _Multiple Program Multiple Data (MPMD)_ executables may consist of several.
pub trait ProgramModule: Send + Sync {
    /// Name of this module.
    fn name(&self) -> &str;

    /// Sharding of the output of the entry computation that was chosen by the SPMD partitioner, if any. For
    /// tuple-shaped outputs this is a tuple sharding.
    fn spmd_output_sharding(&self) -> Option<OpSharding>;

    /// Shardings of each parameter of the entry computation that were chosen by the SPMD partitioner, if any.
    fn spmd_parameter_shardings(&self) -> Option<Vec<OpSharding>>;

    /// Entry [`Computation`] of this module.
    fn entry_computation(&self) -> &Computation;
}

/// In-memory [`ProgramModule`] whose entry computation is represented using a [`Computation`].
#[derive(Clone, Debug, PartialEq)]
pub struct HloModule {
    name: String,
    entry_computation: Computation,
    spmd_output_sharding: Option<OpSharding>,
    spmd_parameter_shardings: Option<Vec<OpSharding>>,
}

impl HloModule {
    /// Creates a new [`HloModule`] with the provided name and entry [`Computation`], and no SPMD shardings.
    pub fn new<N: Into<String>>(name: N, entry_computation: Computation) -> Self {
        Self { name: name.into(), entry_computation, spmd_output_sharding: None, spmd_parameter_shardings: None }
    }

    /// Returns a copy of this [`HloModule`] with the provided SPMD output sharding.
    pub fn with_spmd_output_sharding(mut self, sharding: OpSharding) -> Self {
        self.spmd_output_sharding = Some(sharding);
        self
    }

    /// Returns a copy of this [`HloModule`] with the provided SPMD parameter shardings.
    pub fn with_spmd_parameter_shardings<S: Into<Vec<OpSharding>>>(mut self, shardings: S) -> Self {
        self.spmd_parameter_shardings = Some(shardings.into());
        self
    }
}

impl ProgramModule for HloModule {
    fn name(&self) -> &str {
        self.name.as_str()
    }

    fn spmd_output_sharding(&self) -> Option<OpSharding> {
        self.spmd_output_sharding.clone()
    }

    fn spmd_parameter_shardings(&self) -> Option<Vec<OpSharding>> {
        self.spmd_parameter_shardings.clone()
    }

    fn entry_computation(&self) -> &Computation {
        &self.entry_computation
    }
}

/// Operation performed by an [`Instruction`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Parameter with the provided parameter number.
    Parameter(usize),
    Constant,
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    Negate,
    Abs,
    Exp,
    Log,
    Tanh,
    Sqrt,
    Rsqrt,
    Sin,
    Cos,
    Power,
    Dot,
    Reduce,
    Broadcast,
    Reshape,
    Transpose,
    Convert,
    Copy,
    Tuple,
    GetTupleElement(usize),
    /// Opaque call to a custom kernel with the provided target name.
    CustomCall(String),
}

impl Opcode {
    /// Returns `true` for element-wise operations that perform one floating-point operation per output element.
    fn is_elementwise_arithmetic(&self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Subtract
                | Self::Multiply
                | Self::Divide
                | Self::Maximum
                | Self::Minimum
                | Self::Negate
                | Self::Abs
        )
    }

    /// Returns `true` for element-wise operations that evaluate one transcendental function per output element.
    fn is_transcendental(&self) -> bool {
        matches!(
            self,
            Self::Exp | Self::Log | Self::Tanh | Self::Sqrt | Self::Rsqrt | Self::Sin | Self::Cos | Self::Power
        )
    }

    /// Returns `true` for operations that only rearrange or name existing values and thus do not access memory.
    fn is_free(&self) -> bool {
        matches!(self, Self::Parameter(_) | Self::Constant | Self::Tuple | Self::GetTupleElement(_))
    }
}

impl Display for Opcode {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parameter(_) => write!(formatter, "parameter"),
            Self::Constant => write!(formatter, "constant"),
            Self::Add => write!(formatter, "add"),
            Self::Subtract => write!(formatter, "subtract"),
            Self::Multiply => write!(formatter, "multiply"),
            Self::Divide => write!(formatter, "divide"),
            Self::Maximum => write!(formatter, "maximum"),
            Self::Minimum => write!(formatter, "minimum"),
            Self::Negate => write!(formatter, "negate"),
            Self::Abs => write!(formatter, "abs"),
            Self::Exp => write!(formatter, "exponential"),
            Self::Log => write!(formatter, "log"),
            Self::Tanh => write!(formatter, "tanh"),
            Self::Sqrt => write!(formatter, "sqrt"),
            Self::Rsqrt => write!(formatter, "rsqrt"),
            Self::Sin => write!(formatter, "sine"),
            Self::Cos => write!(formatter, "cosine"),
            Self::Power => write!(formatter, "power"),
            Self::Dot => write!(formatter, "dot"),
            Self::Reduce => write!(formatter, "reduce"),
            Self::Broadcast => write!(formatter, "broadcast"),
            Self::Reshape => write!(formatter, "reshape"),
            Self::Transpose => write!(formatter, "transpose"),
            Self::Convert => write!(formatter, "convert"),
            Self::Copy => write!(formatter, "copy"),
            Self::Tuple => write!(formatter, "tuple"),
            Self::GetTupleElement(_) => write!(formatter, "get-tuple-element"),
            Self::CustomCall(_) => write!(formatter, "custom-call"),
        }
    }
}

/// Single instruction of a [`Computation`]. Operands are referred to by their index in the computation's
/// instruction list, which must be smaller than the index of the instruction itself.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub opcode: Opcode,
    pub operands: Vec<usize>,
    pub shape: Shape,
}

impl Instruction {
    /// Creates a new [`Instruction`].
    pub fn new<N: Into<String>, O: Into<Vec<usize>>>(name: N, opcode: Opcode, operands: O, shape: Shape) -> Self {
        Self { name: name.into(), opcode, operands: operands.into(), shape }
    }
}

/// Computation made out of a topologically ordered sequence of [`Instruction`]s. The last instruction is the root
/// (i.e., the instruction whose value is returned by the computation). Instruction names identify instructions in
/// cost analysis results and must be unique within a computation, which [`Computation::accept`] checks.
#[derive(Clone, Debug, PartialEq)]
pub struct Computation {
    name: String,
    instructions: Vec<Instruction>,
}

impl Computation {
    /// Creates a new empty [`Computation`] with the provided name.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self { name: name.into(), instructions: Vec::new() }
    }

    /// Appends the provided [`Instruction`] to this [`Computation`], returning its index.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Returns a copy of this [`Computation`] with the provided [`Instruction`] appended.
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.push(instruction);
        self
    }

    /// Name of this [`Computation`].
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// [`Instruction`]s of this [`Computation`], in topological order.
    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    /// Root [`Instruction`] of this [`Computation`], or [`None`] if it is empty.
    pub fn root(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Returns the `operand`-th operand of `instruction`, which must belong to this [`Computation`].
    pub fn operand(&self, instruction: &Instruction, operand: usize) -> Option<&Instruction> {
        instruction.operands.get(operand).and_then(|index| self.instructions.get(*index))
    }

    /// Visits every [`Instruction`] of this [`Computation`] in order using the provided [`CostAnalyzer`]. Returns an
    /// [`Error::InvalidArgument`] if an instruction reuses the name of an earlier instruction or refers to an operand
    /// that is not defined before it, and propagates errors returned by the analyzer as-is.
    pub fn accept(&self, analyzer: &mut dyn CostAnalyzer) -> Result<(), Error> {
        let mut names = HashSet::with_capacity(self.instructions.len());
        for (index, instruction) in self.instructions.iter().enumerate() {
            if !names.insert(instruction.name.as_str()) {
                return Err(Error::invalid_argument(format!(
                    "instruction name '{}' is defined more than once in computation '{}'",
                    instruction.name, self.name,
                )));
            }
            if let Some(operand) = instruction.operands.iter().find(|operand| **operand >= index) {
                return Err(Error::invalid_argument(format!(
                    "instruction '{}' in computation '{}' refers to operand {operand} which is not defined before it",
                    instruction.name, self.name,
                )));
            }
            analyzer.visit(instruction, self)?;
        }
        Ok(())
    }
}

impl Display for Computation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(formatter, "ENTRY {} {{", self.name)?;
        for (index, instruction) in self.instructions.iter().enumerate() {
            let root = if index + 1 == self.instructions.len() { "ROOT " } else { "" };
            let shape = ShapeDisplay(&instruction.shape);
            write!(formatter, "  {root}{} = {shape} {}(", instruction.name, instruction.opcode)?;
            match &instruction.opcode {
                Opcode::Parameter(number) => write!(formatter, "{number}")?,
                _ => {
                    let operands = instruction
                        .operands
                        .iter()
                        .map(|operand| {
                            self.instructions.get(*operand).map_or("<invalid>", |operand| operand.name.as_str())
                        })
                        .collect::<Vec<_>>();
                    write!(formatter, "{}", operands.join(", "))?;
                }
            }
            write!(formatter, ")")?;
            match &instruction.opcode {
                Opcode::GetTupleElement(index) => write!(formatter, ", index={index}")?,
                Opcode::CustomCall(target) => write!(formatter, ", custom_call_target=\"{target}\"")?,
                _ => {}
            }
            writeln!(formatter)?;
        }
        write!(formatter, "}}")
    }
}

/// Helper used to render [`Shape`]s using the HLO text syntax (e.g., `f32[2,3]` or `(f32[2], s32[])`).
struct ShapeDisplay<'s>(&'s Shape);

impl Display for ShapeDisplay<'_> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = self.0;
        if shape.is_tuple() {
            write!(formatter, "(")?;
            for (index, element) in shape.tuple_shapes.iter().enumerate() {
                if index > 0 {
                    write!(formatter, ", ")?;
                }
                write!(formatter, "{}", ShapeDisplay(element))?;
            }
            return write!(formatter, ")");
        }
        let element_type = match BufferType::try_from(shape.element_type).unwrap_or(BufferType::Invalid) {
            BufferType::Invalid => "invalid",
            BufferType::Token => "token",
            BufferType::Predicate => "pred",
            BufferType::I8 => "s8",
            BufferType::I16 => "s16",
            BufferType::I32 => "s32",
            BufferType::I64 => "s64",
            BufferType::U8 => "u8",
            BufferType::U16 => "u16",
            BufferType::U32 => "u32",
            BufferType::U64 => "u64",
            BufferType::BF16 => "bf16",
            BufferType::F16 => "f16",
            BufferType::F32 => "f32",
            BufferType::F64 => "f64",
            BufferType::C64 => "c64",
            BufferType::C128 => "c128",
            BufferType::Tuple => "tuple",
            BufferType::OpaqueType => "opaque",
        };
        if matches!(element_type, "token" | "opaque") {
            return write!(formatter, "{element_type}[]");
        }
        let dimensions = shape.dimensions.iter().map(|dimension| dimension.to_string()).collect::<Vec<_>>();
        write!(formatter, "{element_type}[{}]", dimensions.join(","))
    }
}

/// Named cost properties (e.g., `"flops"`) that a [`CostAnalyzer`] has accumulated, ordered by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CostProperties {
    properties: BTreeMap<String, f32>,
}

impl CostProperties {
    /// Creates a new empty set of [`CostProperties`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the property with the provided name, or `0` if it has not been recorded.
    pub fn get<N: AsRef<str>>(&self, name: N) -> f32 {
        self.properties.get(name.as_ref()).copied().unwrap_or(0.0)
    }

    /// Sets the value of the property with the provided name.
    pub fn set<N: Into<String>>(&mut self, name: N, value: f32) {
        self.properties.insert(name.into(), value);
    }

    /// Adds `value` to the property with the provided name, treating missing properties as `0`.
    pub fn add<N: Into<String>>(&mut self, name: N, value: f32) {
        *self.properties.entry(name.into()).or_insert(0.0) += value;
    }

    /// Invokes `f` for every recorded property, in name order.
    pub fn for_each<F: FnMut(&str, f32)>(&self, mut f: F) {
        self.properties.iter().for_each(|(name, value)| f(name.as_str(), *value));
    }

    /// Number of recorded properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Returns `true` if no properties have been recorded.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Visitor that accumulates [`CostProperties`] while traversing a [`Computation`] via [`Computation::accept`].
pub trait CostAnalyzer {
    /// Accounts for the cost of `instruction`, which belongs to `computation`.
    fn visit(&mut self, instruction: &Instruction, computation: &Computation) -> Result<(), Error>;

    /// Properties that have been accumulated so far.
    fn properties(&self) -> &CostProperties;
}

/// Name of the property that counts floating-point operations.
pub const FLOPS_KEY: &str = "flops";

/// Name of the property that counts transcendental function evaluations.
pub const TRANSCENDENTALS_KEY: &str = "transcendentals";

/// Name of the property that counts the bytes read and written.
pub const BYTES_ACCESSED_KEY: &str = "bytes accessed";

/// Returns the name of the property that counts the bytes read from the `operand`-th operand of each instruction.
pub fn operand_bytes_accessed_key(operand: usize) -> String {
    format!("{BYTES_ACCESSED_KEY}{operand}{{}}")
}

/// Name of the property that counts the bytes written to the outputs of each instruction.
pub fn output_bytes_accessed_key() -> String {
    format!("{BYTES_ACCESSED_KEY}out{{}}")
}

/// Built-in [`CostAnalyzer`] that estimates floating-point operations, transcendental function evaluations, and
/// memory traffic of each instruction from its opcode and shapes.
///
/// In addition to the totals, it keeps the [`CostProperties`] of each visited instruction, which can be retrieved
/// using [`HloCostAnalysis::instruction_properties`].
#[derive(Clone, Debug, Default)]
pub struct HloCostAnalysis {
    properties: CostProperties,
    instruction_properties: HashMap<String, CostProperties>,
}

impl HloCostAnalysis {
    /// Creates a new [`HloCostAnalysis`] with no accumulated properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the [`CostProperties`] of the instruction with the provided name, if it has been visited.
    pub fn instruction_properties<N: AsRef<str>>(&self, name: N) -> Option<&CostProperties> {
        self.instruction_properties.get(name.as_ref())
    }

    /// Total number of floating-point operations accumulated so far.
    pub fn flop_count(&self) -> f32 {
        self.properties.get(FLOPS_KEY)
    }

    /// Total number of transcendental function evaluations accumulated so far.
    pub fn transcendental_count(&self) -> f32 {
        self.properties.get(TRANSCENDENTALS_KEY)
    }

    /// Total number of bytes accessed accumulated so far.
    pub fn bytes_accessed(&self) -> f32 {
        self.properties.get(BYTES_ACCESSED_KEY)
    }
}

impl CostAnalyzer for HloCostAnalysis {
    fn visit(&mut self, instruction: &Instruction, computation: &Computation) -> Result<(), Error> {
        let output_elements = element_count(instruction, &instruction.shape)?;
        let mut properties = CostProperties::new();

        let flops = match &instruction.opcode {
            opcode if opcode.is_elementwise_arithmetic() => output_elements,
            Opcode::Dot => {
                let lhs = computation.operand(instruction, 0).ok_or_else(|| {
                    Error::invalid_argument(format!("dot instruction '{}' has no operands", instruction.name))
                })?;
                let contracted = lhs.shape.dimensions.last().copied().unwrap_or(1).max(0) as f32;
                2.0 * output_elements * contracted
            }
            Opcode::Reduce => match computation.operand(instruction, 0) {
                Some(operand) => element_count(operand, &operand.shape)?,
                None => 0.0,
            },
            _ => 0.0,
        };
        let transcendentals = if instruction.opcode.is_transcendental() { output_elements } else { 0.0 };
        properties.set(FLOPS_KEY, flops);
        properties.set(TRANSCENDENTALS_KEY, transcendentals);

        let mut bytes_accessed = 0.0;
        if !instruction.opcode.is_free() {
            for operand in 0..instruction.operands.len() {
                let operand_bytes = match computation.operand(instruction, operand) {
                    Some(operand) => size_in_bytes(operand, &operand.shape)?,
                    None => 0.0,
                };
                properties.set(operand_bytes_accessed_key(operand), operand_bytes);
                bytes_accessed += operand_bytes;
            }
            let output_bytes = size_in_bytes(instruction, &instruction.shape)?;
            properties.set(output_bytes_accessed_key(), output_bytes);
            bytes_accessed += output_bytes;
        }
        properties.set(BYTES_ACCESSED_KEY, bytes_accessed);

        properties.for_each(|name, value| self.properties.add(name, value));
        self.instruction_properties.insert(instruction.name.clone(), properties);
        Ok(())
    }

    fn properties(&self) -> &CostProperties {
        &self.properties
    }
}

/// Number of elements of `shape` (which belongs to `instruction`). Returns an [`Error::InvalidArgument`] if that
/// number does not fit in a [`usize`].
fn element_count(instruction: &Instruction, shape: &Shape) -> Result<f32, Error> {
    shape.element_count().map(|count| count as f32).ok_or_else(|| shape_too_large(instruction, shape))
}

/// Number of bytes of `shape` (which belongs to `instruction`). Returns an [`Error::InvalidArgument`] if that number
/// does not fit in a [`usize`].
fn size_in_bytes(instruction: &Instruction, shape: &Shape) -> Result<f32, Error> {
    shape.size_in_bytes().map(|size| size as f32).ok_or_else(|| shape_too_large(instruction, shape))
}

fn shape_too_large(instruction: &Instruction, shape: &Shape) -> Error {
    Error::invalid_argument(format!("shape {} of instruction '{}' is too large", ShapeDisplay(shape), instruction.name))
}

#[cfg(test)]
pub(crate) mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use crate::protos::{BufferType, Shape};
    use crate::{
        BYTES_ACCESSED_KEY, Computation, CostAnalyzer, CostProperties, Error, FLOPS_KEY, HloCostAnalysis, Instruction,
        Opcode, Program, TRANSCENDENTALS_KEY, operand_bytes_accessed_key, output_bytes_accessed_key,
    };

    /// Computation that computes `exp(x @ y) + b` for `x: f32[2,4]`, `y: f32[4,3]`, and `b: f32[2,3]`.
    pub(crate) fn test_computation() -> Computation {
        Computation::new("main")
            .with_instruction(Instruction::new("x", Opcode::Parameter(0), [], Shape::array(BufferType::F32, [2, 4])))
            .with_instruction(Instruction::new("y", Opcode::Parameter(1), [], Shape::array(BufferType::F32, [4, 3])))
            .with_instruction(Instruction::new("b", Opcode::Parameter(2), [], Shape::array(BufferType::F32, [2, 3])))
            .with_instruction(Instruction::new("dot", Opcode::Dot, [0, 1], Shape::array(BufferType::F32, [2, 3])))
            .with_instruction(Instruction::new("exp", Opcode::Exp, [3], Shape::array(BufferType::F32, [2, 3])))
            .with_instruction(Instruction::new("add", Opcode::Add, [4, 2], Shape::array(BufferType::F32, [2, 3])))
    }

    #[test]
    fn test_program_code_and_format() {
        let program = Program::Mlir { bytecode: b"module {}".to_vec() };
        assert_eq!(program.format(), "mlir");
        assert_eq!(program.code(), b"module {}");
        assert_eq!(Program::Hlo { proto: vec![1, 2] }.format(), "hlo");
        assert_eq!(Program::HloWithConfig { proto: vec![3] }.format(), "hlo_with_config");
        assert_eq!(Program::HloWithConfig { proto: vec![3] }.code(), &[3]);
    }

    #[test]
    fn test_computation_display() {
        let computation = test_computation()
            .with_instruction(Instruction::new(
                "pair",
                Opcode::Tuple,
                [5, 3],
                Shape::tuple(vec![Shape::array(BufferType::F32, [2, 3]), Shape::array(BufferType::F32, [2, 3])]),
            ))
            .with_instruction(Instruction::new(
                "first",
                Opcode::GetTupleElement(0),
                [6],
                Shape::array(BufferType::F32, [2, 3]),
            ));
        assert_eq!(
            format!("{computation}"),
            indoc! {"
                ENTRY main {
                  x = f32[2,4] parameter(0)
                  y = f32[4,3] parameter(1)
                  b = f32[2,3] parameter(2)
                  dot = f32[2,3] dot(x, y)
                  exp = f32[2,3] exponential(dot)
                  add = f32[2,3] add(exp, b)
                  pair = (f32[2,3], f32[2,3]) tuple(add, dot)
                  ROOT first = f32[2,3] get-tuple-element(pair), index=0
                }"},
        );
        assert_eq!(computation.root().map(|root| root.name.as_str()), Some("first"));
        assert_eq!(computation.instructions().len(), 8);
        assert_eq!(Computation::new("empty").root(), None);
    }

    #[test]
    fn test_hlo_cost_analysis() {
        let computation = test_computation();
        let mut analysis = HloCostAnalysis::new();
        computation.accept(&mut analysis).unwrap();

        // dot: 2 * 6 * 4 flops; add: 6 flops; exp: 6 transcendentals.
        assert_eq!(analysis.flop_count(), 54.0);
        assert_eq!(analysis.transcendental_count(), 6.0);

        // dot: 32 + 48 + 24 bytes; exp: 24 + 24 bytes; add: 24 + 24 + 24 bytes.
        assert_eq!(analysis.bytes_accessed(), 224.0);
        assert_eq!(analysis.properties().get(operand_bytes_accessed_key(0)), 32.0 + 24.0 + 24.0);
        assert_eq!(analysis.properties().get(operand_bytes_accessed_key(1)), 48.0 + 24.0);
        assert_eq!(analysis.properties().get(output_bytes_accessed_key()), 72.0);

        let dot = analysis.instruction_properties("dot").unwrap();
        assert_eq!(dot.get(FLOPS_KEY), 48.0);
        assert_eq!(dot.get(BYTES_ACCESSED_KEY), 104.0);
        let x = analysis.instruction_properties("x").unwrap();
        assert_eq!(x.get(BYTES_ACCESSED_KEY), 0.0);
        assert_eq!(analysis.instruction_properties("missing"), None);

        let mut names = Vec::new();
        analysis.properties().for_each(|name, _| names.push(name.to_string()));
        assert_eq!(
            names,
            vec![
                BYTES_ACCESSED_KEY.to_string(),
                operand_bytes_accessed_key(0),
                operand_bytes_accessed_key(1),
                output_bytes_accessed_key(),
                FLOPS_KEY.to_string(),
                TRANSCENDENTALS_KEY.to_string(),
            ],
        );
    }

    #[test]
    fn test_computation_accept_invalid_operands() {
        let computation = Computation::new("broken")
            .with_instruction(Instruction::new("x", Opcode::Parameter(0), [], Shape::array(BufferType::F32, [2])))
            .with_instruction(Instruction::new("neg", Opcode::Negate, [2], Shape::array(BufferType::F32, [2])))
            .with_instruction(Instruction::new("abs", Opcode::Abs, [0], Shape::array(BufferType::F32, [2])));
        let mut analysis = HloCostAnalysis::new();
        assert!(matches!(
            computation.accept(&mut analysis),
            Err(Error::InvalidArgument { message, .. })
                if message == "instruction 'neg' in computation 'broken' refers to operand 2 which is not defined \
                    before it",
        ));

        // Instructions that precede the broken one have already been visited.
        assert!(analysis.instruction_properties("x").is_some());
        assert!(analysis.instruction_properties("abs").is_none());

        let computation = Computation::new("self")
            .with_instruction(Instruction::new("loop", Opcode::Copy, [0], Shape::array(BufferType::F32, [2])));
        assert!(matches!(computation.accept(&mut HloCostAnalysis::new()), Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_computation_accept_duplicate_names() {
        let computation = Computation::new("shadowed")
            .with_instruction(Instruction::new("x", Opcode::Parameter(0), [], Shape::array(BufferType::F32, [2])))
            .with_instruction(Instruction::new("y", Opcode::Negate, [0], Shape::array(BufferType::F32, [2])))
            .with_instruction(Instruction::new("y", Opcode::Exp, [1], Shape::array(BufferType::F32, [2])));
        let mut analysis = HloCostAnalysis::new();
        assert!(matches!(
            computation.accept(&mut analysis),
            Err(Error::InvalidArgument { message, .. })
                if message == "instruction name 'y' is defined more than once in computation 'shadowed'",
        ));

        // The first instruction with the name keeps its own properties.
        assert_eq!(analysis.instruction_properties("y").map(|y| y.get(FLOPS_KEY)), Some(2.0));
        assert_eq!(analysis.transcendental_count(), 0.0);
    }

    #[test]
    fn test_hlo_cost_analysis_oversized_shapes() {
        let huge = Shape::array(BufferType::F32, [1i64 << 32, 1i64 << 32]);
        let computation = Computation::new("huge")
            .with_instruction(Instruction::new("x", Opcode::Parameter(0), [], Shape::array(BufferType::F32, [2])))
            .with_instruction(Instruction::new("neg", Opcode::Negate, [0], huge));
        assert!(matches!(
            computation.accept(&mut HloCostAnalysis::new()),
            Err(Error::InvalidArgument { message, .. })
                if message == "shape f32[4294967296,4294967296] of instruction 'neg' is too large",
        ));

        // The element count of `x` fits but its size in bytes does not, which only matters once `x` is read.
        let wide = Shape::array(BufferType::F32, [1i64 << 62]);
        let computation = Computation::new("wide")
            .with_instruction(Instruction::new("x", Opcode::Parameter(0), [], wide.clone()))
            .with_instruction(Instruction::new("neg", Opcode::Negate, [0], wide));
        let mut analysis = HloCostAnalysis::new();
        assert!(matches!(
            computation.accept(&mut analysis),
            Err(Error::InvalidArgument { message, .. })
                if message == "shape f32[4611686018427387904] of instruction 'x' is too large",
        ));
        assert!(analysis.instruction_properties("x").is_some());
        assert!(analysis.instruction_properties("neg").is_none());
    }

    #[test]
    fn test_computation_accept_propagates_analyzer_errors() {
        struct FailingAnalyzer {
            properties: CostProperties,
            visited: usize,
        }

        impl CostAnalyzer for FailingAnalyzer {
            fn visit(&mut self, instruction: &Instruction, _computation: &Computation) -> Result<(), Error> {
                self.visited += 1;
                match instruction.opcode {
                    Opcode::Dot => Err(Error::unimplemented("dot is not supported")),
                    _ => Ok(()),
                }
            }

            fn properties(&self) -> &CostProperties {
                &self.properties
            }
        }

        let mut analyzer = FailingAnalyzer { properties: CostProperties::new(), visited: 0 };
        assert!(matches!(
            test_computation().accept(&mut analyzer),
            Err(Error::Unimplemented { message, .. }) if message == "dot is not supported",
        ));
        assert_eq!(analyzer.visited, 4);
    }

    #[test]
    fn test_cost_properties() {
        let mut properties = CostProperties::new();
        assert!(properties.is_empty());
        properties.add("flops", 2.0);
        properties.add("flops", 3.0);
        properties.set("utilization", 0.5);
        assert_eq!(properties.len(), 2);
        assert_eq!(properties.get("flops"), 5.0);
        assert_eq!(properties.get("missing"), 0.0);
    }
}
