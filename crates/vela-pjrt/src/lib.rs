pub mod clients;
pub mod compiler;
pub mod configuration;
pub mod devices;
pub mod errors;
pub mod executables;
pub mod options;
pub mod programs;
pub mod shardings;
pub mod values;

pub use clients::*;
pub use compiler::*;
pub use configuration::*;
pub use devices::*;
pub use errors::*;
pub use executables::*;
pub use options::*;
pub use programs::*;
pub use shardings::*;
pub use values::*;

pub use vela_protos as protos;
