use crate::{Client, CompileOptions, Error, LoadedExecutable, Program};

/// Entry point for turning [`Program`]s (or previously serialized executables) into [`LoadedExecutable`]s that are
/// bound to a specific [`Client`]. Failures returned by the underlying native compiler are passed through unchanged.
#[derive(Clone, Debug)]
pub struct Compiler {
    client: Client,
}

impl Compiler {
    /// Creates a new [`Compiler`] that compiles programs for the provided [`Client`].
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns the [`Client`] that this [`Compiler`] compiles programs for.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Returns the name of the platform that this [`Compiler`] targets.
    pub fn platform_name(&self) -> &str {
        self.client.platform_name()
    }

    /// Compiles the provided [`Program`] using the provided [`CompileOptions`].
    pub fn compile(&self, program: &Program, options: CompileOptions) -> Result<LoadedExecutable, Error> {
        self.client.compile(program, &options)
    }

    /// Deserializes and loads an executable that was produced by [`LoadedExecutable::serialize`]. Refer to
    /// [`Client::deserialize_and_load_executable`] for more information.
    pub fn deserialize_loaded_executable(
        &self,
        serialized: &[u8],
        options: Option<CompileOptions>,
    ) -> Result<LoadedExecutable, Error> {
        self.client.deserialize_and_load_executable(serialized, options.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::tests::{test_client, test_program};
    use crate::{CompileOptions, Compiler, Error, ExecutableBuildOptions, Program};

    #[test]
    fn test_compiler_compile() {
        let compiler = Compiler::new(test_client());
        assert_eq!(compiler.platform_name(), "cpu");
        assert_eq!(compiler.client().devices().len(), 8);

        let options = CompileOptions {
            executable_build_options: ExecutableBuildOptions { partition_count: 4, ..Default::default() },
            ..Default::default()
        };
        let executable = compiler.compile(&test_program(), options.clone()).unwrap();
        assert_eq!(executable.name(), "main");
        assert_eq!(executable.partition_count(), 4);
        assert_eq!(executable.compile_options(), Ok(options));
        assert_eq!(executable.output_shardings().map(|shardings| shardings.len()), Some(2));
        assert_eq!(executable.parameter_shardings().map(|shardings| shardings.len()), Some(3));
    }

    #[test]
    fn test_compiler_deserialize_loaded_executable() {
        let compiler = Compiler::new(test_client());
        let executable = compiler.compile(&test_program(), CompileOptions::default()).unwrap();
        let serialized = executable.serialize().unwrap();

        let deserialized = compiler.deserialize_loaded_executable(serialized.data(), None).unwrap();
        assert_eq!(deserialized.name(), executable.name());
        assert_eq!(deserialized.compile_options(), Ok(CompileOptions::default()));

        let options = CompileOptions { compile_portable_executable: true, ..Default::default() };
        let deserialized = compiler.deserialize_loaded_executable(serialized.data(), Some(options.clone())).unwrap();
        assert_eq!(deserialized.compile_options(), Ok(options));
    }

    #[test]
    fn test_compiler_does_not_translate_errors() {
        let compiler = Compiler::new(test_client());
        assert!(matches!(
            compiler.compile(&Program::Mlir { bytecode: Vec::new() }, CompileOptions::default()),
            Err(Error::InvalidArgument { message, .. }) if message == "cannot compile an empty program",
        ));
        assert!(matches!(
            compiler.deserialize_loaded_executable(&[0xde, 0xad], None),
            Err(Error::InvalidArgument { message, .. }) if message == "malformed serialized executable",
        ));
    }
}
