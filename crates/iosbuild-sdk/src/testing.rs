//! Recording stand-in for CMake and xcodebuild used by the unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::runner::{CommandRunner, OutputPolicy, render_command};
use crate::types::{BuildError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    pub fn value_after(&self, flag: &str) -> Option<&str> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(String::as_str)
    }
}

/// Simulates the two tools:
///
/// * `cmake -S .. -B dir` remembers the install prefix for `dir`
/// * `cmake --install dir` writes the configured libraries under that prefix
/// * `xcodebuild -create-xcframework .. -output path` creates `path`
pub(crate) struct FakeRunner {
    calls: RefCell<Vec<Invocation>>,
    prefixes: RefCell<HashMap<String, PathBuf>>,
    libraries: Vec<String>,
    missing: Vec<String>,
    fail_when: Vec<(String, String)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            prefixes: RefCell::new(HashMap::new()),
            libraries: Vec::new(),
            missing: Vec::new(),
            fail_when: Vec::new(),
        }
    }

    /// Files the fake install step writes, relative to the install prefix.
    pub fn installing(mut self, files: &[&str]) -> Self {
        self.libraries = files.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Reports `program` as not found.
    pub fn missing(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    /// Fails any `program` invocation whose arguments contain `needle`.
    pub fn failing(mut self, program: &str, needle: &str) -> Self {
        self.fail_when.push((program.to_string(), needle.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.program == program)
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String], _policy: OutputPolicy) -> Result<()> {
        let call = Invocation {
            program: program.to_string(),
            args: args.to_vec(),
        };
        self.calls.borrow_mut().push(call.clone());

        if self.missing.iter().any(|m| m == program) {
            return Err(BuildError::ToolNotFound {
                tool: program.to_string(),
            });
        }
        if self
            .fail_when
            .iter()
            .any(|(p, needle)| p == program && args.iter().any(|a| a.contains(needle.as_str())))
        {
            return Err(BuildError::ToolExecution {
                tool: program.to_string(),
                command: render_command(program, args),
                status: Some(1),
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            });
        }

        if let Some(build_dir) = call.value_after("-B") {
            let prefix = args
                .iter()
                .find_map(|a| a.strip_prefix("-DCMAKE_INSTALL_PREFIX="))
                .map(PathBuf::from)
                .expect("configure without install prefix");
            fs::write(PathBuf::from(build_dir).join("CMakeCache.txt"), "").unwrap();
            self.prefixes.borrow_mut().insert(build_dir.to_string(), prefix);
        } else if let Some(build_dir) = call.value_after("--install") {
            let prefix = self.prefixes.borrow()[build_dir].clone();
            for file in &self.libraries {
                let path = prefix.join(file);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, b"!<arch>\n").unwrap();
            }
            fs::create_dir_all(&prefix).unwrap();
        } else if call.has_arg("-create-xcframework") {
            let output = PathBuf::from(call.value_after("-output").expect("missing -output"));
            fs::create_dir_all(&output).unwrap();
            fs::write(output.join("Info.plist"), "").unwrap();
        }
        Ok(())
    }
}
