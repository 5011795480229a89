/// Toolchains - Per-Language Compile and Run Commands
///
/// Every command runs with the submission's workspace as working directory,
/// so the same argument vectors serve the local and the Docker backend.

use codejudge_common::Language;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: &'static str,
    pub args: &'static [&'static str],
}

impl CommandLine {
    const fn new(program: &'static str, args: &'static [&'static str]) -> Self {
        Self { program, args }
    }

    pub fn args(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string()).collect()
    }

    /// `program arg1 arg2 ...`, for logs and for `sh -c` inside containers
    pub fn display(&self) -> String {
        std::iter::once(self.program)
            .chain(self.args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub language: Language,
    /// File name the source is written to inside the workspace
    pub source_file: &'static str,
    pub compile: CommandLine,
    pub run: CommandLine,
    /// Default container image for the Docker backend
    pub image: &'static str,
}

const JAVA: Toolchain = Toolchain {
    language: Language::Java,
    source_file: "Main.java",
    compile: CommandLine::new("javac", &["Main.java"]),
    run: CommandLine::new("java", &["-cp", ".", "Main"]),
    image: "eclipse-temurin:17-jdk",
};

const PYTHON: Toolchain = Toolchain {
    language: Language::Python,
    source_file: "main.py",
    compile: CommandLine::new("python3", &["-m", "py_compile", "main.py"]),
    run: CommandLine::new("python3", &["main.py"]),
    image: "python:3.12-slim",
};

const RUST: Toolchain = Toolchain {
    language: Language::Rust,
    source_file: "main.rs",
    compile: CommandLine::new("rustc", &["-O", "-o", "main", "main.rs"]),
    run: CommandLine::new("./main", &[]),
    image: "rust:1-slim",
};

pub fn toolchain(language: Language) -> &'static Toolchain {
    match language {
        Language::Java => &JAVA,
        Language::Python => &PYTHON,
        Language::Rust => &RUST,
    }
}
