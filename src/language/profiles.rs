//! Built-in language table.
//!
//! Sources are mounted read-only, so every compile step writes its
//! output under `/tmp` inside the container.

use super::AuxiliaryFile;

/// Static description of a built-in language. The image here is only the
/// default; the registry applies operator overrides on top.
pub struct Builtin {
    pub id: &'static str,
    pub aliases: &'static [&'static str],
    pub file_extension: &'static str,
    pub default_image: &'static str,
    pub mount_target: &'static str,
    pub command: &'static str,
    /// Command builds the program before running it.
    pub compiled: bool,
    pub auxiliary_files: &'static [AuxiliaryFile],
}

const CSPROJ: &str = r#"<Project Sdk="Microsoft.NET.Sdk">
  <PropertyGroup>
    <OutputType>Exe</OutputType>
    <TargetFramework>net8.0</TargetFramework>
    <ImplicitUsings>enable</ImplicitUsings>
    <Nullable>disable</Nullable>
  </PropertyGroup>
</Project>
"#;

pub const BUILTIN: &[Builtin] = &[
    Builtin {
        id: "python",
        aliases: &["py", "python3"],
        file_extension: "py",
        default_image: "python:3.12-slim",
        mount_target: "main.py",
        command: "python3 -u /app/main.py",
        compiled: false,
        auxiliary_files: &[],
    },
    Builtin {
        id: "c",
        aliases: &[],
        file_extension: "c",
        default_image: "gcc:13",
        mount_target: "main.c",
        command: "gcc -O2 -pipe -o /tmp/main /app/main.c -lm && /tmp/main",
        compiled: true,
        auxiliary_files: &[],
    },
    Builtin {
        id: "cpp",
        aliases: &["c++", "cxx"],
        file_extension: "cpp",
        default_image: "gcc:13",
        mount_target: "main.cpp",
        command: "g++ -O2 -pipe -std=c++17 -o /tmp/main /app/main.cpp && /tmp/main",
        compiled: true,
        auxiliary_files: &[],
    },
    Builtin {
        id: "java",
        aliases: &[],
        file_extension: "java",
        default_image: "eclipse-temurin:21-jdk",
        mount_target: "Main.java",
        command: "javac -d /tmp /app/Main.java && java -cp /tmp Main",
        compiled: true,
        auxiliary_files: &[],
    },
    Builtin {
        id: "javascript",
        aliases: &["js", "node"],
        file_extension: "js",
        default_image: "node:22-slim",
        mount_target: "main.js",
        command: "node /app/main.js",
        compiled: false,
        auxiliary_files: &[],
    },
    Builtin {
        id: "typescript",
        aliases: &["ts"],
        file_extension: "ts",
        default_image: "node:22-slim",
        mount_target: "main.ts",
        command: "node --experimental-strip-types --no-warnings /app/main.ts",
        compiled: false,
        auxiliary_files: &[],
    },
    Builtin {
        id: "csharp",
        aliases: &["cs", "c#", "dotnet"],
        file_extension: "cs",
        default_image: "mcr.microsoft.com/dotnet/sdk:8.0",
        mount_target: "Program.cs",
        command: "export DOTNET_NOLOGO=1 DOTNET_CLI_TELEMETRY_OPTOUT=1 && \
                  mkdir -p /tmp/build && cp /app/Program.cs /app/Program.csproj /tmp/build/ && \
                  cd /tmp/build && dotnet run --nologo -v q",
        compiled: true,
        auxiliary_files: &[AuxiliaryFile {
            name: "Program.csproj",
            content: CSPROJ,
        }],
    },
    Builtin {
        id: "ruby",
        aliases: &["rb"],
        file_extension: "rb",
        default_image: "ruby:3.3-slim",
        mount_target: "main.rb",
        command: "ruby /app/main.rb",
        compiled: false,
        auxiliary_files: &[],
    },
    Builtin {
        id: "php",
        aliases: &[],
        file_extension: "php",
        default_image: "php:8.3-cli",
        mount_target: "main.php",
        command: "php /app/main.php",
        compiled: false,
        auxiliary_files: &[],
    },
    Builtin {
        id: "go",
        aliases: &["golang"],
        file_extension: "go",
        default_image: "golang:1.22",
        mount_target: "main.go",
        command: "cd /tmp && GOCACHE=/tmp/.gocache go build -o /tmp/main /app/main.go && /tmp/main",
        compiled: true,
        auxiliary_files: &[],
    },
    Builtin {
        id: "rust",
        aliases: &["rs"],
        file_extension: "rs",
        default_image: "rust:1-slim",
        mount_target: "main.rs",
        command: "rustc -O -o /tmp/main /app/main.rs && /tmp/main",
        compiled: true,
        auxiliary_files: &[],
    },
];

/// Maps an identifier or alias (any case) to its canonical id.
pub fn canonical_id(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    BUILTIN
        .iter()
        .find(|b| b.id == needle || b.aliases.contains(&needle.as_str()))
        .map(|b| b.id)
}
