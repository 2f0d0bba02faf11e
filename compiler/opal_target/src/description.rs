//! Target triples and code models.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    AArch64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Windows,
    Linux,
    MacOs,
    Android,
    Ios,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    None,
    Msvc,
    Gnu,
}

/// Controls addressing-mode selection: `Small` keeps everything within
/// ±2 GiB relative addressing, `Large` materialises full 64-bit addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeModel {
    Small,
    Large,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDescription {
    pub architecture: Architecture,
    pub operating_system: OperatingSystem,
    pub environment: Environment,
}

impl TargetDescription {
    pub fn new(
        architecture: Architecture,
        operating_system: OperatingSystem,
        environment: Environment,
    ) -> Self {
        Self {
            architecture,
            operating_system,
            environment,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.operating_system == OperatingSystem::Windows
    }

    pub fn is_unix(&self) -> bool {
        matches!(
            self.operating_system,
            OperatingSystem::Linux | OperatingSystem::Android
        )
    }

    pub fn is_darwin(&self) -> bool {
        matches!(
            self.operating_system,
            OperatingSystem::MacOs | OperatingSystem::Ios
        )
    }
}

impl fmt::Display for TargetDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arch = match self.architecture {
            Architecture::X86_64 => "x86_64",
            Architecture::AArch64 => "aarch64",
        };
        let os = match self.operating_system {
            OperatingSystem::Windows => "windows",
            OperatingSystem::Linux => "linux",
            OperatingSystem::MacOs => "macos",
            OperatingSystem::Android => "android",
            OperatingSystem::Ios => "ios",
        };

        match self.environment {
            Environment::None => write!(f, "{}-{}", arch, os),
            Environment::Msvc => write!(f, "{}-{}-msvc", arch, os),
            Environment::Gnu => write!(f, "{}-{}-gnu", arch, os),
        }
    }
}
