//! Target dispatch.

use opal_codegen::{MachinePass, TargetRegAnalyzer};
use opal_mcode as mcode;
use opal_ssa as ssa;
use opal_ssa::DataLayout;

use crate::aarch64::{AArch64RegAnalyzer, AArch64SsaLowerer};
use crate::description::{Architecture, CodeModel, OperatingSystem, TargetDescription};
use crate::x86_64::{X64PeepholePass, X64RegAnalyzer, X64SsaLowerer};

/// One compilation target: architecture + OS + code model. Creates the
/// per-architecture lowerer, register analyzer and machine passes.
#[derive(Debug, Clone, Copy)]
pub struct Target {
    descr: TargetDescription,
    code_model: CodeModel,
}

impl Target {
    pub fn new(descr: TargetDescription, code_model: CodeModel) -> Self {
        Self { descr, code_model }
    }

    pub fn descr(&self) -> TargetDescription {
        self.descr
    }

    pub fn code_model(&self) -> CodeModel {
        self.code_model
    }

    pub fn data_layout(&self) -> DataLayout {
        DataLayout::default()
    }

    /// The calling convention used when the SSA function does not name one.
    pub fn default_calling_conv(&self) -> ssa::CallingConv {
        match self.descr.architecture {
            Architecture::X86_64 => match self.descr.operating_system {
                OperatingSystem::Windows => ssa::CallingConv::X86_64MsAbi,
                _ => ssa::CallingConv::X86_64SysV,
            },
            Architecture::AArch64 => ssa::CallingConv::AArch64Aapcs,
        }
    }

    /// Runs instruction selection over the whole module.
    pub fn lower_module(&self, module: &ssa::Module) -> mcode::Module {
        match self.descr.architecture {
            Architecture::X86_64 => {
                let mut lowerer = X64SsaLowerer::new(self.descr, self.code_model);
                opal_codegen::lower_module(&mut lowerer, module)
            }
            Architecture::AArch64 => {
                let mut lowerer = AArch64SsaLowerer::new(self.descr, self.code_model);
                opal_codegen::lower_module(&mut lowerer, module)
            }
        }
    }

    pub fn reg_analyzer(&self) -> &'static dyn TargetRegAnalyzer {
        match self.descr.architecture {
            Architecture::X86_64 => &X64RegAnalyzer::INSTANCE,
            Architecture::AArch64 => &AArch64RegAnalyzer::INSTANCE,
        }
    }

    pub fn create_pre_passes(&self) -> Vec<Box<dyn MachinePass>> {
        Vec::new()
    }

    pub fn create_post_passes(&self) -> Vec<Box<dyn MachinePass>> {
        match self.descr.architecture {
            Architecture::X86_64 => vec![Box::new(X64PeepholePass::new())],
            Architecture::AArch64 => Vec::new(),
        }
    }
}
