//! The backend pipeline: lowering, machine passes, emission.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use opal_codegen::{MachinePass, PrologEpilogPass, RegAllocPass, StackFramePass};
use opal_common::timing::ScopeTimer;
use opal_common::BackendResult;
use opal_emit::{DebugEmitter, Emitter, GasEmitter, NasmEmitter};
use opal_mcode as mcode;
use opal_ssa as ssa;
use opal_target::{Architecture, CodeModel, Target, TargetDescription};

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// When set, a debug dump of the machine module is written here after
    /// lowering and after every pass.
    pub dump_dir: Option<PathBuf>,
}

/// Composes and runs the machine-pass pipeline:
/// pre passes, register allocation, stack frame layout, prolog/epilog
/// insertion, post passes.
pub struct PassRunner {
    target: Target,
    dump_dir: Option<PathBuf>,
}

impl PassRunner {
    pub fn new(target: Target, dump_dir: Option<PathBuf>) -> Self {
        Self { target, dump_dir }
    }

    pub fn run(&self, module: &mut mcode::Module) -> BackendResult<()> {
        let mut passes: Vec<Box<dyn MachinePass>> = Vec::new();
        passes.extend(self.target.create_pre_passes());
        passes.push(Box::new(RegAllocPass::new(self.target.reg_analyzer())));
        passes.push(Box::new(StackFramePass::new()));
        passes.push(Box::new(PrologEpilogPass::new()));
        passes.extend(self.target.create_post_passes());

        self.dump(module, "lir_input")?;

        for (index, pass) in passes.iter_mut().enumerate() {
            pass.run(module);
            self.dump(module, &format!("lir_pass{}", index))?;
        }

        Ok(())
    }

    fn dump(&self, module: &mcode::Module, name: &str) -> BackendResult<()> {
        let Some(dir) = &self.dump_dir else {
            return Ok(());
        };

        let path = dir.join(format!("{}.opalasm", name));
        let mut stream = BufWriter::new(File::create(path)?);
        DebugEmitter::new(self.target.descr().architecture).generate(module, &mut stream)?;
        Ok(())
    }
}

/// Compiles one SSA module to assembly text for the given target.
pub fn compile_module(
    module: &ssa::Module,
    descr: TargetDescription,
    code_model: CodeModel,
    options: &CompileOptions,
) -> BackendResult<String> {
    let _timer = ScopeTimer::new("backend pipeline");
    let target = Target::new(descr, code_model);

    log::debug!("lowering module for {}", descr);
    let mut machine_module = target.lower_module(module);

    PassRunner::new(target, options.dump_dir.clone()).run(&mut machine_module)?;

    log::debug!("emitting assembly for {}", descr);
    let mut buffer = Vec::new();
    match descr.architecture {
        Architecture::X86_64 => {
            NasmEmitter::new(descr).generate(&machine_module, &mut buffer)?;
        }
        Architecture::AArch64 => {
            GasEmitter::new(descr).generate(&machine_module, &mut buffer)?;
        }
    }

    Ok(String::from_utf8(buffer).expect("emitters produce UTF-8"))
}

/// Lowers and runs the pass pipeline without emitting, for callers that
/// consume the machine module directly (object emitters).
pub fn build_machine_module(
    module: &ssa::Module,
    descr: TargetDescription,
    code_model: CodeModel,
    options: &CompileOptions,
) -> BackendResult<mcode::Module> {
    let target = Target::new(descr, code_model);
    let mut machine_module = target.lower_module(module);
    PassRunner::new(target, options.dump_dir.clone()).run(&mut machine_module)?;
    Ok(machine_module)
}
