//! Target-independent code generation machinery
//!
//! - The SSA lowering driver and its per-target lowerer interface
//! - Liveness analysis and the register allocator
//! - Machine passes: stack frame layout, prolog/epilog insertion
//! - The register-analyzer interface targets implement for the allocator

pub mod late_reg_alloc;
pub mod liveness;
pub mod machine_pass;
pub mod prolog_epilog_pass;
pub mod reg_alloc_func;
pub mod reg_alloc_pass;
pub mod reg_analyzer;
pub mod ssa_lowerer;
pub mod stack_frame_pass;

pub use late_reg_alloc::LateRegAlloc;
pub use liveness::{BlockLiveness, KillPoint, LivenessAnalysis};
pub use machine_pass::MachinePass;
pub use prolog_epilog_pass::PrologEpilogPass;
pub use reg_alloc_func::{LiveRange, LiveRangeGroup, RaBlock, RaFunc, RaInstr, RaPoint, RaRange};
pub use reg_alloc_pass::RegAllocPass;
pub use reg_analyzer::{SpilledRegUse, TargetRegAnalyzer};
pub use ssa_lowerer::{lower_module, LowerCtx, TargetSsaLowerer};
pub use stack_frame_pass::StackFramePass;
