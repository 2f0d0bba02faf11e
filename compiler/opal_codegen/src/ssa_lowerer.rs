//! The SSA lowering driver.
//!
//! Walks each function's blocks in program order and each block's
//! instructions from last to first, inserting the emitted machine code at
//! the block's current head. Seeing every use before its definition enables
//! two things without a separate liveness pass: results with no uses are
//! skipped entirely, and a single-use load can be folded into its consumer
//! as an address operand.

use hashbrown::HashMap;

use opal_common::timing::ScopeTimer;
use opal_mcode as mcode;
use opal_mcode::{ArgStorage, CallingConvention, InstrFlags, ReturnMethod, StackSlotId};
use opal_ssa as ssa;
use opal_ssa::{DataLayout, StructureId, Type, VirtualRegister};

/// Per-target instruction selection. One `lower_*` method per SSA opcode;
/// the defaults log a warning and emit nothing, which keeps unfinished
/// targets diagnosable without taking the compiler down.
pub trait TargetSsaLowerer {
    fn data_layout(&self) -> DataLayout;

    fn calling_convention(&self, conv: ssa::CallingConv) -> &'static dyn CallingConvention;

    fn init_module(&mut self, _module: &ssa::Module, _machine_module: &mut mcode::Module) {}

    /// Spills the hidden return pointer into its stack slot at function
    /// entry.
    fn store_sret_pointer(&mut self, ctx: &mut LowerCtx, slot: StackSlotId);

    fn lower_load(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("load");
    }

    fn lower_store(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("store");
    }

    fn lower_loadarg(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("loadarg");
    }

    fn lower_add(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("add");
    }

    fn lower_sub(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("sub");
    }

    fn lower_mul(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("mul");
    }

    fn lower_sdiv(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("sdiv");
    }

    fn lower_srem(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("srem");
    }

    fn lower_udiv(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("udiv");
    }

    fn lower_urem(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("urem");
    }

    fn lower_fadd(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fadd");
    }

    fn lower_fsub(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fsub");
    }

    fn lower_fmul(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fmul");
    }

    fn lower_fdiv(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fdiv");
    }

    fn lower_and(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("and");
    }

    fn lower_or(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("or");
    }

    fn lower_xor(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("xor");
    }

    fn lower_shl(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("shl");
    }

    fn lower_shr(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("shr");
    }

    fn lower_jmp(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("jmp");
    }

    fn lower_cjmp(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("cjmp");
    }

    fn lower_fcjmp(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fcjmp");
    }

    fn lower_select(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("select");
    }

    fn lower_call(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("call");
    }

    fn lower_ret(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("ret");
    }

    fn lower_uextend(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("uextend");
    }

    fn lower_sextend(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("sextend");
    }

    fn lower_truncate(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("truncate");
    }

    fn lower_fpromote(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fpromote");
    }

    fn lower_fdemote(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("fdemote");
    }

    fn lower_utof(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("utof");
    }

    fn lower_stof(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("stof");
    }

    fn lower_ftou(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("ftou");
    }

    fn lower_ftos(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("ftos");
    }

    fn lower_offsetptr(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("offsetptr");
    }

    fn lower_memberptr(&mut self, _ctx: &mut LowerCtx, _instr: &ssa::Instruction) {
        warn_unimplemented("memberptr");
    }

    /// Block copies default to a `memcpy` call through the standard calling
    /// convention. Targets override this for small copies.
    fn lower_copy(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        let size = ctx.size(instr.operand(2).ty);
        let call = synthesize_memcpy_call(ctx, instr, size);
        self.lower_call(ctx, &call);
    }

    /// Square roots default to a call to the libm `sqrt` external function.
    fn lower_sqrt(&mut self, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
        debug_assert!(
            ctx.module.external_function("sqrt").is_some(),
            "front-end must declare sqrt for this target"
        );

        let ty = instr.operand(0).ty;
        let mut call = ssa::Instruction::with_dest(
            ssa::Opcode::Call,
            instr.dest.expect("sqrt has a destination"),
            vec![
                ssa::Value::from_extern_func("sqrt", ty),
                instr.operand(0).clone(),
            ],
        );
        call.attrs = instr.attrs;
        self.lower_call(ctx, &call);
    }
}

fn warn_unimplemented(name: &str) {
    log::warn!("cannot lower instruction {}", name);
}

fn synthesize_memcpy_call(
    ctx: &LowerCtx,
    copy_instr: &ssa::Instruction,
    size: u32,
) -> ssa::Instruction {
    debug_assert!(
        ctx.module.external_function("memcpy").is_some(),
        "front-end must declare memcpy for this target"
    );

    ssa::Instruction::new(
        ssa::Opcode::Call,
        vec![
            ssa::Value::from_extern_func("memcpy", Type::Void),
            copy_instr.operand(0).clone(),
            copy_instr.operand(1).clone(),
            ssa::Value::from_int_immediate(size as i64, ctx.layout.usize_type()),
        ],
    )
}

/// Shared lowering state for the function currently being translated.
pub struct LowerCtx<'m> {
    pub module: &'m ssa::Module,
    pub func: &'m ssa::Function,
    pub layout: DataLayout,
    pub machine_module: &'m mut mcode::Module,
    pub machine_func: mcode::Function,

    /// The SSA block currently being lowered.
    pub block: ssa::BlockId,
    /// The SSA instruction currently being lowered.
    pub instr: Option<ssa::InstrId>,
    /// Stack slot holding the hidden return pointer, if the function
    /// returns through one.
    pub sret_slot: Option<StackSlotId>,

    machine_block: mcode::BasicBlock,
    insertion: Option<mcode::InstrId>,
    pending_flags: InstrFlags,
    reg_use_counts: HashMap<VirtualRegister, u32>,
    stack_regs: HashMap<VirtualRegister, StackSlotId>,
    next_vreg: u32,
}

impl<'m> LowerCtx<'m> {
    /// Inserts the instruction at the current insertion point, tagged with
    /// any pending flags. Repeated calls keep their emission order.
    pub fn emit(&mut self, mut instr: mcode::Instruction) -> mcode::InstrId {
        instr.flags |= self.pending_flags;

        match self.insertion {
            Some(anchor) => self.machine_block.instrs.insert_before(anchor, instr),
            None => self.machine_block.instrs.push_back(instr),
        }
    }

    /// Runs `f` with `flag` OR-ed into every emitted instruction.
    pub fn with_flag<R>(&mut self, flag: InstrFlags, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.pending_flags;
        self.pending_flags |= flag;
        let result = f(self);
        self.pending_flags = saved;
        result
    }

    pub fn emitted_instr_mut(&mut self, id: mcode::InstrId) -> &mut mcode::Instruction {
        self.machine_block.instrs.get_mut(id)
    }

    pub fn size(&self, ty: Type) -> u32 {
        self.layout.size(self.module, ty)
    }

    pub fn alignment(&self, ty: Type) -> u32 {
        self.layout.alignment(self.module, ty)
    }

    pub fn member_offset(&self, struct_id: StructureId, index: usize) -> u32 {
        self.layout.member_offset(self.module, struct_id, index)
    }

    /// Maps an SSA virtual register to its machine location: allocas become
    /// stack slots, everything else stays a virtual register.
    pub fn map_vreg(&self, reg: VirtualRegister) -> mcode::Register {
        match self.stack_regs.get(&reg) {
            Some(slot) => mcode::Register::StackSlot(*slot),
            None => mcode::Register::Virtual(reg),
        }
    }

    pub fn map_vreg_as_reg(&self, reg: VirtualRegister) -> mcode::Register {
        debug_assert!(!self.stack_regs.contains_key(&reg));
        mcode::Register::Virtual(reg)
    }

    pub fn map_vreg_as_operand(&self, reg: VirtualRegister, size: u8) -> mcode::Operand {
        mcode::Operand::from_register(self.map_vreg(reg), size)
    }

    pub fn map_vreg_dst(&self, instr: &ssa::Instruction, size: u8) -> mcode::Operand {
        let dest = instr.dest.expect("instruction has no destination");
        mcode::Operand::from_register(self.map_vreg_as_reg(dest), size)
    }

    /// A fresh virtual register for lowering temporaries.
    pub fn new_vreg(&mut self) -> mcode::Register {
        let reg = self.next_vreg;
        self.next_vreg += 1;
        mcode::Register::Virtual(reg)
    }

    pub fn current_block(&self) -> &'m ssa::BasicBlock {
        self.func.block(self.block)
    }

    /// The block after the current one in layout order, for fall-through
    /// branch elision.
    pub fn next_block_in_layout(&self) -> Option<ssa::BlockId> {
        self.func.blocks.next(self.block)
    }

    /// Finds the instruction in the current block that defines `reg`.
    /// Deliberately never searches other blocks.
    pub fn producer(&self, reg: VirtualRegister) -> Option<&'m ssa::Instruction> {
        let block = self.func.block(self.block);
        let mut cursor = block.instrs.last();

        while let Some(id) = cursor {
            let instr = block.instrs.get(id);
            if instr.dest == Some(reg) {
                return Some(instr);
            }
            cursor = block.instrs.prev(id);
        }

        None
    }

    pub fn num_uses(&self, reg: VirtualRegister) -> u32 {
        self.reg_use_counts.get(&reg).copied().unwrap_or(0)
    }

    pub fn discard_use(&mut self, reg: VirtualRegister) {
        if let Some(count) = self.reg_use_counts.get_mut(&reg) {
            *count = count.saturating_sub(1);
        }
    }

    /// Argument storage for the current function's declared parameters,
    /// with any hidden return pointer already skipped.
    pub fn arg_storage(&self) -> Vec<ArgStorage> {
        func_arg_storage(
            self.machine_func.calling_conv,
            &self.func.params,
            self.machine_func.uses_sret,
        )
    }

    pub fn return_method(&self) -> ReturnMethod {
        let size = self.size(self.func.return_type);
        self.machine_func.calling_conv.return_method(size)
    }
}

/// Computes argument storage for a parameter list, accounting for a hidden
/// return pointer that occupies the first integer register on some ABIs.
/// The returned vector matches the declared parameters one to one.
pub fn func_arg_storage(
    conv: &dyn CallingConvention,
    params: &[Type],
    uses_sret: bool,
) -> Vec<ArgStorage> {
    if uses_sret && conv.sret_uses_first_arg_reg() {
        let mut types = Vec::with_capacity(params.len() + 1);
        types.push(Type::Addr);
        types.extend_from_slice(params);

        let mut storage = conv.arg_storage(&types);
        storage.remove(0);
        storage
    } else {
        conv.arg_storage(params)
    }
}

/// Lowers a whole SSA module into machine code.
pub fn lower_module<L: TargetSsaLowerer>(
    lowerer: &mut L,
    module: &ssa::Module,
) -> mcode::Module {
    let _timer = ScopeTimer::new("ssa lowering");

    let mut machine_module = mcode::Module::new();

    if let Some(table) = &module.addr_table {
        machine_module.addr_table = Some(mcode::AddrTable {
            entries: table.entries.clone(),
        });
    }

    lowerer.init_module(module, &mut machine_module);

    for decl in &module.external_functions {
        machine_module.add_external_symbol(&decl.name);
    }
    for decl in &module.external_globals {
        machine_module.add_external_symbol(&decl.name);
    }

    for func in &module.functions {
        lower_func(lowerer, module, func, &mut machine_module);
    }

    lower_globals(lowerer, module, &mut machine_module);

    for export in &module.dll_exports {
        machine_module.add_dll_export(export);
    }

    machine_module
}

fn lower_func<L: TargetSsaLowerer>(
    lowerer: &mut L,
    module: &ssa::Module,
    func: &ssa::Function,
    machine_module: &mut mcode::Module,
) {
    let layout = lowerer.data_layout();
    let conv = lowerer.calling_convention(func.calling_conv);

    let return_size = layout.size(module, func.return_type);
    let uses_sret = conv.return_method(return_size) == ReturnMethod::ViaPointerArg;

    let mut machine_func = mcode::Function::new(&func.name, conv);
    machine_func.uses_sret = uses_sret;

    let storage = func_arg_storage(conv, &func.params, uses_sret);
    for (ty, storage) in func.params.iter().zip(storage) {
        machine_func.parameters.push(lower_param(*ty, storage, &mut machine_func.stack_frame));
    }

    let sret_slot = uses_sret.then(|| {
        machine_func.stack_frame.new_stack_slot(mcode::StackSlot::new(
            mcode::StackSlotKind::ArgStore,
            8,
            1,
        ))
    });

    let mut ctx = LowerCtx {
        module,
        func,
        layout,
        machine_module,
        machine_func,
        block: func.entry(),
        instr: None,
        sret_slot,
        machine_block: mcode::BasicBlock::new(""),
        insertion: None,
        pending_flags: InstrFlags::empty(),
        reg_use_counts: HashMap::new(),
        stack_regs: HashMap::new(),
        next_vreg: func.next_virtual_reg,
    };

    // Pre-scan: record every register use, and turn allocas into stack
    // slots up front so later address lowering can resolve them by lookup.
    for (_, block) in &func.blocks {
        for instr in block.instrs.values() {
            for operand in &instr.operands {
                count_uses(&mut ctx.reg_use_counts, operand);
            }

            if instr.opcode == ssa::Opcode::Alloca {
                lower_alloca(&mut ctx, instr);
            }
        }
    }

    // Main lowering: blocks in program order, instructions back to front.
    let mut block_map: HashMap<ssa::BlockId, mcode::BlockId> = HashMap::new();
    let mut first = true;

    for (block_id, block) in &func.blocks {
        ctx.block = block_id;
        ctx.machine_block = mcode::BasicBlock::new(&block.label);
        ctx.machine_block.params = block.param_regs.clone();

        let mut cursor = block.instrs.last();
        while let Some(instr_id) = cursor {
            cursor = block.instrs.prev(instr_id);
            let instr = block.instrs.get(instr_id);

            if let Some(dest) = instr.dest {
                if ctx.num_uses(dest) == 0 {
                    continue;
                }
            }

            ctx.instr = Some(instr_id);
            ctx.insertion = ctx.machine_block.instrs.first();
            lower_instr(lowerer, &mut ctx, instr);
        }

        if first {
            first = false;
            if let Some(slot) = ctx.sret_slot {
                ctx.insertion = ctx.machine_block.instrs.first();
                lowerer.store_sret_pointer(&mut ctx, slot);
            }
        }

        let machine_block = std::mem::replace(&mut ctx.machine_block, mcode::BasicBlock::new(""));
        let machine_block_id = ctx.machine_func.blocks.push_back(machine_block);
        block_map.insert(block_id, machine_block_id);
    }

    let mut machine_func = ctx.machine_func;
    store_graphs(func, &mut machine_func, &block_map);

    if func.global {
        machine_module.add_global_symbol(&func.name);
    }
    machine_module.functions.push(machine_func);
}

fn lower_param(
    ty: Type,
    storage: ArgStorage,
    frame: &mut mcode::StackFrame,
) -> mcode::Parameter {
    match storage {
        ArgStorage::InReg(reg) => mcode::Parameter {
            ty,
            storage: mcode::ParamStorage::Reg(mcode::Register::Physical(reg)),
        },
        ArgStorage::OnStack { .. } => {
            let slot =
                frame.new_stack_slot(mcode::StackSlot::new(mcode::StackSlotKind::Generic, 8, 1));
            mcode::Parameter {
                ty,
                storage: mcode::ParamStorage::Slot(slot),
            }
        }
    }
}

fn count_uses(counts: &mut HashMap<VirtualRegister, u32>, operand: &ssa::Value) {
    match &operand.kind {
        ssa::ValueKind::Register(reg) => {
            *counts.entry(*reg).or_insert(0) += 1;
        }
        ssa::ValueKind::BranchTarget(target) => {
            for arg in &target.args {
                count_uses(counts, arg);
            }
        }
        _ => {}
    }
}

fn lower_alloca(ctx: &mut LowerCtx, instr: &ssa::Instruction) {
    let size = ctx.size(instr.operand(0).ty).max(8);
    let kind = if instr.attrs.contains(ssa::InstrAttrs::ARG_STORE) {
        mcode::StackSlotKind::ArgStore
    } else {
        mcode::StackSlotKind::Generic
    };

    let slot = ctx
        .machine_func
        .stack_frame
        .new_stack_slot(mcode::StackSlot::new(kind, size, 1));
    let dest = instr.dest.expect("alloca has a destination");
    ctx.stack_regs.insert(dest, slot);
}

fn lower_instr<L: TargetSsaLowerer>(lowerer: &mut L, ctx: &mut LowerCtx, instr: &ssa::Instruction) {
    match instr.opcode {
        // Allocas were consumed by the pre-scan.
        ssa::Opcode::Alloca => {}
        ssa::Opcode::Load => lowerer.lower_load(ctx, instr),
        ssa::Opcode::Store => lowerer.lower_store(ctx, instr),
        ssa::Opcode::LoadArg => lowerer.lower_loadarg(ctx, instr),
        ssa::Opcode::Add => lowerer.lower_add(ctx, instr),
        ssa::Opcode::Sub => lowerer.lower_sub(ctx, instr),
        ssa::Opcode::Mul => lowerer.lower_mul(ctx, instr),
        ssa::Opcode::SDiv => lowerer.lower_sdiv(ctx, instr),
        ssa::Opcode::SRem => lowerer.lower_srem(ctx, instr),
        ssa::Opcode::UDiv => lowerer.lower_udiv(ctx, instr),
        ssa::Opcode::URem => lowerer.lower_urem(ctx, instr),
        ssa::Opcode::FAdd => lowerer.lower_fadd(ctx, instr),
        ssa::Opcode::FSub => lowerer.lower_fsub(ctx, instr),
        ssa::Opcode::FMul => lowerer.lower_fmul(ctx, instr),
        ssa::Opcode::FDiv => lowerer.lower_fdiv(ctx, instr),
        ssa::Opcode::And => lowerer.lower_and(ctx, instr),
        ssa::Opcode::Or => lowerer.lower_or(ctx, instr),
        ssa::Opcode::Xor => lowerer.lower_xor(ctx, instr),
        ssa::Opcode::Shl => lowerer.lower_shl(ctx, instr),
        ssa::Opcode::Shr => lowerer.lower_shr(ctx, instr),
        ssa::Opcode::Jmp => lowerer.lower_jmp(ctx, instr),
        ssa::Opcode::CJmp => lowerer.lower_cjmp(ctx, instr),
        ssa::Opcode::FCJmp => lowerer.lower_fcjmp(ctx, instr),
        ssa::Opcode::Select => lowerer.lower_select(ctx, instr),
        ssa::Opcode::Call => lowerer.lower_call(ctx, instr),
        ssa::Opcode::Ret => lowerer.lower_ret(ctx, instr),
        ssa::Opcode::UExtend => lowerer.lower_uextend(ctx, instr),
        ssa::Opcode::SExtend => lowerer.lower_sextend(ctx, instr),
        ssa::Opcode::Truncate => lowerer.lower_truncate(ctx, instr),
        ssa::Opcode::FPromote => lowerer.lower_fpromote(ctx, instr),
        ssa::Opcode::FDemote => lowerer.lower_fdemote(ctx, instr),
        ssa::Opcode::UToF => lowerer.lower_utof(ctx, instr),
        ssa::Opcode::SToF => lowerer.lower_stof(ctx, instr),
        ssa::Opcode::FToU => lowerer.lower_ftou(ctx, instr),
        ssa::Opcode::FToS => lowerer.lower_ftos(ctx, instr),
        ssa::Opcode::OffsetPtr => lowerer.lower_offsetptr(ctx, instr),
        ssa::Opcode::MemberPtr => lowerer.lower_memberptr(ctx, instr),
        ssa::Opcode::Copy => lowerer.lower_copy(ctx, instr),
        ssa::Opcode::Sqrt => lowerer.lower_sqrt(ctx, instr),
    }
}

fn store_graphs(
    func: &ssa::Function,
    machine_func: &mut mcode::Function,
    block_map: &HashMap<ssa::BlockId, mcode::BlockId>,
) {
    let cfg = ssa::ControlFlowGraph::compute(func);
    let domtree = ssa::DominatorTree::compute(&cfg);

    for i in 0..cfg.nodes.len() {
        let cfg_node = cfg.node(i);
        let domtree_node = domtree.node(i);
        let machine_block_id = block_map[&cfg_node.block];

        let predecessors: Vec<mcode::BlockId> = cfg_node
            .predecessors
            .iter()
            .map(|&pred| block_map[&cfg.node(pred).block])
            .collect();
        let successors: Vec<mcode::BlockId> = cfg_node
            .successors
            .iter()
            .map(|&succ| block_map[&cfg.node(succ).block])
            .collect();

        let domtree_parent = block_map[&cfg.node(domtree_node.parent_index).block];
        let domtree_children: Vec<mcode::BlockId> = domtree_node
            .children_indices
            .iter()
            .map(|&child| block_map[&cfg.node(child).block])
            .collect();

        let machine_block = machine_func.block_mut(machine_block_id);
        machine_block.predecessors = predecessors;
        machine_block.successors = successors;
        machine_block.domtree_parent = Some(domtree_parent);
        machine_block.domtree_children = domtree_children;
    }
}

fn lower_globals<L: TargetSsaLowerer>(
    lowerer: &L,
    module: &ssa::Module,
    machine_module: &mut mcode::Module,
) {
    let layout = lowerer.data_layout();

    for global in &module.globals {
        let value = match &global.initial_value {
            ssa::GlobalValue::None => mcode::GlobalValue::None,
            ssa::GlobalValue::Int(value) => mcode::GlobalValue::Int(*value),
            ssa::GlobalValue::Fp(value) => mcode::GlobalValue::Fp(*value),
            ssa::GlobalValue::Bytes(bytes) => mcode::GlobalValue::Bytes(bytes.clone()),
            ssa::GlobalValue::Str(string) => mcode::GlobalValue::Str(string.clone()),
            ssa::GlobalValue::SymbolRef(name) => mcode::GlobalValue::SymbolRef(name.clone()),
        };

        machine_module.add_global(mcode::Global {
            name: global.name.clone(),
            size: layout.size(module, global.ty),
            alignment: layout.alignment(module, global.ty),
            value,
        });

        if global.external {
            machine_module.add_global_symbol(&global.name);
        }
    }
}
