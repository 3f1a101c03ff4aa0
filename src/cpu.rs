//! # CPU State and Execution
//!
//! This module contains the `Cpu` struct representing the ARM7TDMI processor
//! state and the fetch-decode-execute step.
//!
//! ## CPU State
//!
//! The CPU maintains:
//! - **Register file**: r0-r15, the status word and every banked register
//!   (see [`RegisterFile`])
//! - **Fetch pipeline**: the two opcodes already read ahead of the one
//!   executing
//! - **Next PC**: address of the next instruction to execute
//! - **Dispatch tables**: one 1024-entry handler table per encoding
//! - **Cycle counter**: u64 monotonically increasing cycle count
//!
//! ## Pipeline Model
//!
//! Between steps `prefetch[0]` holds the opcode at `next_pc`, `prefetch[1]`
//! the opcode after it, and r15 reads `next_pc + width`. While a handler runs,
//! r15 therefore reads as the instruction address plus 8 (ARM) or plus 4
//! (Thumb), exactly as software observes it.
//!
//! Anything that redirects control flow goes through [`Cpu::branch_arm`],
//! [`Cpu::branch_thumb`] or an exception entry, which refill both pipeline
//! words from the new address.

use tracing::{trace, warn};

use crate::instructions::{
    arm_alu, arm_branches, arm_load_store, condition_passed, control, thumb_alu, thumb_branches,
    thumb_load_store,
};
use crate::memory::{MemoryBus, WaitStates};
use crate::opcodes::{self, ArmKind, ThumbKind, ARM_CLASSES, THUMB_CLASSES};
use crate::registers::{Mode, RegisterFile};

/// Signature shared by every instruction handler: `(cpu, opcode, old_pc) -> cycles`.
pub(crate) type Handler<M> = fn(&mut Cpu<M>, u32, u32) -> u32;

/// Exception vector addresses.
pub const VECTOR_RESET: u32 = 0x00;
/// Undefined instruction vector.
pub const VECTOR_UNDEFINED: u32 = 0x04;
/// Software interrupt vector.
pub const VECTOR_SWI: u32 = 0x08;
/// IRQ vector.
pub const VECTOR_IRQ: u32 = 0x18;

/// ARM7TDMI state and execution context.
///
/// The CPU owns its memory bus. On a full system the bus is the aggregate of
/// memory map, I/O registers and peripherals; in unit tests it is usually a
/// [`FlatMemory`](crate::FlatMemory).
///
/// # Type Parameters
///
/// * `M` - Memory bus implementation (must implement `MemoryBus` trait)
///
/// # Examples
///
/// ```
/// use libagb::{Cpu, FlatMemory, MemoryBus};
///
/// let mut memory = FlatMemory::new();
/// memory.write32(0x0800_0000, 0xE3A0_1005); // mov r1, #5
/// memory.write32(0x0800_0004, 0xE281_1003); // add r1, r1, #3
///
/// let mut cpu = Cpu::new(memory);
/// cpu.jump(0x0800_0000, false);
/// cpu.step();
/// cpu.step();
///
/// assert_eq!(cpu.reg(1), 8);
/// assert_eq!(cpu.pc(), 0x0800_0008);
/// ```
pub struct Cpu<M: MemoryBus> {
    pub(crate) regs: RegisterFile,

    /// Opcodes at `next_pc` and `next_pc + width`.
    pub(crate) prefetch: [u32; 2],

    /// Address of the next instruction to execute.
    pub(crate) next_pc: u32,

    /// Set while the high-level IntrWait call is waiting for its flags.
    pub(crate) intr_wait_active: bool,

    pub(crate) bus: M,

    cycles: u64,

    arm_table: Box<[Handler<M>]>,
    thumb_table: Box<[Handler<M>]>,
}

fn arm_handler<M: MemoryBus>(kind: ArmKind) -> Handler<M> {
    match kind {
        ArmKind::BranchExchange => arm_branches::execute_bx,
        ArmKind::MultiplyOrHalfword => arm_load_store::execute_multiply_or_halfword,
        ArmKind::PsrTransfer => arm_alu::execute_psr_transfer,
        ArmKind::PsrImmediate => arm_alu::execute_msr_immediate,
        ArmKind::DataImmediate => arm_alu::execute_data_immediate,
        ArmKind::DataRegisterShift => arm_alu::execute_data_register_shift,
        ArmKind::DataImmediateShift => arm_alu::execute_data_immediate_shift,
        ArmKind::SingleImmediate => arm_load_store::execute_single_immediate,
        ArmKind::SingleRegister => arm_load_store::execute_single_register,
        ArmKind::Block => arm_load_store::execute_block,
        ArmKind::Branch => arm_branches::execute_branch,
        ArmKind::SoftwareInterrupt => control::execute_arm_swi,
        ArmKind::Undefined => control::execute_undefined,
    }
}

fn thumb_handler<M: MemoryBus>(kind: ThumbKind) -> Handler<M> {
    match kind {
        ThumbKind::ShiftImmediate => thumb_alu::execute_shift_immediate,
        ThumbKind::AddSubtract => thumb_alu::execute_add_subtract,
        ThumbKind::Immediate => thumb_alu::execute_immediate,
        ThumbKind::Alu => thumb_alu::execute_alu,
        ThumbKind::HiRegister => thumb_alu::execute_hi_register,
        ThumbKind::LoadPcRelative => thumb_load_store::execute_load_pc_relative,
        ThumbKind::RegisterOffset => thumb_load_store::execute_register_offset,
        ThumbKind::ImmediateOffset => thumb_load_store::execute_immediate_offset,
        ThumbKind::HalfwordImmediate => thumb_load_store::execute_halfword_immediate,
        ThumbKind::SpRelative => thumb_load_store::execute_sp_relative,
        ThumbKind::LoadAddress => thumb_alu::execute_load_address,
        ThumbKind::AdjustSp => thumb_alu::execute_adjust_sp,
        ThumbKind::PushPop => thumb_load_store::execute_push_pop,
        ThumbKind::Multiple => thumb_load_store::execute_multiple,
        ThumbKind::SoftwareInterrupt => control::execute_thumb_swi,
        ThumbKind::ConditionalBranch => thumb_branches::execute_conditional_branch,
        ThumbKind::Branch => thumb_branches::execute_branch,
        ThumbKind::LongBranchHigh => thumb_branches::execute_long_branch_high,
        ThumbKind::LongBranchLow => thumb_branches::execute_long_branch_low,
        ThumbKind::Undefined => control::execute_undefined,
    }
}

impl<M: MemoryBus> Cpu<M> {
    /// Creates a new CPU attached to `bus`.
    ///
    /// The register file starts zeroed in System mode, ARM state, with the
    /// pipeline filled from address 0. Callers normally follow with
    /// [`Cpu::jump`] or a BIOS reset sequence.
    pub fn new(bus: M) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::new(),
            prefetch: [0; 2],
            next_pc: 0,
            intr_wait_active: false,
            bus,
            cycles: 0,
            arm_table: opcodes::expand(
                ARM_CLASSES,
                arm_handler::<M>,
                control::execute_undefined as Handler<M>,
            ),
            thumb_table: opcodes::expand(
                THUMB_CLASSES,
                thumb_handler::<M>,
                control::execute_undefined as Handler<M>,
            ),
        };
        cpu.jump(0, false);
        cpu
    }

    /// Clears every register and bank, leaving System mode, ARM state.
    ///
    /// The pipeline is not refilled; follow with [`Cpu::jump`].
    pub fn reset_registers(&mut self) {
        self.regs = RegisterFile::new();
        self.prefetch = [0; 2];
        self.intr_wait_active = false;
    }

    /// Executes one instruction and returns the cycles it consumed.
    ///
    /// Interrupts are not checked here; the scheduler decides when to call
    /// [`Cpu::interrupt`].
    pub fn step(&mut self) -> u32 {
        let ticks = if self.regs.thumb {
            self.step_thumb()
        } else {
            self.step_arm()
        };
        self.cycles += u64::from(ticks);
        ticks
    }

    fn step_arm(&mut self) -> u32 {
        let opcode = self.prefetch[0];
        self.prefetch[0] = self.prefetch[1];
        self.bus.timing().prefetch_active = false;

        let old_pc = self.next_pc;
        self.next_pc = self.regs.r[15];
        self.regs.r[15] = self.regs.r[15].wrapping_add(4);
        self.prefetch[1] = self.bus.fetch32(self.regs.r[15]);

        if !condition_passed(&self.regs, opcode >> 28) {
            let next = self.next_pc;
            return self.timing().code_ticks_seq32(next) + 1;
        }

        let handler = self.arm_table[opcodes::arm_index(opcode)];
        handler(self, opcode, old_pc)
    }

    fn step_thumb(&mut self) -> u32 {
        let opcode = self.prefetch[0];
        self.prefetch[0] = self.prefetch[1];
        self.bus.timing().prefetch_active = false;

        let old_pc = self.next_pc;
        self.next_pc = self.regs.r[15];
        self.regs.r[15] = self.regs.r[15].wrapping_add(2);
        self.prefetch[1] = u32::from(self.bus.fetch16(self.regs.r[15]));

        let handler = self.thumb_table[opcodes::thumb_index(opcode)];
        handler(self, opcode, old_pc)
    }

    /// Runs instructions until at least `cycle_budget` cycles have elapsed.
    ///
    /// Returns the cycles actually consumed (may overshoot by the length of
    /// the last instruction).
    pub fn run_for_cycles(&mut self, cycle_budget: u64) -> u64 {
        let start = self.cycles;
        while self.cycles - start < cycle_budget {
            self.step();
        }
        self.cycles - start
    }

    // ========== Control Flow ==========

    /// Redirects execution to `addr` in the given state and refills the
    /// pipeline. No cycles are charged.
    pub fn jump(&mut self, addr: u32, thumb: bool) {
        self.regs.thumb = thumb;
        if thumb {
            self.set_next_pc(addr & !1);
        } else {
            self.set_next_pc(addr & !3);
        }
    }

    fn set_next_pc(&mut self, addr: u32) {
        let width = if self.regs.thumb { 2 } else { 4 };
        self.next_pc = addr;
        self.regs.r[15] = addr.wrapping_add(width);
        self.refill();
    }

    /// Reloads both pipeline words from `next_pc`.
    pub(crate) fn refill(&mut self) {
        let pc = self.next_pc;
        if self.regs.thumb {
            self.prefetch[0] = u32::from(self.bus.fetch16(pc));
            self.prefetch[1] = u32::from(self.bus.fetch16(pc.wrapping_add(2)));
        } else {
            self.prefetch[0] = self.bus.fetch32(pc);
            self.prefetch[1] = self.bus.fetch32(pc.wrapping_add(4));
        }
    }

    /// Cost of refilling the pipeline at `next_pc`: two sequential fetches,
    /// one non-sequential fetch and three internal cycles. Clears the
    /// prefetch buffer.
    pub(crate) fn refill_ticks(&mut self) -> u32 {
        let pc = self.next_pc;
        let thumb = self.regs.thumb;
        let timing = self.bus.timing();
        let ticks = if thumb {
            timing.code_ticks_seq16(pc) * 2 + timing.code_ticks16(pc) + 3
        } else {
            timing.code_ticks_seq32(pc) * 2 + timing.code_ticks32(pc) + 3
        };
        timing.reset_prefetch();
        ticks
    }

    /// Branches to `target` in ARM state and returns the refill cost.
    pub(crate) fn branch_arm(&mut self, target: u32) -> u32 {
        self.regs.thumb = false;
        self.set_next_pc(target & !3);
        self.refill_ticks()
    }

    /// Branches to `target` in Thumb state and returns the refill cost.
    pub(crate) fn branch_thumb(&mut self, target: u32) -> u32 {
        self.regs.thumb = true;
        self.set_next_pc(target & !1);
        self.refill_ticks()
    }

    /// Branches to `target`, selecting the state from bit 0.
    pub(crate) fn branch_exchange(&mut self, target: u32) -> u32 {
        if target & 1 != 0 {
            self.branch_thumb(target)
        } else {
            self.branch_arm(target)
        }
    }

    /// Branches to `target` in the current state.
    pub(crate) fn branch_current(&mut self, target: u32) -> u32 {
        if self.regs.thumb {
            self.branch_thumb(target)
        } else {
            self.branch_arm(target)
        }
    }

    /// Copies the SPSR into the CPSR (exception return) and branches to
    /// `target` in the restored state.
    pub(crate) fn return_from_exception(&mut self, target: u32) -> u32 {
        let spsr = self.regs.spsr();
        let was_masked = self.regs.irq_disabled;
        self.regs.set_cpsr(spsr);
        if was_masked && !self.regs.irq_disabled {
            self.bus.irq_unmasked();
        }
        self.branch_current(target)
    }

    // ========== Exceptions ==========

    fn enter_exception(&mut self, mode: Mode, vector: u32, lr: u32) {
        self.regs.switch_mode(mode, true);
        self.regs.r[14] = lr;
        self.regs.thumb = false;
        self.regs.irq_disabled = true;
        self.set_next_pc(vector);
    }

    /// Takes the undefined-instruction exception for the instruction being
    /// executed. Returns the pipeline refill cost.
    pub(crate) fn undefined_exception(&mut self, opcode: u32, old_pc: u32) -> u32 {
        warn!(
            opcode = format_args!("{:#010X}", opcode),
            pc = format_args!("{:#010X}", old_pc),
            thumb = self.regs.thumb,
            "undefined instruction"
        );
        let lr = self.return_address();
        self.enter_exception(Mode::Undefined, VECTOR_UNDEFINED, lr);
        self.refill_ticks()
    }

    /// Takes the software-interrupt exception, or services the call directly
    /// when the bus asks for high-level BIOS emulation.
    pub(crate) fn software_interrupt(&mut self, comment: u32, old_pc: u32) {
        if self.bus.bios_hle() {
            crate::bios::call(self, comment, old_pc);
        } else {
            self.swi_exception();
        }
    }

    /// Enters Supervisor mode at the SWI vector.
    pub(crate) fn swi_exception(&mut self) {
        trace!(pc = format_args!("{:#010X}", self.next_pc), "software interrupt");
        let lr = self.return_address();
        self.enter_exception(Mode::Supervisor, VECTOR_SWI, lr);
    }

    /// Address of the instruction after the one executing.
    fn return_address(&self) -> u32 {
        let width = if self.regs.thumb { 2 } else { 4 };
        self.regs.r[15].wrapping_sub(width)
    }

    /// Enters the IRQ exception between two instructions.
    ///
    /// LR is set so that `subs pc, lr, #4` resumes at the instruction that
    /// would have executed next.
    pub fn interrupt(&mut self) {
        trace!(pc = format_args!("{:#010X}", self.next_pc), "irq entry");
        let lr = if self.regs.thumb {
            self.regs.r[15].wrapping_add(2)
        } else {
            self.regs.r[15]
        };
        self.enter_exception(Mode::Irq, VECTOR_IRQ, lr);
    }

    // ========== Accessors ==========

    #[inline]
    pub(crate) fn timing(&mut self) -> &mut WaitStates {
        self.bus.timing()
    }

    /// Returns a visible register.
    ///
    /// r15 reads as the next instruction address plus one instruction width.
    pub fn reg(&self, index: usize) -> u32 {
        self.regs.get(index)
    }

    /// Writes a visible register other than r15. Use [`Cpu::jump`] to change
    /// the program counter.
    pub fn set_reg(&mut self, index: usize, value: u32) {
        if index & 15 == 15 {
            let thumb = self.regs.thumb;
            self.jump(value, thumb);
        } else {
            self.regs.set(index, value);
        }
    }

    /// Address of the next instruction to execute.
    pub fn pc(&self) -> u32 {
        self.next_pc
    }

    /// Packed current program status register.
    pub fn cpsr(&self) -> u32 {
        self.regs.cpsr()
    }

    /// Writes the CPSR. A change to the T bit refills the pipeline for the
    /// new state at the current PC.
    pub fn set_cpsr(&mut self, value: u32) {
        let thumb = self.regs.thumb;
        self.regs.set_cpsr(value);
        if self.regs.thumb != thumb {
            let pc = self.next_pc;
            let new_state = self.regs.thumb;
            self.jump(pc, new_state);
        }
    }

    /// Saved program status register of the current mode.
    pub fn spsr(&self) -> u32 {
        self.regs.spsr()
    }

    /// Current processor mode.
    pub fn mode(&self) -> Mode {
        self.regs.mode
    }

    /// Returns true in Thumb state.
    pub fn is_thumb(&self) -> bool {
        self.regs.thumb
    }

    /// Returns true if IRQs are masked.
    pub fn irq_disabled(&self) -> bool {
        self.regs.irq_disabled
    }

    /// Full register file, including banked registers.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// The two opcodes fetched ahead of `pc()`, the first being the one at `pc()`.
    pub fn prefetch(&self) -> [u32; 2] {
        self.prefetch
    }

    /// Total cycles executed by [`Cpu::step`].
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Shared access to the memory bus.
    pub fn bus(&self) -> &M {
        &self.bus
    }

    /// Mutable access to the memory bus.
    pub fn bus_mut(&mut self) -> &mut M {
        &mut self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::FLAG_T;
    use crate::FlatMemory;

    fn cpu_with(words: &[u32]) -> Cpu<FlatMemory> {
        let mut mem = FlatMemory::new();
        for (i, w) in words.iter().enumerate() {
            mem.write32(0x0300_0000 + i as u32 * 4, *w);
        }
        let mut cpu = Cpu::new(mem);
        cpu.jump(0x0300_0000, false);
        cpu
    }

    #[test]
    fn test_cpu_initialization() {
        let cpu = Cpu::new(FlatMemory::new());
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.reg(15), 4);
        assert_eq!(cpu.mode(), Mode::System);
        assert!(!cpu.is_thumb());
        assert_eq!(cpu.cycles(), 0);
    }

    #[test]
    fn test_pipeline_matches_memory() {
        let mut cpu = cpu_with(&[0xE3A0_0001, 0xE3A0_1002, 0xE3A0_2003]);
        assert_eq!(cpu.prefetch(), [0xE3A0_0001, 0xE3A0_1002]);
        cpu.step();
        assert_eq!(cpu.pc(), 0x0300_0004);
        assert_eq!(cpu.reg(15), 0x0300_0008);
        assert_eq!(cpu.prefetch(), [0xE3A0_1002, 0xE3A0_2003]);
    }

    #[test]
    fn test_failed_condition_costs_one_fetch_and_one_cycle() {
        // moveq r0, #1 is skipped while Z is clear
        let mut cpu = cpu_with(&[0x03A0_0001]);
        let ticks = cpu.step();
        assert_eq!(cpu.reg(0), 0);
        assert_eq!(ticks, 1);
        assert_eq!(cpu.pc(), 0x0300_0004);
    }

    #[test]
    fn test_run_for_cycles() {
        // b . in IWRAM costs 3 cycles
        let mut cpu = cpu_with(&[0xEAFF_FFFE]);
        let ran = cpu.run_for_cycles(10);
        assert_eq!(ran, 12);
        assert_eq!(cpu.cycles(), 12);
        assert_eq!(cpu.pc(), 0x0300_0000);
    }

    #[test]
    fn test_undefined_instruction_vectors() {
        let mut cpu = cpu_with(&[0xE7F0_00F0]);
        cpu.step();
        assert_eq!(cpu.mode(), Mode::Undefined);
        assert_eq!(cpu.pc(), VECTOR_UNDEFINED);
        assert_eq!(cpu.reg(14), 0x0300_0004);
        assert!(cpu.irq_disabled());
        assert_eq!(cpu.spsr() & 0x1F, 0x1F);
    }

    #[test]
    fn test_irq_entry_link_register() {
        let mut cpu = cpu_with(&[0xE1A0_0000, 0xE1A0_0000]);
        cpu.step();
        cpu.interrupt();
        assert_eq!(cpu.mode(), Mode::Irq);
        assert_eq!(cpu.pc(), VECTOR_IRQ);
        // subs pc, lr, #4 resumes at the next instruction
        assert_eq!(cpu.reg(14).wrapping_sub(4), 0x0300_0004);
    }

    #[test]
    fn test_irq_entry_from_thumb() {
        let mut cpu = Cpu::new(FlatMemory::new());
        cpu.set_cpsr(0x1F | FLAG_T);
        cpu.jump(0x0300_0100, true);
        cpu.interrupt();
        assert!(!cpu.is_thumb());
        assert_eq!(cpu.spsr() & FLAG_T, FLAG_T);
        assert_eq!(cpu.reg(14).wrapping_sub(4), 0x0300_0100);
    }
}
