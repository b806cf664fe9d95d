use super::*;
use crate::types::encoding::DecodeError;
use crate::virtual_machine::assembler::assemble_source;
use crate::virtual_machine::host::{IoSelector, NullHost};
use crate::virtual_machine::host::tests::RecordingHost;
use crate::virtual_machine::isa::{Family, encode};

fn vm_for(source: &str) -> Vm {
    let rom = assemble_source(source).unwrap();
    Vm::from_rom(&rom)
}

fn run_ticks(vm: &mut Vm, ticks: usize) {
    for _ in 0..ticks {
        vm.tick();
    }
}

// ==================== Stack ====================

#[test]
fn push8_pop8_identity_for_every_byte() {
    let mut vm = Vm::new();
    let start = vm.stack_pointer();
    for value in 0..=u8::MAX {
        vm.push8(value);
        assert_eq!(vm.stack_pointer(), start.wrapping_sub(1));
        assert_eq!(vm.peek8(), value);
        assert_eq!(vm.pop8(), value);
        assert_eq!(vm.stack_pointer(), start);
    }
}

#[test]
fn stack_grows_down_from_the_top() {
    let mut vm = Vm::new();
    assert_eq!(vm.stack_pointer(), 255);
    vm.push8(0xAA);
    vm.push8(0xBB);
    assert_eq!(vm.read8(255), 0xAA);
    assert_eq!(vm.read8(254), 0xBB);
    assert_eq!(vm.stack_pointer(), 253);
}

#[test]
fn float_push_pop_preserves_bits() {
    let patterns = [
        0.0f32.to_bits(),
        (-0.0f32).to_bits(),
        1.5f32.to_bits(),
        f32::MIN_POSITIVE.to_bits(),
        f32::INFINITY.to_bits(),
        f32::NEG_INFINITY.to_bits(),
        0x7FC0_0000,
        0x7F80_0001,
        0xFFC0_1234,
    ];
    let mut vm = Vm::new();
    for bits in patterns {
        vm.push_float(f32::from_bits(bits));
        assert_eq!(vm.peek_float().to_bits(), bits);
        assert_eq!(vm.pop_float().to_bits(), bits);
        assert_eq!(vm.stack_pointer(), 255);
    }
}

#[test]
fn floats_sit_little_endian_on_the_stack() {
    let mut vm = Vm::new();
    vm.push_float(f32::from_bits(0x1122_3344));
    assert_eq!(&vm.memory()[252..], &[0x44, 0x33, 0x22, 0x11]);
    assert_eq!(vm.read_float(252).to_bits(), 0x1122_3344);
}

#[test]
fn stack_wraps_after_256_pushes() {
    let mut vm = Vm::new();
    let start = vm.stack_pointer();
    for i in 0..=u8::MAX {
        vm.push8(i);
    }
    assert_eq!(vm.stack_pointer(), start);
    // the last push overwrote address 0, the next one reuses the first slot
    assert_eq!(vm.read8(0), 255);
    vm.push8(0xEE);
    assert_eq!(vm.read8(start), 0xEE);
}

// ==================== Memory ====================

#[test]
fn float_access_wraps_around_memory() {
    let mut vm = Vm::new();
    vm.write_float(254, 2.5);
    assert_eq!(vm.read8(254), 2.5f32.to_le_bytes()[0]);
    assert_eq!(vm.read8(1), 2.5f32.to_le_bytes()[3]);
    assert_eq!(vm.read_float(254), 2.5);
}

#[test]
fn indirect_access_goes_through_pointer() {
    let mut vm = Vm::new();
    vm.write8(0x10, 0x80);
    vm.write8_indirect(0x10, 7);
    assert_eq!(vm.read8(0x80), 7);
    assert_eq!(vm.read8_indirect(0x10), 7);

    vm.write_float_indirect(0x10, -3.25);
    assert_eq!(vm.read_float(0x80), -3.25);
    assert_eq!(vm.read_float_indirect(0x10), -3.25);
}

#[test]
fn from_image_requires_256_bytes() {
    assert!(Vm::from_image(&[0; MEMORY_SIZE]).is_ok());
    assert_eq!(
        Vm::from_image(&[0; 100]),
        Err(VMError::InvalidImageSize {
            expected: MEMORY_SIZE,
            actual: 100
        })
    );
}

#[test]
fn from_rom_copies_the_image() {
    let rom = assemble_source("push8 #9").unwrap();
    let mut vm = Vm::from_rom(&rom);
    vm.write8(0, 0xFF);
    assert_eq!(rom.bytes()[0], encode(Family::Push, 32));
    assert_eq!(vm.pc(), 0);
    assert_eq!(vm.stack_pointer(), 255);
}

// ==================== Save state ====================

#[test]
fn save_restore_round_trip() {
    let mut vm = vm_for("push8 #77\npush8 #3\nio");
    run_ticks(&mut vm, 3);
    let state = vm.save_state();
    assert_eq!(state.len(), MEMORY_SIZE + 3);
    assert_eq!(state[MEMORY_SIZE], vm.pc());
    assert_eq!(state[MEMORY_SIZE + 1], 2);
    assert_eq!(state[MEMORY_SIZE + 2], 1);

    let restored = Vm::restore_state(&state).unwrap();
    assert_eq!(restored, vm);
}

#[test]
fn restore_rejects_malformed_states() {
    let state = Vm::new().save_state();
    assert_eq!(
        Vm::restore_state(&state[..200]),
        Err(VMError::DecodeError(DecodeError::UnexpectedEof))
    );

    let mut bad_flag = state.clone();
    bad_flag[MEMORY_SIZE + 2] = 2;
    assert_eq!(
        Vm::restore_state(&bad_flag),
        Err(VMError::DecodeError(DecodeError::InvalidValue))
    );

    let mut long = state;
    long.push(0);
    assert_eq!(
        Vm::restore_state(&long),
        Err(VMError::DecodeError(DecodeError::TrailingBytes(1)))
    );
}

// ==================== I/O flag ====================

#[test]
fn check_io_reads_and_clears() {
    let mut vm = vm_for("io\nnop");
    assert!(!vm.check_io());
    vm.tick();
    assert!(vm.check_io());
    assert!(!vm.check_io());
    vm.tick();
    assert!(!vm.check_io());
}

// ==================== Instructions ====================

#[test]
fn byte_arithmetic_wraps() {
    let mut vm = vm_for("push8 #200\npush8 #100\nadd8\npush8 #3\npush8 #5\nsub8");
    run_ticks(&mut vm, 6);
    assert_eq!(vm.pop8(), 254);
    assert_eq!(vm.pop8(), 44);
}

#[test]
fn division_by_zero_pushes_zero() {
    let mut vm = vm_for("push8 #9\npush8 #0\ndiv8\npush8 #9\npush8 #2\ndiv8");
    run_ticks(&mut vm, 6);
    assert_eq!(vm.pop8(), 4);
    assert_eq!(vm.pop8(), 0);
}

#[test]
fn madd_uses_three_operands() {
    let mut vm = vm_for("push8 #6\npush8 #7\npush8 #8\nmadd8\npushf #1.5\npushf #2\npushf #0.25\nmaddf");
    run_ticks(&mut vm, 8);
    assert_eq!(vm.pop_float(), 3.25);
    assert_eq!(vm.pop8(), 50);
}

#[test]
fn shifts_past_width_give_zero() {
    let mut vm = vm_for("push8 #1\npush8 #9\nshl\npush8 #$80\npush8 #7\nshr");
    run_ticks(&mut vm, 6);
    assert_eq!(vm.pop8(), 1);
    assert_eq!(vm.pop8(), 0);
}

#[test]
fn float_arithmetic_and_math() {
    let mut vm = vm_for("pushf #10\npushf #4\nsubf\npushf #2\npushf #3\npow\npushf #-2.5\nabs");
    run_ticks(&mut vm, 8);
    assert_eq!(vm.pop_float(), 2.5);
    assert_eq!(vm.pop_float(), 8.0);
    assert_eq!(vm.pop_float(), 6.0);
}

#[test]
fn casts() {
    let mut vm = vm_for("push8 #200\ntofloat\npushf #300.7\ntobyte\npushf #-4\ntobyte");
    run_ticks(&mut vm, 6);
    assert_eq!(vm.pop8(), 0);
    assert_eq!(vm.pop8(), 255);
    assert_eq!(vm.pop_float(), 200.0);

    let mut vm = Vm::new();
    vm.push_float(f32::NAN);
    vm.write8(0, Function::ToByte.opcode());
    vm.tick();
    assert_eq!(vm.pop8(), 0);
}

#[test]
fn comparisons_push_flags() {
    let mut vm = vm_for("push8 #3\npush8 #5\nlt8\npushf #2\npushf #2\nnef\npushf #nan\nisnan");
    run_ticks(&mut vm, 8);
    assert_eq!(vm.pop8(), 1);
    assert_eq!(vm.pop8(), 0);
    assert_eq!(vm.pop8(), 1);
}

#[test]
fn constants_push_their_values() {
    let mut vm = vm_for("const8_255\nconstf_m1\nconstf_inf");
    run_ticks(&mut vm, 3);
    assert_eq!(vm.pop_float(), f32::INFINITY);
    assert_eq!(vm.pop_float(), -1.0);
    assert_eq!(vm.pop8(), 255);
}

#[test]
fn dup_copies_top() {
    let mut vm = vm_for("push8 #9\ndup8\npushf #0.5\ndupf");
    run_ticks(&mut vm, 4);
    assert_eq!(vm.pop_float(), 0.5);
    assert_eq!(vm.pop_float(), 0.5);
    assert_eq!(vm.pop8(), 9);
    assert_eq!(vm.pop8(), 9);
}

#[test]
fn unused_slot_is_a_no_op() {
    let mut vm = Vm::new();
    vm.write8(0, encode(Family::Func, 63));
    let sp = vm.stack_pointer();
    vm.tick();
    assert_eq!(vm.pc(), 1);
    assert_eq!(vm.stack_pointer(), sp);
}

// ==================== Addressing ====================

#[test]
fn push_and_pop_addressing_modes() {
    let source = "
        push8 data          ; 0
        pop8 copy           ; 2
        pushf fdata         ; 4
        popf ($40)          ; 6
        push8 #9            ; 8
        pop8 (ptr)          ; 10
        jmp done            ; 12
    data:  db 42            ; 14
    fdata: db $00, $00, $C0, $3F
    copy:  db 0             ; 19
    ptr:   db $50
    done:  nop              ; 21
    ";
    let mut vm = vm_for(source);
    vm.write8(0x40, 0x60);
    run_ticks(&mut vm, 7);
    assert_eq!(vm.pc(), 21);
    assert_eq!(vm.read8(19), 42);
    assert_eq!(vm.read_float(0x60), 1.5);
    assert_eq!(vm.read8(0x50), 9);
    assert_eq!(vm.stack_pointer(), 255);
}

#[test]
fn relative_push_and_pop() {
    // +1 is a reserved offset, so the data sits two bytes further out
    let mut vm = vm_for("push8r value\npop8r slot\nnop\nnop\nvalue: db 0\nslot: db 0");
    assert_eq!(vm.read8(0), Opcode::Push(PushMode::Relative(3)).encode());
    assert_eq!(vm.read8(1), Opcode::Pop(PopMode::Relative(3)).encode());
    vm.write8(4, 0x5A);
    run_ticks(&mut vm, 2);
    assert_eq!(vm.read8(5), 0x5A);
    assert_eq!(vm.pc(), 2);
    assert_eq!(vm.stack_pointer(), 255);
}

#[test]
fn relative_branch_wraps_around_memory() {
    let forward = Opcode::Branch(BranchMode::RelativeIfNonZero(10)).encode();
    let mut vm = Vm::new();
    vm.write8(250, forward);
    vm.set_pc(250);
    vm.push8(1);
    vm.tick();
    // 251 + 10 wraps to 5
    assert_eq!(vm.pc(), 5);

    let backward = Opcode::Branch(BranchMode::RelativeIfNonZero(-8)).encode();
    let mut vm = Vm::new();
    vm.write8(2, backward);
    vm.set_pc(2);
    vm.push8(1);
    vm.tick();
    // 3 - 8 wraps to 251
    assert_eq!(vm.pc(), 251);

    // a zero flag falls through
    let mut vm = Vm::new();
    vm.write8(250, forward);
    vm.set_pc(250);
    vm.push8(0);
    vm.tick();
    assert_eq!(vm.pc(), 251);
}

#[test]
fn conditional_jumps_pop_their_flag() {
    let source = "
        push8 #0
        jnz fail
        push8 #1
        jnzr ok
    fail: const8_255
        const8_255
    ok:   push8 #42
    ";
    let mut vm = vm_for(source);
    run_ticks(&mut vm, 5);
    assert_eq!(vm.pop8(), 42);
    assert_eq!(vm.stack_pointer(), 255);
}

#[test]
fn indirect_jump() {
    let mut vm = vm_for("jmp (vector)\nvector: db 9");
    vm.tick();
    assert_eq!(vm.pc(), 9);
}

#[test]
fn pc_wraps_past_the_end() {
    let mut vm = Vm::new();
    vm.set_pc(255);
    vm.tick();
    assert_eq!(vm.pc(), 0);
}

#[test]
fn jsr_ret_returns_after_the_call() {
    let source = "
        push8 #7        ; address of sub
        jsr             ; 2
        push8 #42       ; 3
        jmp end
    sub: push8 #5       ; 7
        pop8 $F0
        ret
    end: nop
    ";
    let mut vm = vm_for(source);
    assert_eq!(vm.read8(8), 5);

    run_ticks(&mut vm, 2);
    assert_eq!(vm.pc(), 7);
    assert_eq!(vm.peek8(), 3);

    run_ticks(&mut vm, 3);
    assert_eq!(vm.pc(), 3);
    assert_eq!(vm.read8(0xF0), 5);
    assert_eq!(vm.stack_pointer(), 255);

    vm.tick();
    assert_eq!(vm.pop8(), 42);
}

// ==================== Host ====================

#[test]
fn run_serves_io_requests() {
    let source = "
        pushf #0.75
        push8 #motor
        io
        push8 #battery
        io
        push8 #12
        push8 #mark_write
        io
    ";
    let mut vm = vm_for(source);
    let mut host = RecordingHost {
        battery: 0.5,
        ..Default::default()
    };
    let served = vm.run(&mut host, 8);
    assert_eq!(served, 3);
    assert_eq!(
        host.requests,
        vec![
            IoSelector::Motor as u8,
            IoSelector::Battery as u8,
            IoSelector::MarkWrite as u8
        ]
    );
    assert_eq!(host.motor, vec![0.75]);
    assert_eq!(host.marks_written, vec![12]);
    assert_eq!(vm.pop_float(), 0.5);
    assert_eq!(vm.stack_pointer(), 255);
}

#[test]
fn run_stops_after_max_ticks() {
    let mut vm = vm_for("loop: jmp loop");
    let served = vm.run(&mut NullHost, 1000);
    assert_eq!(served, 0);
    assert_eq!(vm.pc(), 0);
}
