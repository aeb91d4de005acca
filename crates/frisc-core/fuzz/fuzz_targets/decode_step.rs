#![no_main]

use frisc_core::{
    decode, Device, DmaController, GenericUnit, InterruptLevel, IntervalTimer, Machine,
    MachineConfig, ParallelIo, UnitConfig,
};
use libfuzzer_sys::fuzz_target;

const MEMORY_BYTES: usize = 0x1000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    for chunk in data.chunks_exact(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if let Ok(instr) = decode(word) {
            assert_eq!(decode(instr.encode()), Ok(instr));
        }
    }

    let Ok(mut machine) = Machine::new(MachineConfig {
        memory_size: MEMORY_BYTES,
        max_run_steps: Some(256),
        ..MachineConfig::default()
    }) else {
        return;
    };
    let image = &data[..data.len().min(MEMORY_BYTES)];
    if machine.load_bytes(image).is_err() {
        return;
    }

    let units = [
        (
            UnitConfig::new("timer", 0xFFFF_0000).with_interrupt_level(InterruptLevel::Level0),
            Device::Timer(IntervalTimer::default()),
        ),
        (
            UnitConfig::new("pio", 0xFFFF_0010).with_interrupt_level(InterruptLevel::Level1),
            Device::Parallel(ParallelIo::default()),
        ),
        (
            UnitConfig::new("dma", 0xFFFF_0020).with_interrupt_level(InterruptLevel::Level2),
            Device::Dma(DmaController::default()),
        ),
        (
            UnitConfig::new("gen", 0xFFFF_0040).with_interrupt_level(InterruptLevel::NonMaskable),
            Device::Generic(GenericUnit::new(4)),
        ),
    ];
    for (config, device) in units {
        let _ = machine.attach(config, device);
    }
    let _ = machine.feed_parallel_input("pio", data);
    machine.registers_mut().set_sp(0x0FFC);

    let _ = machine.run();
});
