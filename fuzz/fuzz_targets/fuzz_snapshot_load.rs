//! Fuzz target for snapshot loading.
//!
//! Arbitrary bytes must either be rejected with an error, leaving the
//! machine untouched, or load into a state that saves back identically.

#![no_main]

use libagb::{Machine, MachineConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut machine = Machine::new(MachineConfig::default());
    machine.load_rom(&0xEAFF_FFFEu32.to_le_bytes());
    let before = machine.save();

    match machine.load(data) {
        Ok(()) => {
            let again = machine.save();
            assert!(libagb::system::SaveState::deserialize(&again).is_ok());
        }
        Err(_) => assert_eq!(machine.save(), before),
    }
});
