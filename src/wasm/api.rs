//! WASM API for the emulation core.
//!
//! Provides JavaScript-callable interfaces for machine control, state
//! inspection, snapshots and access to video memory for a canvas renderer.

use crate::devices::{Display, DisplayRequest, Interrupt, NullAudio, VideoPhase, VideoView};
use crate::{Machine, MachineConfig};
use wasm_bindgen::prelude::*;

/// Display collaborator that notifies JavaScript once per frame.
///
/// Rendering happens on the JavaScript side from the VRAM, palette and OAM
/// copies the emulator hands out.
struct FrameNotifier {
    on_frame: Option<js_sys::Function>,
}

impl Display for FrameNotifier {
    fn scanline(&mut self, _line: u16, _phase: VideoPhase, _view: &VideoView<'_>) -> DisplayRequest {
        DisplayRequest::default()
    }

    fn frame_ready(&mut self) {
        if let Some(callback) = &self.on_frame {
            let _ = callback.call0(&JsValue::NULL);
        }
    }
}

/// JavaScript-compatible error wrapper
#[wasm_bindgen]
#[derive(Debug, Clone)]
pub struct JsError {
    message: String,
}

#[wasm_bindgen]
impl JsError {
    #[wasm_bindgen(constructor)]
    pub fn new(message: &str) -> JsError {
        JsError {
            message: message.to_string(),
        }
    }

    #[wasm_bindgen(getter)]
    pub fn message(&self) -> String {
        self.message.clone()
    }
}

impl<E: std::error::Error> From<E> for JsError {
    fn from(err: E) -> Self {
        JsError::new(&err.to_string())
    }
}

/// Main emulator interface for JavaScript
#[wasm_bindgen]
pub struct AgbEmulator {
    machine: Machine,
}

#[wasm_bindgen]
impl AgbEmulator {
    /// Create an emulator from an optional JSON configuration document and
    /// an optional callback invoked at every VBlank.
    #[wasm_bindgen(constructor)]
    pub fn new(
        config_json: Option<String>,
        on_frame: Option<js_sys::Function>,
    ) -> Result<AgbEmulator, JsError> {
        let config = match config_json {
            Some(json) => MachineConfig::from_json(&json)?,
            None => MachineConfig::default(),
        };
        let display = Box::new(FrameNotifier { on_frame });
        Ok(AgbEmulator {
            machine: Machine::with_collaborators(config, display, Box::new(NullAudio)),
        })
    }

    /// Install a cartridge image and reset
    pub fn load_rom(&mut self, rom: &[u8]) {
        self.machine.load_rom(rom);
    }

    /// Install a 16 KiB BIOS image and reset
    pub fn load_bios(&mut self, image: &[u8]) -> Result<(), JsError> {
        Ok(self.machine.load_bios(image)?)
    }

    pub fn reset(&mut self) {
        self.machine.reset();
    }

    /// Run until the next VBlank and return the cycles consumed
    pub fn run_frame(&mut self) -> Result<u32, JsError> {
        Ok(self.machine.run_frame()?)
    }

    /// Execute a single instruction
    pub fn step(&mut self) -> Result<u32, JsError> {
        Ok(self.machine.step()?)
    }

    pub fn save(&self) -> Vec<u8> {
        self.machine.save()
    }

    pub fn load(&mut self, snapshot: &[u8]) -> Result<(), JsError> {
        Ok(self.machine.load(snapshot)?)
    }

    /// Set pressed buttons (bit set = pressed)
    pub fn set_keys(&mut self, mask: u16) {
        self.machine.set_keys(mask);
    }

    /// Raise the interrupt with IF bit `bit`
    pub fn request_interrupt(&mut self, bit: u32) -> Result<(), JsError> {
        let source = Interrupt::from_bit(bit)
            .ok_or_else(|| JsError::new(&format!("no interrupt source for bit {bit}")))?;
        self.machine.request_interrupt(source);
        Ok(())
    }

    pub fn read_io(&self, offset: u32) -> u16 {
        self.machine.read_io(offset)
    }

    pub fn write_io(&mut self, offset: u32, value: u16) {
        self.machine.write_io(offset, value);
    }

    // Register getters
    pub fn register(&self, index: usize) -> u32 {
        self.machine.reg(index & 15)
    }

    #[wasm_bindgen(getter)]
    pub fn pc(&self) -> u32 {
        self.machine.pc()
    }

    #[wasm_bindgen(getter)]
    pub fn cpsr(&self) -> u32 {
        self.machine.cpsr()
    }

    #[wasm_bindgen(getter)]
    pub fn cycles(&self) -> f64 {
        // JavaScript numbers are exact up to 2^53
        self.machine.cycles() as f64
    }

    #[wasm_bindgen(getter)]
    pub fn vcount(&self) -> u16 {
        self.machine.vcount()
    }

    // Video memory for the renderer
    pub fn vram(&self) -> Vec<u8> {
        self.machine.bus().video_view().vram.to_vec()
    }

    pub fn palette(&self) -> Vec<u8> {
        self.machine.bus().video_view().palette.to_vec()
    }

    pub fn oam(&self) -> Vec<u8> {
        self.machine.bus().video_view().oam.to_vec()
    }

    pub fn io(&self) -> Vec<u8> {
        self.machine.bus().video_view().io.to_vec()
    }

    /// Battery save contents
    pub fn backup_data(&self) -> Vec<u8> {
        self.machine.backup_data()
    }
}
