//! RD53A chip model.
//!
//! The [`Emulator`] owns the chip state: registers, pixel matrix, pending
//! register reads and the simulated pixel thresholds. Commands reach it
//! through a [`CommandInlet`], which can be cloned into network tasks; the
//! owner then calls [`Emulator::process_queue`] to execute everything queued
//! so far and collect the resulting frames.
//!
//! Every `service_interval` frame slots a register frame is interleaved
//! with the data frames. It reports pending read requests first and fills
//! the remaining slots from a rotating auto-read cursor.

pub mod calibration;
pub mod error;
pub mod matrix;
pub mod registers;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};
use std::time::Instant;
use strum::{Display, EnumString, FromRepr};
use tokio::sync::mpsc;

use crate::config::EmulatorConfig;
use crate::protocol::{
    Command, CommandChannel, DataFrame, EventHeader, Frame, FrameChannel, Hit, RegisterFrame,
    RegisterSlot, SubFrame, Trigger, WrReg,
};
use crate::tracing::prelude::*;

pub use error::ChipError;
pub use matrix::{FrontEnd, Matrix, Pixel};
pub use registers::{fields, Field, RegisterFile};

use calibration::{charge_to_tot, inj_to_charge, thr_to_charge, threshold_dispersion, PIXEL_NOISE_SIGMA};

/// Which frames the emulator outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRepr, EnumString, Display)]
#[repr(u8)]
#[strum(ascii_case_insensitive)]
pub enum OutputMode {
    /// Data and service frames.
    #[default]
    #[strum(serialize = "all")]
    All = 0,
    /// Data frames only. Service frames still count towards the interval.
    #[strum(serialize = "data")]
    DataOnly = 1,
    /// Service frames only. Data frames still count towards the interval.
    #[strum(serialize = "service")]
    ServiceOnly = 2,
}

/// Default number of frame slots between service frames.
pub const DEFAULT_SERVICE_INTERVAL: u32 = 10;

/// Auto-read cursor wraps back to 0 when it reaches this address.
const AUTO_READ_WRAP: u16 = 0x1FF;

/// Core columns of the matrix, 8 pixel columns each.
const CORE_COLS: u16 = matrix::COLS / 8;

/// Producer side of the emulator's command queue.
///
/// Decodes byte buffers from the command link and queues every command
/// addressed to this chip. Cheap to clone and safe to use from any thread.
#[derive(Debug, Clone)]
pub struct CommandInlet {
    chip_id: Arc<AtomicU8>,
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandInlet {
    /// Decode `bytes` and queue the commands addressed to this chip.
    ///
    /// Returns the number of commands queued.
    pub fn handle_command(&self, bytes: &[u8]) -> usize {
        if bytes.is_empty() {
            return 0;
        }
        let mut channel = CommandChannel::new();
        channel.decode(bytes);
        channel
            .take_items()
            .into_iter()
            .map(|command| self.push(command))
            .filter(|queued| *queued)
            .count()
    }

    /// Queue `command` if it is addressed to this chip.
    ///
    /// Commands for other chips are dropped. Returns whether the command
    /// was queued.
    pub fn push(&self, command: Command) -> bool {
        let chip_id = self.chip_id.load(Ordering::Relaxed);
        if !command.addresses(chip_id) {
            trace!(chip_id, cmd = %command, "Dropping command for another chip");
            return false;
        }
        if self.tx.send(command).is_err() {
            debug!("Emulator gone, command dropped");
            return false;
        }
        true
    }
}

/// Simulated analog threshold of every pixel, in electrons.
struct Thresholds {
    /// Threshold DACs (sync, lin, diff) the values were computed for.
    vth: [u16; 3],
    charge: Vec<f64>,
}

impl Thresholds {
    fn at(&self, col: u16, row: u16) -> f64 {
        self.charge[usize::from(col) * usize::from(matrix::ROWS) + usize::from(row)]
    }
}

pub struct Emulator {
    chip_id: Arc<AtomicU8>,
    inlet: CommandInlet,
    queue: mpsc::UnboundedReceiver<Command>,
    registers: RegisterFile,
    matrix: Matrix,
    pending_reads: VecDeque<u16>,
    auto_read_cursor: u16,
    thresholds: Option<Thresholds>,
    output: FrameChannel,
    mode: OutputMode,
    service_interval: u32,
    frames_since_service: u32,
    /// Frame slots used since construction, suppressed frames included.
    slots_used: u64,
    random_thresholds: bool,
    pixel_noise: bool,
    rng: StdRng,
    fixed_seed: bool,
    epoch: Instant,
}

impl Emulator {
    pub fn new(chip_id: u8, mode: OutputMode) -> Self {
        let chip_id = Arc::new(AtomicU8::new(chip_id));
        let (tx, queue) = mpsc::unbounded_channel();
        Self {
            inlet: CommandInlet {
                chip_id: chip_id.clone(),
                tx,
            },
            chip_id,
            queue,
            registers: RegisterFile::new(),
            matrix: Matrix::new(),
            pending_reads: VecDeque::new(),
            auto_read_cursor: 0,
            thresholds: None,
            output: FrameChannel::new(),
            mode,
            service_interval: DEFAULT_SERVICE_INTERVAL,
            frames_since_service: 0,
            slots_used: 0,
            random_thresholds: false,
            pixel_noise: false,
            rng: StdRng::from_entropy(),
            fixed_seed: false,
            epoch: Instant::now(),
        }
    }

    pub fn from_config(config: &EmulatorConfig) -> Self {
        let mut emulator = Self::new(config.chip_id, config.output_mode);
        emulator.set_service_interval(config.service_interval);
        emulator.set_random_thresholds(config.random_thresholds);
        emulator.set_pixel_noise(config.pixel_noise);
        if let Some(seed) = config.seed {
            emulator.set_seed(seed);
        }
        emulator
    }

    /// A handle for queueing commands from other tasks or threads.
    pub fn inlet(&self) -> CommandInlet {
        self.inlet.clone()
    }

    /// Decode `bytes` and queue the commands addressed to this chip.
    pub fn handle_command(&self, bytes: &[u8]) -> usize {
        self.inlet.handle_command(bytes)
    }

    pub fn chip_id(&self) -> u8 {
        self.chip_id.load(Ordering::Relaxed)
    }

    pub fn set_chip_id(&self, chip_id: u8) {
        self.chip_id.store(chip_id, Ordering::Relaxed);
    }

    pub fn output_mode(&self) -> OutputMode {
        self.mode
    }

    pub fn set_output_mode(&mut self, mode: OutputMode) {
        self.mode = mode;
    }

    /// Frame slots between service frames. Values below 1 are raised to 1.
    pub fn set_service_interval(&mut self, interval: u32) {
        self.service_interval = interval.max(1);
    }

    /// Spread pixel thresholds around their nominal value.
    pub fn set_random_thresholds(&mut self, enable: bool) {
        self.random_thresholds = enable;
        self.thresholds = None;
    }

    /// Add per-event Gaussian noise to every threshold comparison.
    pub fn set_pixel_noise(&mut self, enable: bool) {
        self.pixel_noise = enable;
    }

    /// Use a fixed seed instead of reseeding from the clock on every trigger.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.fixed_seed = true;
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut Matrix {
        &mut self.matrix
    }

    /// Frames produced by the last [`process_queue`](Self::process_queue).
    pub fn frames(&self) -> &[Frame] {
        self.output.items()
    }

    /// Wire encoding of [`frames`](Self::frames).
    pub fn bytes(&self) -> &[u8] {
        self.output.bytes()
    }

    /// Hand over the frames of the last call, leaving the output empty.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        let frames = self.output.take_items();
        self.output.clear();
        frames
    }

    /// Discard queued commands, pending reads and output.
    pub fn clear(&mut self) {
        let mut dropped = 0;
        while self.queue.try_recv().is_ok() {
            dropped += 1;
        }
        self.pending_reads.clear();
        self.output.clear();
        debug!(dropped, "Cleared emulator queues");
    }

    /// Execute every queued command, in order.
    ///
    /// The frames produced replace those of the previous call. A call that
    /// uses no frame slot still counts as one, so read requests are
    /// answered even when no triggers arrive.
    pub fn process_queue(&mut self) {
        self.output.clear();
        let slots_before = self.slots_used;

        let mut executed = 0;
        while let Ok(command) = self.queue.try_recv() {
            trace!(cmd = %command, "Executing");
            self.execute(command);
            executed += 1;
        }

        if self.slots_used == slots_before {
            self.count_frame_slot();
        }

        let updated = self.registers.drain_updated_registers();
        if !updated.is_empty() {
            debug!(registers = ?updated, "Registers updated");
        }

        self.output.encode();
        if executed > 0 {
            debug!(
                commands = executed,
                frames = self.output.items().len(),
                bytes = self.output.len(),
                "Processed command queue"
            );
        }
    }

    /// Register value as the chip would report it. Address 0 reads the
    /// pixel pair selected by the region registers.
    pub fn read_register(&self, address: u16) -> u16 {
        if address == fields::PIX_PORTAL.address {
            let (double_col, row) = self.selected_pair();
            return self.matrix.get_pixel_pair(double_col, row).unwrap_or(0);
        }
        self.registers.get(address)
    }

    fn selected_pair(&self) -> (u16, u16) {
        (
            self.registers.field(fields::REGION_COL),
            self.registers.field(fields::REGION_ROW),
        )
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::RdReg(rd) => {
                if rd.address == fields::ADC_READ.address {
                    let reading = self.rng.gen_range(1..=5000);
                    debug!(reading, "Simulated ADC conversion");
                    if let Err(e) = self.registers.set(rd.address, reading) {
                        warn!("Failed to store ADC reading: {}", e);
                    }
                }
                self.pending_reads.push_back(rd.address);
            }
            Command::WrReg(wr) => self.write_register(&wr),
            Command::Trigger(trigger) => self.trigger(&trigger),
            Command::Ecr
            | Command::Bcr
            | Command::Noop
            | Command::Sync
            | Command::Pulse(_)
            | Command::Cal(_) => {}
        }
    }

    fn write_register(&mut self, wr: &WrReg) {
        if wr.address != fields::PIX_PORTAL.address {
            if let Err(e) = self.registers.set(wr.address, wr.first_value()) {
                warn!(address = wr.address, "Register write rejected: {}", e);
            }
            return;
        }

        // Extended writes fill consecutive rows of the selected double column.
        let (double_col, row) = self.selected_pair();
        for (offset, value) in (0..).zip(wr.values()) {
            if let Err(e) = self.matrix.set_pixel_pair(double_col, row + offset, *value) {
                warn!("Pixel write rejected: {}", e);
                break;
            }
        }
    }

    /// Enable field, first core column of that field, and feedback DAC
    /// for a core column.
    fn core_column(&self, core_col: u16) -> (bool, f64, FrontEnd) {
        let (field, first) = match core_col {
            0..=15 => (fields::EN_CORE_COL_SYNC, 0),
            16..=31 => (fields::EN_CORE_COL_LIN_1, 16),
            32 => (fields::EN_CORE_COL_LIN_2, 32),
            33..=48 => (fields::EN_CORE_COL_DIFF_1, 33),
            _ => (fields::EN_CORE_COL_DIFF_2, 49),
        };
        let enabled = self.registers.field(field) >> (core_col - first) & 1 != 0;
        let front_end = FrontEnd::of_core_col(core_col);
        let dac = match front_end {
            FrontEnd::Sync => fields::IBIAS_KRUM_SYNC,
            FrontEnd::Lin => fields::KRUM_CURR_LIN,
            FrontEnd::Diff => fields::VFF_DIFF,
        };
        (enabled, f64::from(self.registers.field(dac)), front_end)
    }

    fn trigger(&mut self, trigger: &Trigger) {
        if !self.fixed_seed {
            let seed = self.epoch.elapsed().as_nanos() as u64;
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.refresh_thresholds();

        let header = EventHeader {
            trigger_id: 0,
            trigger_tag: trigger.tag(),
            bcid: 0,
        };
        self.emit(DataFrame::synced(SubFrame::Header(header)));

        let digital = self.registers.field(fields::INJ_MODE_DIG) == 1;
        let vcal = i32::from(self.registers.field(fields::VCAL_HIGH))
            - i32::from(self.registers.field(fields::VCAL_MED));
        // A non-positive difference injects nothing.
        let injected = inj_to_charge(f64::from(vcal.max(0))).max(0.0);

        for core_col in 0..CORE_COLS {
            let (enabled, dac, front_end) = self.core_column(core_col);
            if !enabled {
                continue;
            }
            for qcol in core_col * 2..core_col * 2 + 2 {
                for row in 0..matrix::ROWS {
                    let mut tots = [0u8; 4];
                    for (i, tot) in (0..).zip(tots.iter_mut()) {
                        let col = qcol * 4 + i;
                        let Some(pixel) = self.matrix.pixel(col, row) else {
                            continue;
                        };
                        if !pixel.enabled() {
                            continue;
                        }
                        *tot = if digital {
                            4
                        } else {
                            self.analog_tot(col, row, pixel, injected, dac, front_end)
                        };
                    }
                    if tots.iter().any(|tot| *tot != 0) {
                        self.emit(DataFrame::synced(SubFrame::Hit(Hit::at(qcol, row, tots))));
                    }
                }
            }
        }
    }

    /// ToT of one pixel for an analog injection, 0 below threshold.
    fn analog_tot(
        &mut self,
        col: u16,
        row: u16,
        pixel: Pixel,
        injected: f64,
        dac: f64,
        front_end: FrontEnd,
    ) -> u8 {
        if injected <= 0.0 {
            return 0;
        }
        let noise = if self.pixel_noise {
            PIXEL_NOISE_SIGMA * self.rng.sample::<f64, _>(StandardNormal)
        } else {
            0.0
        };
        let trim = f64::from(pixel.tdac()) * 10.0 - 80.0;
        let base = self.thresholds.as_ref().map_or(0.0, |t| t.at(col, row));
        let threshold = base + noise + trim;
        if injected <= threshold {
            return 0;
        }
        let tot = charge_to_tot(dac, (injected - threshold).trunc(), front_end);
        tot.clamp(1.0, 15.0) as u8
    }

    /// Recompute pixel thresholds if the threshold DACs changed since the
    /// last computation.
    fn refresh_thresholds(&mut self) {
        let vth = [fields::VTH_SYNC, fields::VTH_LIN, fields::VTH1_DIFF]
            .map(|field| self.registers.field(field));
        if self.thresholds.as_ref().is_some_and(|t| t.vth == vth) {
            return;
        }

        let mut charge = Vec::with_capacity(usize::from(matrix::COLS) * usize::from(matrix::ROWS));
        for col in 0..matrix::COLS {
            let front_end = FrontEnd::of_col(col);
            let dac = match front_end {
                FrontEnd::Sync => vth[0],
                FrontEnd::Lin => vth[1],
                FrontEnd::Diff => vth[2],
            };
            let nominal = thr_to_charge(f64::from(dac), front_end);
            for _ in 0..matrix::ROWS {
                let value = if self.random_thresholds {
                    let z: f64 = self.rng.sample(StandardNormal);
                    (nominal + threshold_dispersion(front_end) * z).max(0.0)
                } else {
                    nominal
                };
                charge.push(value);
            }
        }

        debug!(
            vth_sync = vth[0],
            vth_lin = vth[1],
            vth_diff = vth[2],
            random = self.random_thresholds,
            "Initialized pixel thresholds"
        );
        self.thresholds = Some(Thresholds { vth, charge });
    }

    fn emit(&mut self, frame: DataFrame) {
        if self.mode != OutputMode::ServiceOnly {
            self.output.push(Frame::Data(frame));
        }
        self.count_frame_slot();
    }

    fn count_frame_slot(&mut self) {
        self.slots_used += 1;
        self.frames_since_service += 1;
        if self.frames_since_service < self.service_interval {
            return;
        }
        self.frames_since_service = 0;
        if self.mode != OutputMode::DataOnly {
            let frame = self.service_frame();
            self.output.push(Frame::Register(frame));
        }
    }

    fn service_frame(&mut self) -> RegisterFrame {
        let mut slots = [RegisterSlot::default(); 2];
        for slot in &mut slots {
            let (address, auto_read) = match self.pending_reads.pop_front() {
                Some(address) => (address, false),
                None => (self.next_auto_read(), true),
            };
            *slot = RegisterSlot {
                address,
                value: self.read_register(address),
                auto_read,
            };
        }
        trace!(?slots, "Service frame");
        RegisterFrame {
            status: 0,
            slots,
            error: false,
        }
    }

    fn next_auto_read(&mut self) -> u16 {
        let address = self.auto_read_cursor;
        self.auto_read_cursor += 1;
        if self.auto_read_cursor >= AUTO_READ_WRAP {
            self.auto_read_cursor = 0;
        }
        address
    }
}
