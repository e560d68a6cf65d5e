//! Serial protocol client for Dobot Magician class arms.
//!
//! Frame layout: `AA AA | len | id | ctrl | params.. | checksum`, where `len`
//! counts `id`, `ctrl` and the params, and the checksum is the two's
//! complement of the byte sum of `id`, `ctrl` and the params. Queued commands
//! answer with their queue index; waiting polls the index the controller has
//! executed until it catches up.

use anyhow::{anyhow, bail, ensure, Context, Result};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ArmConfig;
use crate::devices::ArmLink;
use crate::intent::JointAngles;
use crate::session::RobotPose;

const HEADER: [u8; 2] = [0xAA, 0xAA];

pub mod ids {
    pub const GET_POSE: u8 = 10;
    pub const SET_END_EFFECTOR_SUCTION_CUP: u8 = 62;
    pub const SET_PTP_CMD: u8 = 84;
    pub const SET_QUEUED_CMD_START_EXEC: u8 = 240;
    pub const SET_QUEUED_CMD_CLEAR: u8 = 245;
    pub const GET_QUEUED_CMD_CURRENT_INDEX: u8 = 246;
}

/// `ctrl` bit 0: write, bit 1: queued.
const CTRL_READ: u8 = 0x00;
const CTRL_WRITE: u8 = 0x01;
const CTRL_WRITE_QUEUED: u8 = 0x03;

/// Cartesian point-to-point move, joint-interpolated.
pub const PTP_MOVJ_XYZ: u8 = 0x01;

/// Mismatched replies tolerated before a transaction is abandoned.
const MAX_STRAY_PACKETS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u8,
    pub ctrl: u8,
    pub params: Vec<u8>,
}

impl Packet {
    pub fn new(id: u8, ctrl: u8, params: Vec<u8>) -> Self {
        Self { id, ctrl, params }
    }

    pub fn checksum(&self) -> u8 {
        let sum = self
            .params
            .iter()
            .fold(self.id.wrapping_add(self.ctrl), |acc, b| acc.wrapping_add(*b));
        0u8.wrapping_sub(sum)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.params.len() + 6);
        bytes.extend_from_slice(&HEADER);
        bytes.push((self.params.len() + 2) as u8);
        bytes.push(self.id);
        bytes.push(self.ctrl);
        bytes.extend_from_slice(&self.params);
        bytes.push(self.checksum());
        bytes
    }

    /// Reads one frame, skipping any bytes before the header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut previous = 0u8;
        loop {
            let byte = read_byte(reader)?;
            if previous == HEADER[0] && byte == HEADER[1] {
                break;
            }
            previous = byte;
        }

        let len = read_byte(reader)? as usize;
        ensure!(len >= 2, "Frame length {} is too short", len);

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).context("Truncated frame")?;
        let checksum = read_byte(reader)?;

        let packet = Packet::new(payload[0], payload[1], payload[2..].to_vec());
        ensure!(
            packet.checksum() == checksum,
            "Checksum mismatch on packet {}: expected {:#04x}, got {:#04x}",
            packet.id,
            packet.checksum(),
            checksum
        );
        Ok(packet)
    }
}

fn read_byte<R: Read>(reader: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte).context("Serial read failed")?;
    Ok(byte[0])
}

fn push_f32s(params: &mut Vec<u8>, values: &[f64]) {
    for value in values {
        params.extend_from_slice(&(*value as f32).to_le_bytes());
    }
}

fn queue_index(packet: &Packet) -> Result<u64> {
    match packet.params.len() {
        n if n >= 8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&packet.params[..8]);
            Ok(u64::from_le_bytes(raw))
        }
        n if n >= 4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&packet.params[..4]);
            Ok(u32::from_le_bytes(raw) as u64)
        }
        n => bail!("Packet {} carries {} bytes, expected a queue index", packet.id, n),
    }
}

pub struct Dobot<P: Read + Write> {
    port: Option<P>,
    poll_interval: Duration,
    motion_timeout: Duration,
}

impl Dobot<Box<dyn SerialPort>> {
    pub fn connect(path: &str, config: &ArmConfig) -> Result<Self> {
        info!("Initializing Dobot on {}", path);
        let port = serialport::new(path, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .with_context(|| format!("Failed to open serial port {}", path))?;

        let mut dobot = Self::new(port, config);
        dobot.transact(Packet::new(ids::SET_QUEUED_CMD_CLEAR, CTRL_WRITE, vec![]))?;
        dobot.transact(Packet::new(ids::SET_QUEUED_CMD_START_EXEC, CTRL_WRITE, vec![]))?;
        info!("Dobot initialized successfully");
        Ok(dobot)
    }
}

impl<P: Read + Write> Dobot<P> {
    pub fn new(port: P, config: &ArmConfig) -> Self {
        Self {
            port: Some(port),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            motion_timeout: Duration::from_secs(config.motion_timeout_secs),
        }
    }

    fn transact(&mut self, request: Packet) -> Result<Packet> {
        let port = self.port.as_mut().ok_or_else(|| anyhow!("Dobot connection is closed"))?;
        debug!("Dobot >> id={} ctrl={:#04x} params={:02x?}", request.id, request.ctrl, request.params);
        port.write_all(&request.encode())
            .and_then(|_| port.flush())
            .with_context(|| format!("Failed to send command {}", request.id))?;

        for _ in 0..MAX_STRAY_PACKETS {
            let reply = Packet::read_from(port).with_context(|| format!("No reply to command {}", request.id))?;
            if reply.id == request.id {
                debug!("Dobot << id={} params={:02x?}", reply.id, reply.params);
                return Ok(reply);
            }
            warn!("Discarding stray reply {} while waiting for {}", reply.id, request.id);
        }
        bail!("Command {} was never acknowledged", request.id)
    }

    fn queued(&mut self, request: Packet, wait: bool) -> Result<()> {
        let id = request.id;
        let reply = self.transact(request)?;
        let index = queue_index(&reply)?;
        debug!("Command {} queued at index {}", id, index);
        if wait {
            self.wait_for(index)?;
        }
        Ok(())
    }

    fn executed_index(&mut self) -> Result<u64> {
        let reply = self.transact(Packet::new(ids::GET_QUEUED_CMD_CURRENT_INDEX, CTRL_READ, vec![]))?;
        queue_index(&reply)
    }

    fn wait_for(&mut self, index: u64) -> Result<()> {
        let started = Instant::now();
        loop {
            let current = self.executed_index()?;
            if current >= index {
                return Ok(());
            }
            if started.elapsed() > self.motion_timeout {
                bail!(
                    "Queued command {} not executed after {:?} (controller at {})",
                    index,
                    self.motion_timeout,
                    current
                );
            }
            thread::sleep(self.poll_interval);
        }
    }
}

impl<P: Read + Write> ArmLink for Dobot<P> {
    fn pose(&mut self) -> Result<RobotPose> {
        let reply = self.transact(Packet::new(ids::GET_POSE, CTRL_READ, vec![]))?;
        ensure!(
            reply.params.len() >= 32,
            "Pose reply carries {} bytes, expected 32",
            reply.params.len()
        );

        let mut values = [0f64; 8];
        for (value, chunk) in values.iter_mut().zip(reply.params.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64;
        }
        let [x, y, z, r, base, shoulder, elbow, end_effector] = values;
        Ok(RobotPose {
            x,
            y,
            z,
            r,
            base,
            shoulder,
            elbow,
            end_effector,
        })
    }

    fn move_to(&mut self, x: f64, y: f64, z: f64, r: f64, wait: bool) -> Result<()> {
        let mut params = vec![PTP_MOVJ_XYZ];
        push_f32s(&mut params, &[x, y, z, r]);
        self.queued(Packet::new(ids::SET_PTP_CMD, CTRL_WRITE_QUEUED, params), wait)
            .context("Cartesian move failed")
    }

    fn set_point_to_point(&mut self, joints: JointAngles, mode: u8, wait: bool) -> Result<()> {
        let mut params = vec![mode];
        push_f32s(&mut params, &[joints.base, joints.shoulder, joints.elbow, joints.end_effector]);
        self.queued(Packet::new(ids::SET_PTP_CMD, CTRL_WRITE_QUEUED, params), wait)
            .context("Joint move failed")
    }

    fn suck(&mut self, enable: bool) -> Result<()> {
        let params = vec![0x01, enable as u8];
        self.queued(Packet::new(ids::SET_END_EFFECTOR_SUCTION_CUP, CTRL_WRITE_QUEUED, params), true)
            .context("Suction cup command failed")
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().context("Failed to flush serial port")?;
            info!("Dobot connection closed");
        }
        Ok(())
    }
}
