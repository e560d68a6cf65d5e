//! Differential-drive rover behind an Arduino running StandardFirmata.
//!
//! The board drives an H-bridge: IN1..IN4 select the direction of each motor
//! and the ENA/ENB PWM pins set its duty.

use anyhow::{ensure, Context, Result};
use serialport::SerialPort;
use std::io::Write;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{RoverConfig, RoverPins};
use crate::devices::{DriveChannel, DriveLink};

const DIGITAL_MESSAGE: u8 = 0x90;
const ANALOG_MESSAGE: u8 = 0xE0;
const SET_PIN_MODE: u8 = 0xF4;

const MODE_OUTPUT: u8 = 0x01;
const MODE_PWM: u8 = 0x03;

pub struct FirmataRover<P: Write> {
    port: Option<P>,
    pins: RoverPins,
    /// Last levels written per 8-pin digital port; Firmata writes whole ports.
    port_levels: [u8; 16],
}

impl FirmataRover<Box<dyn SerialPort>> {
    pub fn connect(path: &str, config: &RoverConfig) -> Result<Self> {
        info!("Initializing rover board on {}", path);
        let port = serialport::new(path, config.baud_rate)
            .timeout(Duration::from_millis(500))
            .open()
            .with_context(|| format!("Failed to open serial port {}", path))?;

        // Opening the port resets the board.
        thread::sleep(Duration::from_millis(config.settle_ms));

        let rover = Self::new(port, config.pins)?;
        info!("Rover board initialized successfully");
        Ok(rover)
    }
}

impl<P: Write> FirmataRover<P> {
    pub fn new(port: P, pins: RoverPins) -> Result<Self> {
        let mut rover = Self {
            port: Some(port),
            pins,
            port_levels: [0; 16],
        };
        for pin in [pins.in1, pins.in2, pins.in3, pins.in4] {
            rover.send(&[SET_PIN_MODE, pin, MODE_OUTPUT])?;
        }
        for pin in [pins.ena, pins.enb] {
            ensure!(pin < 16, "PWM pin {} cannot be driven with an analog message", pin);
            rover.send(&[SET_PIN_MODE, pin, MODE_PWM])?;
        }
        Ok(rover)
    }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        let port = self.port.as_mut().context("Rover connection is closed")?;
        debug!("Firmata >> {:02x?}", message);
        port.write_all(message)
            .and_then(|_| port.flush())
            .context("Failed to write to rover board")
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> Result<()> {
        let port_number = (pin / 8) as usize;
        ensure!(port_number < self.port_levels.len(), "Digital pin {} out of range", pin);
        let mask = 1u8 << (pin % 8);
        let levels = if high {
            self.port_levels[port_number] | mask
        } else {
            self.port_levels[port_number] & !mask
        };
        self.send(&[DIGITAL_MESSAGE | port_number as u8, levels & 0x7F, levels >> 7])?;
        self.port_levels[port_number] = levels;
        Ok(())
    }

    fn analog_write(&mut self, pin: u8, value: u8) -> Result<()> {
        self.send(&[ANALOG_MESSAGE | (pin & 0x0F), value & 0x7F, value >> 7])
    }
}

impl<P: Write> DriveLink for FirmataRover<P> {
    fn set_duty(&mut self, channel: DriveChannel, duty: u8) -> Result<()> {
        let pin = match channel {
            DriveChannel::Left => self.pins.ena,
            DriveChannel::Right => self.pins.enb,
        };
        self.analog_write(pin, duty)
    }

    fn set_direction(&mut self, levels: [bool; 4]) -> Result<()> {
        let pins = [self.pins.in1, self.pins.in2, self.pins.in3, self.pins.in4];
        for (pin, high) in pins.into_iter().zip(levels) {
            self.digital_write(pin, high)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            port.flush().context("Failed to flush rover port")?;
            info!("Rover connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rover() -> FirmataRover<Vec<u8>> {
        let mut rover = FirmataRover::new(Vec::new(), RoverPins::default()).unwrap();
        rover.port.as_mut().unwrap().clear();
        rover
    }

    fn written(rover: &FirmataRover<Vec<u8>>) -> &[u8] {
        rover.port.as_ref().unwrap()
    }

    #[test]
    fn setup_configures_direction_and_pwm_pins() {
        let rover = FirmataRover::new(Vec::new(), RoverPins::default()).unwrap();
        assert_eq!(
            written(&rover),
            &[
                0xF4, 2, 0x01, 0xF4, 4, 0x01, 0xF4, 7, 0x01, 0xF4, 8, 0x01, //
                0xF4, 3, 0x03, 0xF4, 5, 0x03,
            ]
        );
    }

    #[test]
    fn duty_is_sent_as_analog_message() {
        let mut rover = rover();
        rover.set_duty(DriveChannel::Left, 25).unwrap();
        rover.set_duty(DriveChannel::Right, 200).unwrap();
        assert_eq!(written(&rover), &[0xE3, 25, 0, 0xE5, 200 & 0x7F, 1]);
    }

    #[test]
    fn forward_pattern_sets_port_bits() {
        let mut rover = rover();
        rover.set_direction([true, false, false, true]).unwrap();
        // Pins 2, 4, 7 live on port 0, pin 8 on port 1.
        assert_eq!(
            written(&rover),
            &[0x90, 0b0000_0100, 0, 0x90, 0b0000_0100, 0, 0x90, 0b0000_0100, 0, 0x91, 0b0000_0001, 0]
        );
    }

    #[test]
    fn pin_seven_carries_into_msb_byte() {
        let mut rover = rover();
        rover.set_direction([false, true, true, false]).unwrap();
        let bytes = written(&rover);
        // After IN3 (pin 7) goes high, port 0 holds pins 4 and 7.
        assert_eq!(&bytes[6..9], &[0x90, 0b0001_0000, 1]);
        assert_eq!(rover.port_levels[0], 0b1001_0000);
    }

    #[test]
    fn closed_board_rejects_writes() {
        let mut rover = rover();
        rover.close().unwrap();
        assert!(rover.set_duty(DriveChannel::Left, 0).is_err());
    }
}
