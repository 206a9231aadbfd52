use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use serialport::SerialPort;

use crate::config::DvlConfig;
use crate::error::{NavError, Result};
use super::DvlParser;

//the DVL prints this once it is ready for the next command
pub const PROMPT: u8 = b'>';
const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState{
    CommandReady,
    CommandProcessing,
    Pinging,
}

/// Serial link to the DVL.
///
/// While the device is in command mode incoming bytes are only scanned for
/// the prompt; once pinging they go to the datagram parser.
pub struct DvlLink<P: Read + Write>{
    port: P,
    parser: DvlParser,
    cmd_state: CommandState,
    command_timeout: Duration,
    break_command: String,
    setup_commands: Vec<String>,
    ping_command: String,
    read_buf: [u8; READ_CHUNK],
}

impl DvlLink<Box<dyn SerialPort>>{
    pub fn open(config: &DvlConfig, parser: DvlParser) -> Result<Self>{
        info!("[DVL] Opening port {} at {} baud...", config.port, config.baud);
        let port = serialport::new(&config.port, config.baud)
            .timeout(Duration::from_millis(10))
            .open()?;
        Ok(DvlLink::new(port, parser, config))
    }
}

impl<P: Read + Write> DvlLink<P>{
    pub fn new(port: P, parser: DvlParser, config: &DvlConfig) -> Self{
        DvlLink{
            port,
            parser,
            cmd_state: CommandState::Pinging,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            break_command: config.break_command.clone(),
            setup_commands: config.setup_commands.clone(),
            ping_command: config.ping_command.clone(),
            read_buf: [0u8; READ_CHUNK],
        }
    }

    pub fn cmd_state(&self) -> CommandState{
        self.cmd_state
    }

    pub fn parser(&self) -> &DvlParser{
        &self.parser
    }

    pub fn port_mut(&mut self) -> &mut P{
        &mut self.port
    }

    /// Route one received byte according to the command-mode state.
    /// Returns the parser's sub-frame flag while pinging, false otherwise.
    pub fn handle_byte(&mut self, c: u8) -> bool{
        match self.cmd_state{
            CommandState::Pinging => self.parser.feed(c),
            CommandState::CommandProcessing =>{
                if c == PROMPT{
                    self.cmd_state = CommandState::CommandReady;
                }
                false
            }
            //echo of what we typed
            CommandState::CommandReady => false,
        }
    }

    //read whatever is available, Ok(0) on a read timeout
    fn read_chunk(&mut self) -> Result<usize>{
        match self.port.read(&mut self.read_buf){
            //end of stream: the device went away
            Ok(0) => Err(NavError::PortClosed),
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and dispatch available bytes. Returns how many sub-frame
    /// boundaries the parser reported.
    pub fn poll(&mut self) -> Result<usize>{
        let n = self.read_chunk()?;
        let mut boundaries = 0;
        for i in 0..n{
            let c = self.read_buf[i];
            if self.handle_byte(c){
                boundaries += 1;
            }
        }
        Ok(boundaries)
    }

    /// Send a command. With `wait`, block until the prompt comes back or the
    /// command timeout expires.
    pub fn send_command(&mut self, cmd: &str, wait: bool) -> Result<()>{
        debug!("[DVL] > {:?}", cmd);
        self.port.write_all(cmd.as_bytes())?;
        self.port.flush()?;
        self.cmd_state = CommandState::CommandProcessing;

        if !wait{
            return Ok(());
        }

        let deadline = Instant::now() + self.command_timeout;
        while self.cmd_state != CommandState::CommandReady{
            if Instant::now() >= deadline{
                warn!("[DVL] no prompt after {:?}", cmd);
                return Err(NavError::CommandTimeout{
                    command: cmd.to_string(),
                    timeout_ms: self.command_timeout.as_millis() as u64,
                });
            }
            if self.poll()? == 0 && self.cmd_state != CommandState::CommandReady{
                thread::sleep(Duration::from_millis(1));
            }
        }
        Ok(())
    }

    pub fn send_break(&mut self) -> Result<()>{
        let cmd = self.break_command.clone();
        self.send_command(&cmd, true)
    }

    /// Break into command mode and send every setup command in order.
    pub fn set_data_format(&mut self) -> Result<()>{
        self.send_break()?;
        let commands = self.setup_commands.clone();
        for cmd in &commands{
            self.send_command(cmd, true)?;
        }
        info!("[DVL] Configured ({} commands)", commands.len());
        Ok(())
    }

    pub fn begin_pinging(&mut self) -> Result<()>{
        self.parser.reset();
        let cmd = self.ping_command.clone();
        self.send_command(&cmd, false)?;
        self.cmd_state = CommandState::Pinging;
        info!("[DVL] Pinging");
        Ok(())
    }

    /// Receive loop for a dedicated thread. Returns when `running` clears or
    /// the port fails.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()>{
        while running.load(Ordering::SeqCst){
            self.poll()?;
        }
        Ok(())
    }
}
