/**
 * AUV Navigation Binary
 *
 * Brings up the DVL and the I/O board, then runs the control loop at the
 * configured rate:
 * 1. DVL bytes are decoded on their own thread
 * 2. Attitude, depth and the kill switch come from the board
 * 3. Thruster PWM and telemetry go back to the board every cycle
 *
 * Usage: auv_nav [--config nav.toml] [--dvl-port P] [--board-port P] [--no-dvl-setup]
 */

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info, warn};

use auv_nav::board::BoardLink;
use auv_nav::control::{State, VerticalMode, NUM_MOTORS};
use auv_nav::dvl::{self, DvlLink};
use auv_nav::navigator::{AttitudeSource, CycleInputs, DepthSource, KillSwitch, Navigator, ThrustSink};
use auv_nav::{NavConfig, Result};

#[derive(Parser, Debug)]
#[command(name = "auv_nav", about = "DVL-aided navigation and thruster control")]
struct Args{
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the DVL serial port
    #[arg(long)]
    dvl_port: Option<String>,

    /// Override the I/O board serial port
    #[arg(long)]
    board_port: Option<String>,

    /// Start pinging without sending the setup command list
    #[arg(long, default_value_t = false)]
    no_dvl_setup: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command{
    Depth(f32),
    Altitude(f32),
    Yaw(f32),
    Goto(f32, f32),
    Power(f32),
    Kill,
    Arm,
    Status,
    ResetPid,
    Quit,
}

fn parse_command(line: &str) -> Option<Command>{
    let mut parts = line.split_whitespace();
    let word = parts.next()?;
    let mut num = || parts.next().and_then(|s| s.parse::<f32>().ok());

    match word{
        "depth" | "z" => num().map(Command::Depth),
        "alt" => num().map(Command::Altitude),
        "yaw" => num().map(Command::Yaw),
        "goto" =>{
            let x = num()?;
            let y = num()?;
            Some(Command::Goto(x, y))
        }
        "power" | "p" => num().map(Command::Power),
        "kill" | "k" => Some(Command::Kill),
        "arm" | "a" => Some(Command::Arm),
        "status" | "r" => Some(Command::Status),
        "reset" => Some(Command::ResetPid),
        "x" | "exit" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

fn spawn_console(tx: Sender<Command>) -> thread::JoinHandle<()>{
    thread::spawn(move ||{
        println!("\n[Commands]");
        println!("  depth <m>     - hold depth");
        println!("  alt <m>       - hold altitude above the bottom");
        println!("  yaw <deg>     - set heading");
        println!("  goto <x> <y>  - north/east target from the arming point");
        println!("  power <0-1>   - global thrust scale");
        println!("  kill / arm    - software kill switch");
        println!("  status        - print estimate and thrust");
        println!("  reset         - clear PID state");
        println!("  x             - exit\n");

        let stdin = io::stdin();
        for line in stdin.lock().lines(){
            let Ok(line) = line else { break };
            let cmd = line.trim();
            if cmd.is_empty(){
                continue;
            }
            match parse_command(cmd){
                Some(c) =>{
                    let quit = c == Command::Quit;
                    if tx.send(c).is_err() || quit{
                        break;
                    }
                }
                None => println!("Unknown command: {}", cmd),
            }
        }
    })
}

fn print_status(nav: &Navigator){
    let t = nav.telemetry();
    println!("[STATE] alive={} x={:.2} y={:.2} z={:.2} yaw={:.1}",
        t.alive, t.current.x, t.current.y, t.current.z, t.current.yaw);
    println!("[DESIRED] x={:.2} y={:.2} z={:.2} ({:?}) yaw={:.1} power={:.2}",
        t.desired.x, t.desired.y, t.desired.z, t.desired.vertical, t.desired.yaw, nav.power());
    println!("[THRUST] {:?}", t.thrust);
    println!("[DVL] records={} resyncs={} timeouts={} degenerate={}",
        t.parser.records, t.parser.resyncs, t.parser.timeouts, t.degenerate_updates);
    if let Err(e) = io::stdout().flush(){
        warn!("[NAV] stdout flush failed: {}", e);
    }
}

//returns false on quit
fn apply_command(nav: &mut Navigator, cmd: Command, soft_kill: &mut bool) -> bool{
    let desired = nav.desired();
    match cmd{
        Command::Depth(z) => nav.set_desired(State{ z, vertical: VerticalMode::Depth, ..desired }),
        Command::Altitude(z) => nav.set_desired(State{ z, vertical: VerticalMode::Altitude, ..desired }),
        Command::Yaw(yaw) => nav.set_desired(State{ yaw, ..desired }),
        Command::Goto(x, y) => nav.set_desired(State{ x, y, ..desired }),
        Command::Power(p) => nav.set_power(p),
        Command::Kill =>{
            *soft_kill = true;
            println!("[KILL]");
        }
        Command::Arm =>{
            *soft_kill = false;
            println!("[ARM]");
        }
        Command::Status => print_status(nav),
        Command::ResetPid => nav.reset_pid(),
        Command::Quit => return false,
    }
    true
}

fn run(args: Args) -> Result<()>{
    let mut config = match &args.config{
        Some(path) => NavConfig::load(path)?,
        None => NavConfig::default(),
    };
    if let Some(port) = args.dvl_port{
        config.dvl.port = port;
    }
    if let Some(port) = args.board_port{
        config.board.port = port;
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str())).init();

    println!("==============================================");
    println!("  AUV Navigation");
    println!("==============================================");
    println!("  DVL:   {} @ {}", config.dvl.port, config.dvl.baud);
    println!("  Board: {} @ {}", config.board.port, config.board.baud);
    println!("  Rate:  {} Hz", config.control.rate_hz);
    println!("==============================================\n");

    let running = Arc::new(AtomicBool::new(true));

    let (parser, reader) = dvl::channel();
    let mut link = DvlLink::open(&config.dvl, parser)?;
    if !args.no_dvl_setup{
        link.set_data_format()?;
    }
    link.begin_pinging()?;

    let dvl_running = Arc::clone(&running);
    let dvl_handle = thread::spawn(move ||{
        if let Err(e) = link.run(&dvl_running){
            error!("[DVL] Receive loop stopped: {}", e);
        }
    });

    let mut board = BoardLink::open(&config.board)?;
    let mut nav = Navigator::new(&config, reader);

    let (tx, rx): (Sender<Command>, Receiver<Command>) = mpsc::channel();
    let _console = spawn_console(tx);

    let period = Duration::from_secs_f32(1.0 / config.control.rate_hz.max(1.0));
    let epoch = Instant::now();
    let mut soft_kill = false;

    info!("[NAV] Control loop running");
    let result = loop{
        let cycle_start = Instant::now();

        let mut quit = false;
        while let Ok(cmd) = rx.try_recv(){
            if !apply_command(&mut nav, cmd, &mut soft_kill){
                quit = true;
            }
        }
        if quit{
            break Ok(());
        }

        if let Err(e) = board.poll(){
            break Err(e);
        }

        let inputs = CycleInputs{
            attitude: board.attitude(),
            depth: board.depth(),
            alive: board.alive() && !soft_kill,
        };
        let now = epoch.elapsed().as_micros() as u32;
        let thrust = nav.step(&inputs, now);

        if let Err(e) = board.write_thrust(&thrust){
            break Err(e);
        }
        if let Err(e) = board.send_telemetry(&nav.telemetry()){
            warn!("[BOARD] Telemetry not sent: {}", e);
        }

        if let Some(rest) = period.checked_sub(cycle_start.elapsed()){
            thread::sleep(rest);
        }
    };

    println!("[NAV] Stopping thrusters...");
    if let Err(e) = board.write_thrust(&[0.0; NUM_MOTORS]){
        warn!("[BOARD] Could not stop thrusters: {}", e);
    }
    running.store(false, Ordering::SeqCst);
    if dvl_handle.join().is_err(){
        warn!("[DVL] Receive thread panicked");
    }
    println!("[NAV] Shutdown complete");
    result
}

fn main(){
    let args = Args::parse();
    if let Err(e) = run(args){
        error!("{}", e);
        eprintln!("auv_nav: {}", e);
        std::process::exit(1);
    }
}
