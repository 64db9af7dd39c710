//! End-to-end tests for a flashed Central/Peripheral board pair.
//!
//! Each board's UART is wired to a USB serial adapter on the host. Run after
//! both boards are flashed and the LED shows the fast attached cadence.

mod device;

use clap::Parser;
use colored::Colorize;

use device::{resolve_two_ports, SerialLink};
use tests::{print_results, run_all_tests, Bridge};

#[derive(Parser)]
#[command(name = "bridge-tests")]
#[command(about = "End-to-end serial relay tests for the BLE bridge")]
struct Args {
    /// Serial port wired to the Central board (use "auto" to auto-detect)
    #[arg(long, default_value = "auto")]
    central_port: String,

    /// Serial port wired to the Peripheral board (use "auto" to auto-detect)
    #[arg(long, default_value = "auto")]
    peripheral_port: String,

    /// Baud rate of both board UARTs
    #[arg(short, long, default_value = "9600")]
    baud: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (central_port, peripheral_port) = resolve_two_ports(&args.central_port, &args.peripheral_port)?;

    println!("{}", "BLE Bridge Integration Tests".bold());
    println!("Central port:    {}", central_port);
    println!("Peripheral port: {}", peripheral_port);
    println!("Baud: {}", args.baud);
    println!();

    println!("Opening serial ports...");
    let mut bridge = Bridge {
        central: SerialLink::new(&central_port, args.baud)?,
        peripheral: SerialLink::new(&peripheral_port, args.baud)?,
    };

    // Boot output from either board is not part of the relay
    std::thread::sleep(std::time::Duration::from_secs(1));
    bridge.central.drain_buffer()?;
    bridge.peripheral.drain_buffer()?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut bridge);
    print_results(&results);

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
