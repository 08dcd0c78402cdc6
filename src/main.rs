use std::sync::Arc;

use log::error;

use civ_logger::properties::ConsoleProperties;
use civ_logger::{CivConfig, Property, PropertyStore, RepeaterDirectory, Session};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = std::env::args().skip(1);
    let port = args.next();
    let jump_hz = match args.next().map(|a| a.parse::<u64>()) {
        None => None,
        Some(Ok(hz)) => Some(hz),
        Some(Err(e)) => {
            eprintln!("Invalid frequency in Hz: {e}");
            eprintln!("Usage: civ-logger [PORT] [FREQ_HZ]");
            std::process::exit(2);
        }
    };

    let config = match CivConfig::from_env(port) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    println!("CI-V Logger for ICOM IC-705");
    println!("===========================");

    if let Err(e) = run(config, jump_hz) {
        eprintln!("Failed to start: {e}");
        std::process::exit(1);
    }
}

fn run(config: CivConfig, jump_hz: Option<u64>) -> civ_logger::Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let props: Arc<dyn PropertyStore> = Arc::new(ConsoleProperties);
        let directory = Arc::new(RepeaterDirectory::builtin());

        let mut session = match Session::open(&config, directory, Arc::clone(&props)) {
            Ok(s) => s,
            Err(e) => {
                error!(target: "CiV", "Unable to open serial port: {e}");
                props.update(Property::Timer, "Failed Open".to_string());
                eprintln!();
                eprintln!("Troubleshooting:");
                eprintln!("  1. Connect the IC-705 via USB-C");
                eprintln!("  2. Ensure the Following Settings on the Radio:");
                eprintln!("     Menu > Set > Connectors > CI-V");
                eprintln!("         CI-V Address = A4");
                eprintln!("         CI-V Transceive = ON");
                eprintln!("         CI-V USB Baud Rate = 115200");
                eprintln!("  3. Pass the port name as the first argument if auto-detect fails");
                return Err(e);
            }
        };

        match jump_hz {
            Some(hz) => session.frequency_jump(hz),
            None => session.query_radio(),
        }

        println!("Listening. Press Ctrl-C to quit.");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("failed to wait for Ctrl-C: {e}");
                }
            }
            exit = session.reader_exited() => {
                eprintln!("Lost the radio ({exit:?}). Check the USB cable and restart.");
            }
        }

        session.close().await;
        Ok(())
    })
}
